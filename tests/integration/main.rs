//! Integration tests for Pitwall

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const FIXTURE: &str = r#"{
        "Max Verstappen": { "display_name": "Max Verstappen", "cust_id": 33 },
        "Lando Norris": { "display_name": "Lando Norris", "cust_id": 4 },
        "Ghost": { "error": "Profile request failed", "status": 502 }
    }"#;

    fn pitwall() -> Command {
        let mut cmd = cargo_bin_cmd!("pitwall");
        cmd.env_remove("PITWALL_CONFIG").env_remove("PITWALL_FIXTURE");
        cmd
    }

    /// Temp dir holding a fixture and a config that points at it
    fn workspace(backend: &str) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let fixture = temp.path().join("drivers.json");
        fs::write(&fixture, FIXTURE).unwrap();

        let config = temp.path().join("config.toml");
        write_config(&config, backend, &temp.path().join("cache"), Some(&fixture));
        (temp, config)
    }

    fn write_config(path: &Path, backend: &str, cache_dir: &Path, fixture: Option<&Path>) {
        let mut content = format!(
            "[cache]\nbackend = \"{}\"\ndir = {:?}\n",
            backend,
            cache_dir.display().to_string()
        );
        if let Some(fixture) = fixture {
            content.push_str(&format!(
                "\n[fetch]\nfixture = {:?}\n",
                fixture.display().to_string()
            ));
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn help_displays() {
        pitwall()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-first driver profile lookups"));
    }

    #[test]
    fn version_displays() {
        pitwall()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pitwall"));
    }

    #[test]
    fn config_path_honours_flag() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["config", "path", "--config"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_reflects_file() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["config", "show"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("backend = \"memory\""));
    }

    #[test]
    fn config_set_rejects_unknown_key() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["config", "set", "cache.colour", "red"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn config_set_then_show() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["config", "set", "cache.ttl_secs", "90"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success();

        pitwall()
            .args(["config", "show"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("ttl_secs = 90"));
    }

    #[test]
    fn drivers_without_fixture_fails() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        write_config(&config, "memory", &temp.path().join("cache"), None);

        pitwall()
            .args(["drivers", "Max Verstappen"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No fixture configured"));
    }

    #[test]
    fn drivers_with_blank_names_fails() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["drivers", " , "])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No driver names"));
    }

    #[test]
    fn drivers_plain_isolates_failures() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["drivers", "Max Verstappen,Ghost,Nobody", "--format", "plain"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("Max Verstappen\tok"))
            .stdout(predicate::str::contains("Ghost\terror"))
            .stdout(predicate::str::contains("Nobody\terror"));
    }

    #[test]
    fn drivers_json_reports_rates() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["drivers", "Max Verstappen", "Ghost", "--format", "json"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"successes\": 1"))
            .stdout(predicate::str::contains("\"failures\": 1"))
            .stdout(predicate::str::contains("\"success_rate\": 50.0"))
            .stdout(predicate::str::contains("Profile request failed"));
    }

    #[test]
    fn drivers_second_run_hits_dir_cache() {
        let (_temp, config) = workspace("dir");

        pitwall()
            .args(["drivers", "Max Verstappen,Lando Norris", "--format", "json"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"cache_hit_rate\": \"0.0%\""));

        pitwall()
            .args(["drivers", "Max Verstappen,Lando Norris", "--format", "json"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"cache_hit_rate\": \"100.0%\""));

        pitwall()
            .args(["drivers", "Max Verstappen", "--refresh", "--format", "json"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"cache_hit_rate\": \"0.0%\""));
    }

    #[test]
    fn cache_list_and_forget() {
        let (_temp, config) = workspace("dir");

        pitwall()
            .args(["drivers", "Max Verstappen,Lando Norris", "--format", "plain"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success();

        pitwall()
            .args(["cache", "list", "--format", "plain"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("Lando Norris"))
            .stdout(predicate::str::contains("Max Verstappen"));

        pitwall()
            .args(["cache", "forget", "Lando Norris"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success();

        pitwall()
            .args(["cache", "list", "--format", "plain"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("Lando Norris").not());
    }

    #[test]
    fn cache_clear_with_yes() {
        let (_temp, config) = workspace("dir");

        pitwall()
            .args(["drivers", "Max Verstappen", "--format", "plain"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success();

        pitwall()
            .args(["cache", "clear", "--yes"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared 1 driver"));

        pitwall()
            .args(["cache", "list"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached drivers"));
    }

    #[test]
    fn cache_info_shows_backend() {
        let (_temp, config) = workspace("memory");
        pitwall()
            .args(["cache", "info"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .success()
            .stdout(predicate::str::contains("memory"))
            .stdout(predicate::str::contains("pitwall:driver:"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "[cache]\nttl_secs = \"soon\"\n").unwrap();

        pitwall()
            .args(["cache", "info"])
            .env("PITWALL_CONFIG", &config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}
