//! Terminal output for the pitwall CLI
//!
//! Interactive terminals get `cliclack` styling and an `indicatif` progress
//! bar. CI and piped output fall back to plain tagged lines.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_success, outro_warn, remark, section,
    step_error_detail, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::FetchProgress;
pub use prompts::confirm;
pub use theme::{init_theme, PitwallTheme};
