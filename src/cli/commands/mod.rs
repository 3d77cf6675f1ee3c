//! CLI command implementations

pub mod cache;
pub mod config;
pub mod drivers;

pub use cache::execute as cache;
pub use config::execute as config;
pub use drivers::execute as drivers;
