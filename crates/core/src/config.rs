//! Configuration for the alarm daemon, parsed from `alarmd.toml`.
//!
//! Split into focused submodules:
//! - `types`: the config structs and their serde defaults
//! - `loading`: TOML parsing, file loading, and environment overrides
//! - `validation`: semantic checks run after loading

mod loading;
mod types;
mod validation;
#[cfg(test)]
mod tests;

pub use loading::load_dotenv;
pub use types::{AlarmConfig, DeliverySettings, SchedulerSettings, SeedAlarm};
