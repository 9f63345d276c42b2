pub mod alarm;
pub mod clock;
pub mod config;
pub mod error;

pub use alarm::*;
pub use clock::*;
pub use config::{AlarmConfig, DeliverySettings, SchedulerSettings, SeedAlarm};
pub use error::*;
