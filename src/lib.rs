//! DSMR P1 smart meter reader
//!
//! Decodes the telegrams a Dutch/Belgian smart meter pushes over its P1 port,
//! validates them with their CRC-16 and publishes the readings to MQTT.

pub mod config;
pub mod metering_p1;
pub mod mqtt;
#[cfg(feature = "api")]
pub mod api;

// Re-export common types for easier access
pub use config::CONFIG;
pub use metering_p1::{P1Manager, P1Error};
pub use metering_p1::decoder::TelegramDecoder;
pub use metering_p1::structs::MeterReading;
pub use mqtt::{CALLBACKS, MqttManager};
#[cfg(feature = "api")]
pub use api::ApiManager;

pub fn get_unix_ts() -> u64 {
    return std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
}
