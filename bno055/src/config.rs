//! Persisted driver settings.
//!
//! Stored as pretty-printed JSON. Missing fields fall back to their defaults,
//! so a file only needs the values that differ:
//!
//! ```json
//! { "port": "/dev/ttyAMA0", "fusion_mode": "ndof" }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::MonotonicClock;
use crate::driver::Bno055;
use crate::poller::PollerConfig;
use crate::registers::OperatingMode;
use crate::transport::SerialTransport;

/// Settings for opening and running a BNO055.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Serial device path (`/dev/ttyUSB0`, `COM3`, ...)
    pub port: String,
    /// UART baud rate; the BNO055 runs at 115200
    pub baud_rate: u32,
    /// Timeout for each transmit/receive call, in milliseconds
    pub transaction_timeout_ms: u64,
    /// Total time allowed for `init`, in milliseconds
    pub init_timeout_ms: u64,
    /// Poller update interval in milliseconds; 0 polls only on data-ready events
    pub poll_interval_ms: u64,
    /// Fusion mode selected by `init`
    pub fusion_mode: OperatingMode,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            transaction_timeout_ms: 20,
            init_timeout_ms: 500,
            poll_interval_ms: 10,
            fusion_mode: OperatingMode::Imu,
        }
    }
}

impl DriverConfig {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Poller settings derived from `poll_interval_ms`
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: (self.poll_interval_ms > 0)
                .then_some(Duration::from_millis(self.poll_interval_ms)),
            ..PollerConfig::default()
        }
    }

    /// Apply the timeout and fusion mode settings to `driver`.
    ///
    /// # Panics
    ///
    /// Panics if `fusion_mode` is not a fusion mode.
    pub fn apply<T: SerialTransport, C: MonotonicClock>(&self, driver: &mut Bno055<T, C>) {
        driver.set_transaction_timeout(self.transaction_timeout());
        driver.set_fusion_mode(self.fusion_mode);
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file.
    ///
    /// A `fusion_mode` that produces no orientation output (`config`) is
    /// rejected as [`std::io::ErrorKind::InvalidData`].
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if !config.fusion_mode.is_fusion() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not a fusion mode", config.fusion_mode),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBno055;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bno055.json");

        let config = DriverConfig {
            port: "/dev/ttyAMA0".to_string(),
            fusion_mode: OperatingMode::Ndof,
            init_timeout_ms: 1000,
            ..DriverConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = DriverConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "port": "COM3", "fusion_mode": "ndof-fmc-off" }"#).unwrap();

        let loaded = DriverConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.port, "COM3");
        assert_eq!(loaded.fusion_mode, OperatingMode::NdofFmcOff);
        assert_eq!(loaded.baud_rate, 115_200);
        assert_eq!(loaded.init_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_malformed_file_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = DriverConfig::load_from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_config_mode_file_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config_mode.json");
        std::fs::write(&path, r#"{ "fusion_mode": "config" }"#).unwrap();

        let err = DriverConfig::load_from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("not a fusion mode"));
    }

    #[test]
    fn test_zero_interval_is_event_driven() {
        let config = DriverConfig {
            poll_interval_ms: 0,
            ..DriverConfig::default()
        };
        assert_eq!(config.poller_config().interval, None);
        assert_eq!(
            DriverConfig::default().poller_config().interval,
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_apply_configures_driver() {
        let config = DriverConfig {
            transaction_timeout_ms: 50,
            fusion_mode: OperatingMode::Compass,
            ..DriverConfig::default()
        };
        let mut imu = Bno055::new(SimulatedBno055::new());
        config.apply(&mut imu);

        assert_eq!(imu.transaction_timeout(), Duration::from_millis(50));
        assert_eq!(imu.fusion_mode(), OperatingMode::Compass);
    }
}
