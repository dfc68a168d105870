//! Serial line settings.
use crate::protocol as proto;
use std::time::Duration;

/// Settings used to open the serial line to one or more controllers.
///
/// Data bits, parity and stop bits are fixed to 8N1; only the device, the
/// speed and the timing are configurable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SerialConfig {
    /// Serial port device name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub device: String,
    pub baud_rate: proto::BaudRate,
    /// Time allowed for a complete reply to arrive.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub timeout: Duration,
    /// Pause after opening the port before the first request.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub settle_time: Duration,
}

impl SerialConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
    pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(1);

    /// Settings for `device` with every other value at its default.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Platform dependent default device name.
    pub fn default_device() -> String {
        if cfg!(target_os = "windows") {
            String::from("COM1")
        } else {
            String::from("/dev/ttyUSB0")
        }
    }

    /// Loads the settings from a YAML file. Missing keys take their default.
    #[cfg(feature = "serde")]
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading config file from {path:?}");
        let file = std::fs::File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
            baud_rate: proto::BaudRate::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            settle_time: Self::DEFAULT_SETTLE_TIME,
        }
    }
}

/// Errors while loading a [`SerialConfig`].
#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SerialConfig::new("/dev/ttyS1");
        assert_eq!(config.device, "/dev/ttyS1");
        assert_eq!(config.baud_rate, proto::BaudRate::B19200);
        assert_eq!(config.timeout, Duration::from_millis(100));
        assert_eq!(config.settle_time, Duration::from_secs(1));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_yaml() {
        let config: SerialConfig = serde_yaml::from_str(
            "device: /dev/ttyUSB1\nbaud_rate: 9600\ntimeout: 250ms\nsettle_time: 0s\n",
        )
        .unwrap();
        assert_eq!(config.device, "/dev/ttyUSB1");
        assert_eq!(config.baud_rate, proto::BaudRate::B9600);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.settle_time, Duration::ZERO);

        let config: SerialConfig = serde_yaml::from_str("device: COM4\n").unwrap();
        assert_eq!(config, SerialConfig::new("COM4"));

        assert!(serde_yaml::from_str::<SerialConfig>("baud_rate: 1200\n").is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_missing_yaml_file() {
        assert!(matches!(
            SerialConfig::from_yaml_file("/nonexistent/cn740.yml"),
            Err(ConfigError::Io(..))
        ));
    }
}
