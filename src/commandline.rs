use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use cn740_lib::{config::SerialConfig, protocol as proto};
use std::path::PathBuf;
use std::time::Duration;

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_baud_rate(s: &str) -> Result<proto::BaudRate, String> {
    let rate_val = s
        .parse::<u32>()
        .map_err(|e| format!("Invalid baud rate number format: {e}"))?;
    proto::BaudRate::try_from(rate_val).map_err(|e| e.to_string())
}

fn parse_setpoint(s: &str) -> Result<f64, String> {
    let temp_val = s
        .parse::<f64>()
        .map_err(|e| format!("Invalid temperature value format: {e}"))?;
    // Reject before the port is opened.
    proto::degree_celsius_encode(temp_val).map_err(|e| e.to_string())?;
    Ok(temp_val)
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read and display the current temperature and setpoint of every controller.
    Read,

    /// Set the setpoint of every controller.
    /// The value is rounded to 0.1 °C.
    #[clap(verbatim_doc_comment)]
    SetSetpoint {
        /// Setpoint in degrees Celsius (°C), e.g. "25.5".
        #[arg(value_parser = parse_setpoint)]
        value: f64,
    },

    /// Run in daemon mode: continuously poll every controller and print the readings.
    /// Each line carries an RFC 3339 timestamp; failed readings are logged and printed as "NaN".
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval for fetching temperatures (e.g., "10s", "1m")
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "2sec")]
        poll_interval: Duration,
    },
}

const fn about_text() -> &'static str {
    "CN740 Temperature Controller CLI - Poll temperatures and set setpoints via Modbus ASCII."
}

#[derive(Parser, Debug)]
#[command(name="cn740", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// YAML file with the serial line settings.
    /// Options given on the command line take precedence over the file.
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub config: Option<PathBuf>,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub device: Option<String>,

    /// Baud rate for serial communication.
    /// Supported values: 2400, 4800, 9600, 19200 (default), 38400.
    #[arg(global = true, long, value_parser = parse_baud_rate, verbatim_doc_comment)]
    pub baud_rate: Option<proto::BaudRate>,

    /// Unit address of a controller (1 to 255), decimal or hexadecimal.
    /// Repeat to address several controllers sharing the line.
    #[arg(global = true, short, long = "address", value_parser = parse_address, verbatim_doc_comment)]
    pub addresses: Vec<proto::Address>,

    /// Time allowed for a reply to arrive.
    /// Examples: "100ms", "1s".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// Minimum delay between two requests on the line.
    #[arg(global = true, long, default_value = "50ms", value_parser = humantime::parse_duration)]
    pub delay: Duration,

    #[command(subcommand)]
    pub command: CliCommands,
}

impl CliArgs {
    /// Builds the line settings from the config file (if any) and the command line.
    pub fn serial_config(&self) -> Result<SerialConfig> {
        let mut config = match &self.config {
            Some(path) => SerialConfig::from_yaml_file(path)
                .with_context(|| format!("Cannot load config file {}", path.display()))?,
            None => SerialConfig::default(),
        };
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        Ok(config)
    }

    /// The addresses to talk to, the factory default if none was given.
    pub fn addresses(&self) -> Vec<proto::Address> {
        if self.addresses.is_empty() {
            vec![proto::Address::default()]
        } else {
            self.addresses.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parse_read() {
        let args = CliArgs::try_parse_from(["cn740", "read"]).unwrap();
        assert_eq!(args.command, CliCommands::Read);
        assert_eq!(args.addresses(), vec![proto::Address::default()]);
        assert_eq!(args.delay, Duration::from_millis(50));

        let config = args.serial_config().unwrap();
        assert_eq!(config, SerialConfig::default());
    }

    #[test]
    fn parse_line_options() {
        let args = CliArgs::try_parse_from([
            "cn740",
            "--device",
            "/dev/ttyS3",
            "--baud-rate",
            "9600",
            "--timeout",
            "250ms",
            "-a",
            "3",
            "-a",
            "0x10",
            "read",
        ])
        .unwrap();
        assert_eq!(
            args.addresses(),
            vec![
                proto::Address::try_from(3).unwrap(),
                proto::Address::try_from(16).unwrap()
            ]
        );
        let config = args.serial_config().unwrap();
        assert_eq!(config.device, "/dev/ttyS3");
        assert_eq!(config.baud_rate, proto::BaudRate::B9600);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn parse_rejects_invalid_values() {
        assert!(CliArgs::try_parse_from(["cn740", "-a", "0", "read"]).is_err());
        assert!(CliArgs::try_parse_from(["cn740", "-a", "256", "read"]).is_err());
        assert!(CliArgs::try_parse_from(["cn740", "--baud-rate", "1200", "read"]).is_err());
        assert!(CliArgs::try_parse_from(["cn740", "set-setpoint", "hot"]).is_err());
        assert!(CliArgs::try_parse_from(["cn740", "set-setpoint", "7000"]).is_err());
    }

    #[test]
    fn parse_commands() {
        let args = CliArgs::try_parse_from(["cn740", "set-setpoint", "25.5"]).unwrap();
        assert_eq!(args.command, CliCommands::SetSetpoint { value: 25.5 });

        let args = CliArgs::try_parse_from(["cn740", "daemon", "-p", "5s"]).unwrap();
        assert_eq!(
            args.command,
            CliCommands::Daemon {
                poll_interval: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn missing_config_file() {
        let args =
            CliArgs::try_parse_from(["cn740", "--config", "/nonexistent/cn740.yml", "read"])
                .unwrap();
        assert!(args.serial_config().is_err());
    }
}
