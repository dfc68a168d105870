//! CN740 Temperature Controller CLI
//!
//! A command-line interface (CLI) application for CN740 process temperature
//! controllers attached to a serial line speaking Modbus ASCII.
//!
//! This tool allows users to:
//! - Read the current temperature and setpoint of one or more controllers.
//! - Set a new setpoint.
//! - Run in a continuous daemon mode printing readings to the console.
//!
//! Several controllers with distinct unit addresses may share the line; they
//! are polled one after another over a single open port.

use anyhow::{Context, Result};
use clap::Parser;
use cn740_lib::{
    config::SerialConfig, protocol as proto, session::DeviceSession, transport::SerialTransport,
};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::sync::{Arc, Mutex};
use std::panic;
use std::time::{Duration, Instant, SystemTime};

mod commandline;

type Session = DeviceSession<SerialTransport>;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Opens the line once and binds every address to it.
fn open_sessions(config: &SerialConfig, addresses: &[proto::Address]) -> Result<Vec<Session>> {
    info!(
        "Opening {} at {} baud for unit(s) {:?}...",
        config.device, config.baud_rate, addresses
    );
    let transport = SerialTransport::open(config)
        .with_context(|| format!("Cannot open serial port {}", config.device))?;
    let bus = Arc::new(Mutex::new(transport));
    Ok(addresses
        .iter()
        .map(|address| {
            let mut session = DeviceSession::from_shared(bus.clone(), *address);
            session.set_timeout(config.timeout);
            session
        })
        .collect())
}

/// Renders a reading as `time unit temperature setpoint`, with `NaN` for anything missing.
fn format_reading(
    time: SystemTime,
    unit: proto::Address,
    reading: Option<&proto::Measurement>,
) -> String {
    let temperature = reading.map_or(f64::NAN, |m| m.temperature);
    let setpoint = reading.and_then(|m| m.setpoint).unwrap_or(f64::NAN);
    format!(
        "{} {unit} {temperature:.1} {setpoint:.1}",
        humantime::format_rfc3339_seconds(time)
    )
}

/// Time left of the poll interval after a cycle took `elapsed`, never less than `delay`.
fn cycle_pause(poll_interval: Duration, elapsed: Duration, delay: Duration) -> Duration {
    poll_interval.saturating_sub(elapsed).max(delay)
}

fn run_daemon(sessions: &[Session], delay: Duration, poll_interval: Duration) -> ! {
    loop {
        let cycle_start = Instant::now();
        for (i, session) in sessions.iter().enumerate() {
            if i > 0 {
                std::thread::sleep(delay);
            }
            debug!("Daemon: Reading unit {}...", session.unit());
            let reading = session
                .read_measurement()
                .inspect_err(|err| warn!("Unit {}: {err}", session.unit()))
                .ok();
            println!(
                "{}",
                format_reading(SystemTime::now(), session.unit(), reading.as_ref())
            );
        }
        std::thread::sleep(cycle_pause(poll_interval, cycle_start.elapsed(), delay));
    }
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "CN740 CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let config = args.serial_config()?;
    let sessions = open_sessions(&config, &args.addresses())?;

    match args.command {
        commandline::CliCommands::Read => {
            info!("Executing: Read Measurement");
            for (i, session) in sessions.iter().enumerate() {
                if i > 0 {
                    std::thread::sleep(args.delay);
                }
                let measurement = session
                    .read_measurement()
                    .with_context(|| format!("Cannot read unit {}", session.unit()))?;
                println!("Unit {}: {measurement}", session.unit());
            }
        }
        commandline::CliCommands::SetSetpoint { value } => {
            info!("Executing: Set Setpoint to {value} °C");
            for (i, session) in sessions.iter().enumerate() {
                if i > 0 {
                    std::thread::sleep(args.delay);
                }
                session.write_setpoint(value).with_context(|| {
                    format!("Failed to set setpoint of unit {} to {value}", session.unit())
                })?;
                println!("Unit {}: setpoint set to {value:.1} °C", session.unit());
            }
        }
        commandline::CliCommands::Daemon { poll_interval } => {
            info!("Starting daemon mode: interval={poll_interval:?}");
            run_daemon(&sessions, args.delay, poll_interval);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_reading() {
        let unit = proto::Address::try_from(3).unwrap();
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        let measurement = proto::Measurement {
            temperature: 120.0,
            setpoint: Some(30.0),
        };
        assert_eq!(
            format_reading(time, unit, Some(&measurement)),
            "1970-01-02T00:00:00Z 0x03 120.0 30.0"
        );

        let measurement = proto::Measurement {
            temperature: 1.0,
            setpoint: None,
        };
        assert_eq!(
            format_reading(time, unit, Some(&measurement)),
            "1970-01-02T00:00:00Z 0x03 1.0 NaN"
        );
        assert_eq!(
            format_reading(time, unit, None),
            "1970-01-02T00:00:00Z 0x03 NaN NaN"
        );
    }

    #[test]
    fn test_cycle_pause() {
        let ms = Duration::from_millis;
        // Three units with 50ms between requests took 100ms of the 2s interval.
        assert_eq!(cycle_pause(ms(2000), ms(100), ms(50)), ms(1900));
        // A cycle longer than the interval still leaves the line quiet for `delay`.
        assert_eq!(cycle_pause(ms(2000), ms(2500), ms(50)), ms(50));
        assert_eq!(cycle_pause(ms(2000), ms(1990), ms(50)), ms(50));
    }
}
