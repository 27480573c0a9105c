use std::time::Duration;

use clap::{Args, Subcommand};
use hermes_wire::{FixedPoint, Value};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod master;
pub mod slave;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept slaves over TCP and inspect their properties.
    Master(MasterArgs),
    /// Connect to a master and serve properties until it disconnects.
    Slave(SlaveArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Master(args) => master::run(args, format),
        Command::Slave(args) => slave::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct MasterArgs {
    /// Address to listen on (e.g. 127.0.0.1:7400).
    pub addr: String,
    /// Only accept these serials (hex). Repeatable. Default: accept all.
    #[arg(long, value_name = "SERIAL")]
    pub allow: Vec<String>,
    /// Let slaves keep the token they present instead of issuing a new one.
    #[arg(long)]
    pub keep_token: bool,
    /// Assign a property on every new slave, as name=type:value. Repeatable.
    #[arg(long = "set", value_name = "ASSIGNMENT")]
    pub assignments: Vec<String>,
    /// Scale used for float assignments.
    #[arg(long, default_value = "1000")]
    pub precision: u16,
    /// Disconnect each slave once it has been reported.
    #[arg(long)]
    pub disconnect: bool,
    /// Exit after N slaves have been registered.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SlaveArgs {
    /// Master address to connect to.
    pub addr: String,
    /// Property to serve, as name=type:value. Repeatable.
    #[arg(long = "prop", value_name = "PROPERTY")]
    pub props: Vec<String>,
    /// Scale used for float properties.
    #[arg(long, default_value = "1000")]
    pub precision: u16,
    /// Device serial (hex). Default: random.
    #[arg(long)]
    pub serial: Option<String>,
    /// Token presented in the first handshake (hex).
    #[arg(long)]
    pub token: Option<String>,
    /// Handshake attempts before giving up.
    #[arg(long, default_value = "3")]
    pub retries: u32,
    /// How long to keep retrying the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `name=type:value` into a property name and typed value.
pub fn parse_property(input: &str, precision: u16) -> CliResult<(String, Value)> {
    let (name, typed) = input
        .split_once('=')
        .ok_or_else(|| CliError::usage(format!("expected name=type:value, got {input:?}")))?;
    if name.is_empty() {
        return Err(CliError::usage(format!("missing property name in {input:?}")));
    }
    let (kind, raw) = typed
        .split_once(':')
        .ok_or_else(|| CliError::usage(format!("expected type:value after '=' in {input:?}")))?;

    let invalid = || CliError::usage(format!("invalid {kind} value for {name}: {raw:?}"));
    let value = match kind {
        "bool" => match raw {
            "true" | "1" | "on" => Value::Boolean(true),
            "false" | "0" | "off" => Value::Boolean(false),
            _ => return Err(invalid()),
        },
        "int" => Value::Integer(raw.parse().map_err(|_| invalid())?),
        "uint" => Value::UnsignedInteger(raw.parse().map_err(|_| invalid())?),
        "string" => Value::String(raw.to_string()),
        "float" => {
            let parsed: f64 = raw.parse().map_err(|_| invalid())?;
            if !parsed.is_finite() {
                return Err(invalid());
            }
            Value::Float(FixedPoint::from_f64(parsed, precision))
        }
        other => {
            return Err(CliError::usage(format!(
                "unknown type {other:?} (expected bool, int, uint, string or float)"
            )))
        }
    };
    Ok((name.to_string(), value))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn parse_property_reads_every_type() {
        let cases = [
            ("On=bool:true", Value::Boolean(true)),
            ("Offset=int:-12", Value::Integer(-12)),
            ("Level=uint:42", Value::UnsignedInteger(42)),
            ("Model=string:Widget:v2", Value::String("Widget:v2".to_string())),
            ("Gain=float:0.25", Value::Float(FixedPoint::new(250, 1000))),
        ];
        for (input, expected) in cases {
            let (_, value) = parse_property(input, 1000).expect("property should parse");
            assert_eq!(value, expected, "{input}");
        }
    }

    #[test]
    fn parse_property_rejects_malformed_input() {
        for input in ["Level", "=int:1", "Level=int", "Level=int:x", "Level=blob:1", "On=bool:maybe"] {
            let err = parse_property(input, 1000).expect_err("input should be rejected");
            assert_eq!(err.code, USAGE, "{input}");
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
