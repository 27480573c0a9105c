use hermes_peer::{connect_slave, random_serial, ConnectConfig, PeerError, Property, PropertyTable};
use hermes_wire::{Serial, Token, ValueEnvelope, WireConfig};
use tracing::info;

use crate::cmd::{parse_duration, parse_property, SlaveArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat, PropertyRow, SlaveReport};

pub fn run(args: SlaveArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = ConnectConfig {
        connect_timeout: parse_duration(&args.connect_timeout)?,
        handshake_attempts: args.retries,
        ..ConnectConfig::default()
    };
    let wire = config.slave.wire;

    let serial = match &args.serial {
        Some(hex) => Serial::from_hex(hex)
            .map_err(|err| CliError::usage(format!("invalid --serial {hex:?}: {err}")))?,
        None => random_serial(wire.serial_len),
    };
    if serial.len() != wire.serial_len {
        return Err(CliError::usage(format!(
            "--serial must be {} bytes, got {}",
            wire.serial_len,
            serial.len()
        )));
    }
    if let Some(hex) = &args.token {
        let token = Token::from_hex(hex)
            .map_err(|err| CliError::usage(format!("invalid --token: {err}")))?;
        if token.len() != wire.token_len {
            return Err(CliError::usage(format!(
                "--token must be {} bytes, got {}",
                wire.token_len,
                token.len()
            )));
        }
        config.token = Some(token);
    }

    let table = property_table(&args, &wire)?;
    let mut slave = connect_slave(&args.addr, table, serial, &config)
        .map_err(|err| peer_error("connect failed", err))?;
    info!(serial = %slave.serial(), addr = %args.addr, "slave connected");

    let served = slave.run();
    slave.close();
    match served {
        Ok(()) => {}
        Err(err @ PeerError::Disconnected(_)) => {
            info!(error = %err, "master went away without disconnecting");
        }
        Err(err) => return Err(peer_error("session failed", err)),
    }

    let properties = slave
        .provider()
        .iter()
        .enumerate()
        .map(|(index, property)| {
            PropertyRow::new(
                u8::try_from(index).ok(),
                &ValueEnvelope::new(property.name(), property.value().clone()),
            )
        })
        .collect();
    print_report(
        &SlaveReport {
            role: "slave",
            serial: slave.serial().to_string(),
            properties,
            updates: Vec::new(),
        },
        format,
    );

    Ok(SUCCESS)
}

fn property_table(args: &SlaveArgs, wire: &WireConfig) -> CliResult<PropertyTable> {
    let mut table = PropertyTable::for_wire(wire);
    for input in &args.props {
        let (name, value) = parse_property(input, args.precision)?;
        if !table.push(Property::new(name.clone(), value)) {
            return Err(CliError::usage(format!(
                "property {name:?} is duplicated, too long for the record, or the table is full"
            )));
        }
    }
    Ok(table)
}
