use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hermes_peer::{Master, MasterListener, PeerError, SlaveDescriptor, TokenAuthority};
use hermes_transport::TransportError;
use hermes_wire::{Serial, Value};
use tracing::{debug, info, warn};

use crate::cmd::{parse_property, MasterArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, OutputFormat, PropertyRow, SlaveReport};

/// How long an idle master sleeps before checking for a slave or Ctrl-C.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub fn run(args: MasterArgs, format: OutputFormat) -> CliResult<i32> {
    let assignments = args
        .assignments
        .iter()
        .map(|input| parse_property(input, args.precision))
        .collect::<CliResult<Vec<_>>>()?;

    let (registered_tx, registered_rx) = mpsc::channel::<Serial>();
    let master = Master::new()
        .with_authenticator(authority(&args)?)
        .with_on_new_slave(forward_registrations(registered_tx));
    let mut listener =
        MasterListener::bind(&args.addr, master).map_err(|err| peer_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| peer_error("listener setup failed", err))?;
    info!(addr = %listener.local_addr(), "master listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut reported = 0usize;
    while running.load(Ordering::SeqCst) {
        match listener.accept_next() {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) if is_idle(&err) => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err @ PeerError::Transport(_)) => return Err(peer_error("accept failed", err)),
            Err(err) => {
                warn!(error = %err, "connection dropped before registration");
                continue;
            }
        }

        for serial in registered_rx.try_iter() {
            let Some(descriptor) = listener.master_mut().slave_mut(&serial) else {
                continue;
            };
            match inspect(descriptor, &assignments) {
                Ok(report) => print_report(&report, format),
                Err(err) => {
                    warn!(%serial, error = %err, "slave inspection failed");
                    listener.master_mut().close(&serial);
                    continue;
                }
            }
            if args.disconnect {
                listener.master_mut().close(&serial);
            }

            reported = reported.saturating_add(1);
            if args.count.is_some_and(|count| reported >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

/// Queue each newly registered serial for inspection by the accept loop.
fn forward_registrations(
    registered: mpsc::Sender<Serial>,
) -> impl FnMut(&mut SlaveDescriptor) + Send + 'static {
    move |descriptor: &mut SlaveDescriptor| {
        if let Err(err) = registered.send(descriptor.serial().clone()) {
            debug!(serial = %err.0, "registration not forwarded; inspector gone");
        }
    }
}

fn authority(args: &MasterArgs) -> CliResult<TokenAuthority> {
    let authority = if args.allow.is_empty() {
        TokenAuthority::allow_all()
    } else {
        let serials = args
            .allow
            .iter()
            .map(|hex| {
                Serial::from_hex(hex)
                    .map_err(|err| CliError::usage(format!("invalid --allow serial {hex:?}: {err}")))
            })
            .collect::<CliResult<Vec<_>>>()?;
        TokenAuthority::allow(serials)
    };
    Ok(if args.keep_token {
        authority.keep_tokens()
    } else {
        authority
    })
}

/// List every property of `descriptor`, then apply `assignments`.
fn inspect(
    descriptor: &mut SlaveDescriptor,
    assignments: &[(String, Value)],
) -> Result<SlaveReport, PeerError> {
    let count = descriptor.try_properties_count()?;
    let mut properties = Vec::with_capacity(usize::from(count));
    for index in 0..count {
        let envelope = descriptor.try_get(index)?;
        properties.push(PropertyRow::new(Some(index), &envelope));
    }

    let mut updates = Vec::new();
    for (name, value) in assignments {
        match descriptor.set_by_name(name, value.clone()) {
            Ok(envelope) => updates.push(PropertyRow::new(None, &envelope)),
            Err(PeerError::Remote(remote)) => {
                warn!(serial = %descriptor.serial(), property = %name, error = %remote, "assignment refused");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(SlaveReport {
        role: "master",
        serial: descriptor.serial().to_string(),
        properties,
        updates,
    })
}

fn is_idle(err: &PeerError) -> bool {
    matches!(
        err,
        PeerError::Transport(TransportError::Accept(io))
            if io.kind() == std::io::ErrorKind::WouldBlock
    )
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use hermes_peer::{connect_slave, ConnectConfig, PropertyTable};

    use super::*;

    #[test]
    fn would_block_accept_counts_as_idle() {
        let idle = PeerError::Transport(TransportError::Accept(std::io::Error::from(
            std::io::ErrorKind::WouldBlock,
        )));
        assert!(is_idle(&idle));

        let reset = PeerError::Transport(TransportError::Accept(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert!(!is_idle(&reset));
    }

    #[test]
    fn registration_survives_a_closed_inspector_queue() {
        let (tx, rx) = mpsc::channel::<Serial>();
        drop(rx);
        let master = Master::new()
            .with_authenticator(TokenAuthority::allow_all())
            .with_on_new_slave(forward_registrations(tx));
        let mut listener = MasterListener::bind("127.0.0.1:0", master).unwrap();
        let addr = listener.local_addr().to_string();
        let serial = Serial::new(vec![0x42; 8]);

        let slave_serial = serial.clone();
        let slave = thread::spawn(move || {
            let mut slave = connect_slave(
                &addr,
                PropertyTable::new(),
                slave_serial,
                &ConnectConfig::default(),
            )
            .unwrap();
            slave.run()
        });

        assert!(listener.accept_next().unwrap());
        assert_eq!(listener.master().len(), 1);
        assert!(listener.master_mut().close(&serial));
        slave.join().unwrap().unwrap();
    }
}
