use std::thread;
use std::time::{Duration, Instant};

use hermes_transport::{TcpConfig, TcpEndpoint};
use hermes_wire::{Serial, Token};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};
use crate::provider::PropertyProvider;
use crate::slave::{Slave, SlaveConfig};

/// How a slave reaches its master over TCP.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub tcp: TcpConfig,
    pub slave: SlaveConfig,
    /// How long to keep retrying refused connections. Default: 5 s.
    pub connect_timeout: Duration,
    /// Handshake attempts on one connection. Default: 3.
    pub handshake_attempts: u32,
    /// Pause between retries. Default: 200 ms.
    pub retry_delay: Duration,
    /// Token presented in the first handshake. Default: all zeroes.
    pub token: Option<Token>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            tcp: TcpConfig::default(),
            slave: SlaveConfig::default(),
            connect_timeout: Duration::from_secs(5),
            handshake_attempts: 3,
            retry_delay: Duration::from_millis(200),
            token: None,
        }
    }
}

/// Connect to a master, complete the handshake and return the ready slave.
pub fn connect_slave<P: PropertyProvider>(
    addr: &str,
    provider: P,
    serial: Serial,
    config: &ConnectConfig,
) -> Result<Slave<P, hermes_transport::TcpChannel>> {
    let deadline = Instant::now() + config.connect_timeout;
    let channel = loop {
        match TcpEndpoint::connect_with_config(addr, &config.tcp) {
            Ok(channel) => break channel,
            Err(err) if Instant::now() < deadline => {
                debug!(addr, error = %err, "master not reachable yet");
                thread::sleep(config.retry_delay);
            }
            Err(err) => return Err(err.into()),
        }
    };

    let mut slave = Slave::with_config(provider, channel, serial, config.slave.clone());
    if let Some(token) = &config.token {
        slave = slave.with_token(token.clone());
    }

    let attempts = config.handshake_attempts.max(1);
    let mut last_err = PeerError::HandshakeFailed("no attempt made".to_string());
    for attempt in 1..=attempts {
        match slave.handshake() {
            Ok(()) => return Ok(slave),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(attempt, attempts, error = %err, "handshake failed");
                last_err = err;
                thread::sleep(config.retry_delay);
            }
        }
    }
    Err(last_err)
}
