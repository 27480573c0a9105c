use std::fmt;

use bytes::BytesMut;
use hermes_transport::Channel;
use hermes_wire::{read_message, Direction, MessageKind, Serial, WireConfig};
use tracing::{debug, info, warn};

use crate::descriptor::SlaveDescriptor;
use crate::error::{PeerError, Result};
use crate::handshake::{respond, Authenticator};

/// Configuration for a [`Master`] and the descriptors it creates.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub wire: WireConfig,
    /// Treat replies carrying another slave's serial as unexpected.
    /// Default: true.
    pub verify_replies: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            wire: WireConfig::default(),
            verify_replies: true,
        }
    }
}

type NewSlaveCallback = Box<dyn FnMut(&mut SlaveDescriptor) + Send>;

/// Registry of authenticated slaves, keyed by serial.
///
/// Connections are handed in through [`accept`](Self::accept); the master
/// authenticates them and keeps one [`SlaveDescriptor`] per serial.
pub struct Master {
    config: MasterConfig,
    authenticator: Option<Box<dyn Authenticator>>,
    on_new_slave: Option<NewSlaveCallback>,
    slaves: Vec<SlaveDescriptor>,
    scratch: BytesMut,
}

impl Master {
    pub fn new() -> Self {
        Self::with_config(MasterConfig::default())
    }

    pub fn with_config(config: MasterConfig) -> Self {
        Self {
            scratch: BytesMut::with_capacity(config.wire.record_size()),
            config,
            authenticator: None,
            on_new_slave: None,
            slaves: Vec::new(),
        }
    }

    /// Install the authenticator consulted on every handshake.
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Box::new(authenticator));
        self
    }

    /// Install a callback invoked once per newly registered serial.
    pub fn with_on_new_slave<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut SlaveDescriptor) + Send + 'static,
    {
        self.on_new_slave = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Read the first record from `channel` and register its slave.
    ///
    /// Handshakes go through the authenticator; any other record skips
    /// authentication and registers the slave with the token it presented.
    /// Returns `Ok(false)` when the slave was rejected: its channel is closed
    /// and any existing registry entry for its serial is dropped.
    ///
    /// A serial that is already registered is moved to the new channel and
    /// token without invoking the new-slave callback again.
    pub fn accept<C: Channel + 'static>(&mut self, mut channel: C) -> Result<bool> {
        let wire = self.config.wire;
        let size = wire.record_size();
        if channel.available() < size && channel.wait(size) < size {
            debug!(available = channel.available(), "channel failed before a full record arrived");
        }

        let msg = read_message(&mut channel, &mut self.scratch, &wire, Direction::Request)?;
        let serial = msg.serial.clone();

        let token = if msg.kind() == MessageKind::Handshake {
            match respond(
                &mut channel,
                &mut self.scratch,
                &msg,
                self.authenticator.as_deref_mut(),
                &wire,
            ) {
                Ok(token) => token,
                Err(PeerError::Rejected { serial }) => {
                    if let Some(index) = self.position(&serial) {
                        self.slaves.remove(index);
                        warn!(%serial, "rejected slave removed from registry");
                    }
                    channel.close();
                    return Ok(false);
                }
                Err(err) => return Err(err),
            }
        } else {
            debug!(%serial, kind = %msg.kind(), "first record is not a handshake, skipping authentication");
            msg.token
        };

        match self.position(&serial) {
            Some(index) => {
                self.slaves[index].rebind(Box::new(channel), token);
                info!(%serial, "slave reconnected");
            }
            None => {
                let descriptor =
                    SlaveDescriptor::new(serial.clone(), token, Box::new(channel), self.config.clone());
                self.slaves.push(descriptor);
                info!(%serial, slaves = self.slaves.len(), "slave registered");
                if let (Some(callback), Some(descriptor)) =
                    (self.on_new_slave.as_mut(), self.slaves.last_mut())
                {
                    callback(descriptor);
                }
            }
        }
        Ok(true)
    }

    /// Disconnect and forget the slave with `serial`.
    pub fn close(&mut self, serial: &Serial) -> bool {
        match self.position(serial) {
            Some(index) => {
                let mut descriptor = self.slaves.remove(index);
                descriptor.close();
                true
            }
            None => false,
        }
    }

    pub fn slaves(&self) -> &[SlaveDescriptor] {
        &self.slaves
    }

    pub fn slave(&self, serial: &Serial) -> Option<&SlaveDescriptor> {
        self.slaves.iter().find(|d| d.serial() == serial)
    }

    pub fn slave_mut(&mut self, serial: &Serial) -> Option<&mut SlaveDescriptor> {
        self.slaves.iter_mut().find(|d| d.serial() == serial)
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    fn position(&self, serial: &Serial) -> Option<usize> {
        self.slaves.iter().position(|d| d.serial() == serial)
    }
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Master {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Master")
            .field("config", &self.config)
            .field("authenticator", &self.authenticator.is_some())
            .field("slaves", &self.slaves)
            .finish()
    }
}
