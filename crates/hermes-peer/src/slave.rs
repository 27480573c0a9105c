use bytes::BytesMut;
use hermes_transport::Channel;
use hermes_wire::{
    read_message, write_message, ApiVersion, Command, CommandData, CommandPayload, Direction,
    ErrorKind, ErrorPayload, Payload, Serial, Token, ValueEnvelope, WireConfig, WireMessage,
};
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};
use crate::handshake::initiate;
use crate::provider::PropertyProvider;

pub const BAD_PROPERTY_INDEX: &str = "Bad property index";
pub const PROPERTY_NOT_FOUND: &str = "Property does not exists";
pub const INVALID_SESSION: &str = "Invalid session token";
pub const PROPERTY_READ_FAILED: &str = "Property read failed";
pub const BAD_VALUE_TYPE: &str = "Bad value type";
pub const PROPERTY_WRITE_FAILED: &str = "Property write failed";
pub const REPLY_TOO_LARGE: &str = "Reply does not fit the record";

/// Configuration for a [`Slave`].
#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub wire: WireConfig,
    /// Version offered during the handshake. Default: 1.0.0.
    pub api_version: ApiVersion,
    /// Deny commands whose serial or token differ from the current session.
    /// Default: true.
    pub enforce_session: bool,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            wire: WireConfig::default(),
            api_version: ApiVersion::default(),
            enforce_session: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    AwaitingMessage,
    Dispatching,
    Replying,
    Closed,
}

/// Outcome of one dispatcher iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A reply was written.
    Replied,
    /// The record was dropped without a reply.
    NotHandled,
    /// The master ended the session.
    Disconnect,
}

type Reply = std::result::Result<CommandData, ErrorPayload>;

/// Serves a [`PropertyProvider`] to a master over one channel.
///
/// Strictly request/response: each received command is answered before the
/// next record is read.
pub struct Slave<P, C> {
    provider: P,
    channel: C,
    serial: Serial,
    token: Token,
    scratch: BytesMut,
    config: SlaveConfig,
    state: SlaveState,
    established: bool,
}

impl<P: PropertyProvider, C: Channel> Slave<P, C> {
    /// Create a slave with default configuration and an all-zero token.
    pub fn new(provider: P, channel: C, serial: Serial) -> Self {
        Self::with_config(provider, channel, serial, SlaveConfig::default())
    }

    pub fn with_config(provider: P, channel: C, serial: Serial, config: SlaveConfig) -> Self {
        Self {
            provider,
            channel,
            serial,
            token: Token::zeroed(config.wire.token_len),
            scratch: BytesMut::with_capacity(config.wire.record_size()),
            config,
            state: SlaveState::Idle,
            established: false,
        }
    }

    /// Present `token` in the next handshake.
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_parts(self) -> (P, C) {
        (self.provider, self.channel)
    }

    /// Open a session with the master and adopt the token it returns.
    pub fn handshake(&mut self) -> Result<()> {
        let result = initiate(
            &mut self.channel,
            &mut self.scratch,
            &self.serial,
            &mut self.token,
            self.config.api_version,
            &self.config.wire,
        );
        match result {
            Ok(()) => {
                self.established = true;
                self.state = SlaveState::Idle;
                Ok(())
            }
            Err(err) => {
                if err.is_fatal() {
                    self.state = SlaveState::Closed;
                }
                Err(err)
            }
        }
    }

    /// Read one record, dispatch it and write the reply, if any.
    pub fn process_next(&mut self) -> Result<Dispatch> {
        if self.state == SlaveState::Closed {
            return Err(PeerError::Disconnected("slave is closed".to_string()));
        }

        self.state = SlaveState::AwaitingMessage;
        let request = match read_message(
            &mut self.channel,
            &mut self.scratch,
            &self.config.wire,
            Direction::Request,
        ) {
            Ok(msg) => msg,
            Err(err) if err.is_fatal() => return Err(self.fail(err.into())),
            Err(err) => {
                debug!(serial = %self.serial, error = %err, "dropping malformed record");
                self.state = SlaveState::Idle;
                return Ok(Dispatch::NotHandled);
            }
        };

        self.state = SlaveState::Dispatching;
        let outcome = match self.dispatch(&request) {
            Some(reply) => {
                self.state = SlaveState::Replying;
                match write_message(&mut self.channel, &mut self.scratch, &reply, &self.config.wire) {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => return Err(self.fail(err.into())),
                    Err(err) => {
                        // Nothing reached the channel; the master still needs an answer.
                        warn!(serial = %self.serial, error = %err, "reply could not be encoded");
                        let fallback =
                            self.error_reply(ErrorPayload::new(ErrorKind::Unsupported, REPLY_TOO_LARGE));
                        if let Err(err) = write_message(
                            &mut self.channel,
                            &mut self.scratch,
                            &fallback,
                            &self.config.wire,
                        ) {
                            return Err(self.fail(err.into()));
                        }
                    }
                }
                Dispatch::Replied
            }
            None if request.command_id() == Some(Command::Disconnect) => Dispatch::Disconnect,
            None => Dispatch::NotHandled,
        };

        self.state = SlaveState::Idle;
        Ok(outcome)
    }

    /// Compute the reply to `request`, or `None` when it is not answered.
    ///
    /// Only command records are dispatched. `Disconnect` and `PollEvents` have
    /// no reply.
    pub fn dispatch(&mut self, request: &WireMessage) -> Option<WireMessage> {
        let Payload::Command(cmd) = &request.payload else {
            debug!(kind = %request.kind(), "ignoring non-command record");
            return None;
        };

        if self.config.enforce_session
            && (request.serial != self.serial || request.token != self.token)
        {
            warn!(serial = %request.serial, command = %cmd.command, "command outside the current session");
            return Some(self.error_reply(ErrorPayload::new(ErrorKind::AccessDenied, INVALID_SESSION)));
        }

        trace!(command = %cmd.command, "dispatching");
        let reply = match cmd.command {
            Command::Disconnect | Command::PollEvents => return None,
            Command::GetPropertiesCount => Ok(CommandData::Count(self.provider.properties_count())),
            Command::GetPropertyName => self.property_name(&cmd.data),
            Command::Get => self.get_property(&cmd.data),
            Command::Set => self.set_property(&cmd.data),
        };

        Some(match reply {
            Ok(data) => WireMessage::command(
                self.serial.clone(),
                self.token.clone(),
                CommandPayload::new(cmd.command, data),
            ),
            Err(err) => {
                debug!(command = %cmd.command, error = %err, "command failed");
                self.error_reply(err)
            }
        })
    }

    /// Serve commands until the master disconnects or the channel fails.
    pub fn run(&mut self) -> Result<()> {
        if !self.established {
            return Err(PeerError::NotEstablished);
        }
        loop {
            if self.process_next()? == Dispatch::Disconnect {
                info!(serial = %self.serial, "master disconnected");
                return Ok(());
            }
        }
    }

    /// Close the channel. The slave cannot be used afterwards.
    pub fn close(&mut self) -> bool {
        self.state = SlaveState::Closed;
        self.channel.close()
    }

    fn fail(&mut self, err: PeerError) -> PeerError {
        self.state = SlaveState::Closed;
        if self.channel.good() {
            err
        } else {
            PeerError::Disconnected(err.to_string())
        }
    }

    fn error_reply(&self, err: ErrorPayload) -> WireMessage {
        WireMessage::new(self.serial.clone(), self.token.clone(), Payload::Error(err))
    }

    fn resolve(&mut self, name: &str) -> Option<u8> {
        let count = self.provider.properties_count();
        self.provider.property_index(name).filter(|&index| index < count)
    }

    fn property_name(&mut self, data: &CommandData) -> Reply {
        let CommandData::Index(index) = *data else {
            return Err(ErrorPayload::new(ErrorKind::Unsupported, BAD_PROPERTY_INDEX));
        };
        if index >= self.provider.properties_count() {
            return Err(ErrorPayload::new(ErrorKind::Unsupported, BAD_PROPERTY_INDEX));
        }
        self.provider
            .property_name(index)
            .map(CommandData::Text)
            .ok_or_else(|| ErrorPayload::new(ErrorKind::Unsupported, BAD_PROPERTY_INDEX))
    }

    fn get_property(&mut self, data: &CommandData) -> Reply {
        let name = match data {
            CommandData::Name(name) => name,
            CommandData::Value(envelope) => &envelope.name,
            _ => return Err(ErrorPayload::new(ErrorKind::Unsupported, PROPERTY_NOT_FOUND)),
        };
        let index = self
            .resolve(name)
            .ok_or_else(|| ErrorPayload::new(ErrorKind::Unsupported, PROPERTY_NOT_FOUND))?;
        self.read_back(name, index)
    }

    fn set_property(&mut self, data: &CommandData) -> Reply {
        let CommandData::Value(envelope) = data else {
            return Err(ErrorPayload::new(ErrorKind::BadType, BAD_VALUE_TYPE));
        };
        let index = self
            .resolve(&envelope.name)
            .ok_or_else(|| ErrorPayload::new(ErrorKind::Unsupported, PROPERTY_NOT_FOUND))?;

        if self.provider.property_type(index) != Some(envelope.value_type()) {
            return Err(ErrorPayload::new(ErrorKind::BadType, BAD_VALUE_TYPE));
        }
        if !self.provider.set(index, envelope) {
            return Err(ErrorPayload::new(ErrorKind::AccessDenied, PROPERTY_WRITE_FAILED));
        }
        debug!(property = %envelope.name, value = %envelope.value, "property written");
        self.read_back(&envelope.name, index)
    }

    /// Reply with the provider's current value under the requested name.
    fn read_back(&mut self, name: &str, index: u8) -> Reply {
        self.provider
            .get(index)
            .map(|current| CommandData::Value(ValueEnvelope::new(name, current.value)))
            .ok_or_else(|| ErrorPayload::new(ErrorKind::Unsupported, PROPERTY_READ_FAILED))
    }
}

impl<P, C> std::fmt::Debug for Slave<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slave")
            .field("serial", &self.serial)
            .field("token", &self.token)
            .field("state", &self.state)
            .field("established", &self.established)
            .finish()
    }
}
