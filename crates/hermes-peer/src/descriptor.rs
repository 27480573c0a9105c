use std::fmt;

use bytes::BytesMut;
use hermes_transport::Channel;
use hermes_wire::{
    read_message, write_message, Command, CommandData, CommandPayload, Direction, MessageKind,
    Payload, Serial, Token, Value, ValueEnvelope, ValueType, WireMessage,
};
use tracing::{debug, info, trace};

use crate::error::{PeerError, Result};
use crate::master::MasterConfig;
use crate::provider::PropertyProvider;

/// The master's handle on one registered slave.
///
/// Every accessor is one or more synchronous round trips over the slave's
/// channel, stamped with the slave's serial and session token. The `try_*`
/// methods report failures; the [`PropertyProvider`] impl folds them into
/// falsy values.
pub struct SlaveDescriptor {
    serial: Serial,
    token: Token,
    channel: Box<dyn Channel>,
    scratch: BytesMut,
    config: MasterConfig,
}

impl SlaveDescriptor {
    pub(crate) fn new(
        serial: Serial,
        token: Token,
        channel: Box<dyn Channel>,
        config: MasterConfig,
    ) -> Self {
        Self {
            serial,
            token,
            channel,
            scratch: BytesMut::with_capacity(config.wire.record_size()),
            config,
        }
    }

    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    /// Current session token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Whether the slave's channel is still good.
    pub fn is_connected(&self) -> bool {
        self.channel.good()
    }

    /// Move the descriptor to a new connection of the same slave.
    pub(crate) fn rebind(&mut self, channel: Box<dyn Channel>, token: Token) {
        self.channel = channel;
        self.token = token;
        self.scratch.clear();
    }

    /// Send `command` and return the slave's reply.
    ///
    /// Error replies become [`PeerError::Remote`]. A reply for another
    /// command, of another kind or (with `verify_replies`) from another serial
    /// is [`PeerError::UnexpectedReply`].
    pub fn request(&mut self, command: CommandPayload) -> Result<WireMessage> {
        let expected = command.command;
        if matches!(expected, Command::Disconnect | Command::PollEvents) {
            return Err(PeerError::NoReply(expected));
        }

        let msg = WireMessage::command(self.serial.clone(), self.token.clone(), command);
        write_message(&mut self.channel, &mut self.scratch, &msg, &self.config.wire)?;
        let reply = read_message(
            &mut self.channel,
            &mut self.scratch,
            &self.config.wire,
            Direction::Reply,
        )?;
        trace!(serial = %self.serial, command = %expected, kind = %reply.kind(), "reply received");

        if self.config.verify_replies && reply.serial != self.serial {
            return Err(PeerError::UnexpectedReply {
                expected: format!("serial {}", self.serial),
                got: format!("serial {}", reply.serial),
            });
        }

        match &reply.payload {
            Payload::Error(err) | Payload::InternalError(err) => Err(PeerError::Remote(err.clone())),
            Payload::Command(cmd) if cmd.command == expected => Ok(reply),
            Payload::Command(cmd) => Err(PeerError::UnexpectedReply {
                expected: expected.to_string(),
                got: cmd.command.to_string(),
            }),
            other => Err(PeerError::UnexpectedReply {
                expected: MessageKind::Command.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Send a command the slave does not answer.
    fn notify(&mut self, command: CommandPayload) -> Result<()> {
        let msg = WireMessage::command(self.serial.clone(), self.token.clone(), command);
        write_message(&mut self.channel, &mut self.scratch, &msg, &self.config.wire)?;
        Ok(())
    }

    fn request_data(&mut self, command: CommandPayload) -> Result<CommandData> {
        let expected = command.command;
        let reply = self.request(command)?;
        match reply.payload {
            Payload::Command(cmd) => Ok(cmd.data),
            other => Err(PeerError::UnexpectedReply {
                expected: expected.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    fn request_value(&mut self, command: CommandPayload) -> Result<ValueEnvelope> {
        match self.request_data(command)? {
            CommandData::Value(envelope) => Ok(envelope),
            other => Err(unexpected_data("value", &other)),
        }
    }

    pub fn try_properties_count(&mut self) -> Result<u8> {
        match self.request_data(CommandPayload::properties_count())? {
            CommandData::Count(count) => Ok(count),
            other => Err(unexpected_data("count", &other)),
        }
    }

    pub fn try_property_name(&mut self, index: u8) -> Result<String> {
        match self.request_data(CommandPayload::property_name(index))? {
            CommandData::Text(name) => Ok(name),
            other => Err(unexpected_data("name", &other)),
        }
    }

    /// Ask for names one round trip at a time until `name` matches.
    pub fn try_property_index(&mut self, name: &str) -> Result<Option<u8>> {
        let count = self.try_properties_count()?;
        for index in 0..count {
            if self.try_property_name(index)? == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Type of the property at `index`. Costs a full value fetch.
    pub fn try_property_type(&mut self, index: u8) -> Result<ValueType> {
        self.try_get(index).map(|envelope| envelope.value_type())
    }

    pub fn try_get(&mut self, index: u8) -> Result<ValueEnvelope> {
        let name = self.try_property_name(index)?;
        self.get_by_name(&name)
    }

    /// Write `value` to the property at `index` and return the value the slave
    /// reports afterwards.
    pub fn try_set(&mut self, index: u8, value: &ValueEnvelope) -> Result<ValueEnvelope> {
        let name = self.try_property_name(index)?;
        self.set_by_name(&name, value.value.clone())
    }

    pub fn get_by_name(&mut self, name: &str) -> Result<ValueEnvelope> {
        self.request_value(CommandPayload::get(name))
    }

    pub fn set_by_name(&mut self, name: &str, value: Value) -> Result<ValueEnvelope> {
        self.request_value(CommandPayload::set(ValueEnvelope::new(name, value)))
    }

    /// Tell the slave to disconnect, then close the channel.
    ///
    /// The `Disconnect` command is best effort.
    pub fn close(&mut self) -> bool {
        if let Err(err) = self.notify(CommandPayload::disconnect()) {
            debug!(serial = %self.serial, error = %err, "disconnect not delivered");
        }
        info!(serial = %self.serial, "closing slave");
        self.channel.close()
    }
}

fn unexpected_data(expected: &str, got: &CommandData) -> PeerError {
    let got = match got {
        CommandData::Empty => "empty",
        CommandData::Index(_) => "index",
        CommandData::Count(_) => "count",
        CommandData::Name(_) => "name",
        CommandData::Value(_) => "value",
        CommandData::Text(_) => "text",
    };
    PeerError::UnexpectedReply {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

impl PropertyProvider for SlaveDescriptor {
    fn properties_count(&mut self) -> u8 {
        self.try_properties_count()
            .inspect_err(|err| debug!(serial = %self.serial, error = %err, "count failed"))
            .unwrap_or(0)
    }

    fn property_name(&mut self, index: u8) -> Option<String> {
        self.try_property_name(index).ok()
    }

    fn property_index(&mut self, name: &str) -> Option<u8> {
        self.try_property_index(name).ok().flatten()
    }

    fn property_type(&mut self, index: u8) -> Option<ValueType> {
        self.try_property_type(index).ok()
    }

    fn get(&mut self, index: u8) -> Option<ValueEnvelope> {
        self.try_get(index)
            .inspect_err(|err| debug!(serial = %self.serial, index, error = %err, "get failed"))
            .ok()
    }

    fn set(&mut self, index: u8, value: &ValueEnvelope) -> bool {
        self.try_set(index, value)
            .inspect_err(|err| debug!(serial = %self.serial, index, error = %err, "set failed"))
            .is_ok()
    }
}

impl fmt::Debug for SlaveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaveDescriptor")
            .field("serial", &self.serial)
            .field("token", &self.token)
            .field("connected", &self.channel.good())
            .finish()
    }
}
