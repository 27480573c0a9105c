use std::fmt;

use crate::codec::WireConfig;
use crate::error::{Result, WireError};
use crate::ident::{Serial, Token};
use crate::value::ValueEnvelope;

/// Which payload member a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Error = 0,
    InternalError = 1,
    Command = 2,
    Handshake = 3,
}

impl MessageKind {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Error),
            1 => Ok(Self::InternalError),
            2 => Ok(Self::Command),
            3 => Ok(Self::Handshake),
            other => Err(WireError::UnknownKind(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::InternalError => "internal-error",
            Self::Command => "command",
            Self::Handshake => "handshake",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Disconnect = 0,
    PollEvents = 1,
    Set = 2,
    Get = 3,
    GetPropertiesCount = 4,
    GetPropertyName = 5,
}

impl Command {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Disconnect),
            1 => Ok(Self::PollEvents),
            2 => Ok(Self::Set),
            3 => Ok(Self::Get),
            4 => Ok(Self::GetPropertiesCount),
            5 => Ok(Self::GetPropertyName),
            other => Err(WireError::UnknownCommand(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnect => "disconnect",
            Self::PollEvents => "poll-events",
            Self::Set => "set",
            Self::Get => "get",
            Self::GetPropertiesCount => "get-properties-count",
            Self::GetPropertyName => "get-property-name",
        })
    }
}

/// The active member of a command's data union.
///
/// Which member is valid depends on the command and on whether the record is
/// a request or a reply; see [`Direction`](crate::Direction).
#[derive(Debug, Clone, PartialEq)]
pub enum CommandData {
    Empty,
    /// Property index of a `GetPropertyName` request.
    Index(u8),
    /// Property count of a `GetPropertiesCount` reply.
    Count(u8),
    /// Property name of a `Get` request, carried in the envelope name field.
    Name(String),
    /// Envelope of a `Set` request and of `Get`/`Set` replies.
    Value(ValueEnvelope),
    /// Property name of a `GetPropertyName` reply.
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandPayload {
    pub command: Command,
    pub data: CommandData,
}

impl CommandPayload {
    pub fn new(command: Command, data: CommandData) -> Self {
        Self { command, data }
    }

    pub fn properties_count() -> Self {
        Self::new(Command::GetPropertiesCount, CommandData::Empty)
    }

    pub fn property_name(index: u8) -> Self {
        Self::new(Command::GetPropertyName, CommandData::Index(index))
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(Command::Get, CommandData::Name(name.into()))
    }

    pub fn set(envelope: ValueEnvelope) -> Self {
        Self::new(Command::Set, CommandData::Value(envelope))
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect, CommandData::Empty)
    }

    pub fn poll_events() -> Self {
        Self::new(Command::PollEvents, CommandData::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    Ok = 0,
    Unsupported = 1,
    AccessDenied = 2,
    BadType = 3,
}

impl ErrorKind {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Unsupported),
            2 => Ok(Self::AccessDenied),
            3 => Ok(Self::BadType),
            other => Err(WireError::UnknownErrorKind(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Unsupported => "unsupported",
            Self::AccessDenied => "access denied",
            Self::BadType => "bad type",
        })
    }
}

/// Maximum length of an error message in bytes.
pub const ERROR_MESSAGE_LEN: usize = 100;

/// A protocol-level error reported by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub release: u8,
    pub major: u8,
    pub minor: u8,
}

impl ApiVersion {
    pub const fn new(release: u8, major: u8, minor: u8) -> Self {
        Self {
            release,
            major,
            minor,
        }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.release, self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeResult {
    Ok = 0,
    RetryLater = 1,
    Fail = 255,
}

impl HandshakeResult {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Ok),
            1 => Ok(Self::RetryLater),
            255 => Ok(Self::Fail),
            other => Err(WireError::UnknownHandshakeResult(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePayload {
    pub desired: ApiVersion,
    pub minimum: ApiVersion,
    pub maximum: ApiVersion,
    pub result: HandshakeResult,
}

impl HandshakePayload {
    /// An initiator's offer for exactly `version`.
    pub fn offer(version: ApiVersion) -> Self {
        Self {
            desired: version,
            minimum: version,
            maximum: version,
            result: HandshakeResult::Ok,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Error(ErrorPayload),
    InternalError(ErrorPayload),
    Command(CommandPayload),
    Handshake(HandshakePayload),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Error(_) => MessageKind::Error,
            Self::InternalError(_) => MessageKind::InternalError,
            Self::Command(_) => MessageKind::Command,
            Self::Handshake(_) => MessageKind::Handshake,
        }
    }
}

/// One protocol record: addressing header plus exactly one payload member.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub serial: Serial,
    pub token: Token,
    pub payload: Payload,
}

impl WireMessage {
    pub fn new(serial: Serial, token: Token, payload: Payload) -> Self {
        Self {
            serial,
            token,
            payload,
        }
    }

    pub fn command(serial: Serial, token: Token, command: CommandPayload) -> Self {
        Self::new(serial, token, Payload::Command(command))
    }

    pub fn error(serial: Serial, token: Token, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(serial, token, Payload::Error(ErrorPayload::new(kind, message)))
    }

    pub fn handshake(serial: Serial, token: Token, handshake: HandshakePayload) -> Self {
        Self::new(serial, token, Payload::Handshake(handshake))
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// The command identifier, for command records.
    pub fn command_id(&self) -> Option<Command> {
        match &self.payload {
            Payload::Command(cmd) => Some(cmd.command),
            _ => None,
        }
    }

    /// Meaningful byte count of the active payload member.
    ///
    /// Informational only; every record has the same total size.
    pub fn payload_length(&self, config: &WireConfig) -> usize {
        config.payload_length(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_payload() {
        let serial = Serial::new(vec![1u8; 8]);
        let token = Token::zeroed(8);

        let msg = WireMessage::command(serial.clone(), token.clone(), CommandPayload::properties_count());
        assert_eq!(msg.kind(), MessageKind::Command);
        assert_eq!(msg.command_id(), Some(Command::GetPropertiesCount));

        let msg = WireMessage::error(serial.clone(), token.clone(), ErrorKind::BadType, "nope");
        assert_eq!(msg.kind(), MessageKind::Error);
        assert_eq!(msg.command_id(), None);

        let msg = WireMessage::handshake(serial, token, HandshakePayload::offer(ApiVersion::default()));
        assert_eq!(msg.kind(), MessageKind::Handshake);
    }

    #[test]
    fn test_tag_conversions() {
        for tag in 0..=3u8 {
            assert_eq!(MessageKind::from_u8(tag).unwrap().as_u8(), tag);
            assert_eq!(ErrorKind::from_u8(tag).unwrap().as_u8(), tag);
        }
        for tag in 0..=5u8 {
            assert_eq!(Command::from_u8(tag).unwrap().as_u8(), tag);
        }
        assert!(matches!(MessageKind::from_u8(9), Err(WireError::UnknownKind(9))));
        assert!(matches!(Command::from_u8(6), Err(WireError::UnknownCommand(6))));
        assert_eq!(HandshakeResult::from_u8(255).unwrap(), HandshakeResult::Fail);
        assert!(matches!(
            HandshakeResult::from_u8(2),
            Err(WireError::UnknownHandshakeResult(2))
        ));
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(Command::GetPropertyName.to_string(), "get-property-name");
        assert_eq!(MessageKind::InternalError.to_string(), "internal-error");
        assert_eq!(ApiVersion::new(1, 2, 3).to_string(), "1.2.3");
        assert_eq!(
            ErrorPayload::new(ErrorKind::AccessDenied, "Invalid session token").to_string(),
            "access denied: Invalid session token"
        );
    }
}
