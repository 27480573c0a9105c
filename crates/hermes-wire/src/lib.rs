//! Fixed-size binary records for the Hermes RPC protocol.
//!
//! Every message between a master and a slave is one record of identical size,
//! whatever its payload:
//! - a header with the slave serial, the session token, an informational
//!   payload length and the message kind
//! - a payload union sized to its largest member (command, error, handshake)
//!
//! All integers are little-endian and fields are packed without padding.
//! Records are moved whole over a [`hermes_transport::Channel`]; a short
//! transfer is a fatal channel failure, never a partial success.

pub mod codec;
pub mod error;
pub mod ident;
pub mod message;
pub mod reader;
pub mod value;
pub mod writer;

pub use codec::{
    decode_message, decode_record, encode_message, Direction, WireConfig, ERROR_PAYLOAD_SIZE,
    HANDSHAKE_PAYLOAD_SIZE,
};
pub use error::{Result, WireError};
pub use ident::{Serial, Token};
pub use message::{
    ApiVersion, Command, CommandData, CommandPayload, ErrorKind, ErrorPayload, HandshakePayload,
    HandshakeResult, MessageKind, Payload, WireMessage, ERROR_MESSAGE_LEN,
};
pub use reader::read_message;
pub use value::{FixedPoint, Value, ValueEnvelope, ValueType};
pub use writer::write_message;
