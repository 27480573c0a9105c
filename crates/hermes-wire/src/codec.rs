use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::ident::{Serial, Token};
use crate::message::{
    ApiVersion, Command, CommandData, CommandPayload, ErrorKind, ErrorPayload, HandshakePayload,
    HandshakeResult, MessageKind, Payload, WireMessage, ERROR_MESSAGE_LEN,
};
use crate::value::{FixedPoint, Value, ValueEnvelope, ValueType};

/// Handshake payload: three versions of three bytes plus the result byte.
pub const HANDSHAKE_PAYLOAD_SIZE: usize = 3 * 3 + 1;

/// Error payload: kind byte plus the fixed message field.
pub const ERROR_PAYLOAD_SIZE: usize = 1 + ERROR_MESSAGE_LEN;

/// Fixed-point member of the value union: `i32` value plus `u16` precision.
const FIXED_POINT_SIZE: usize = 4 + 2;

/// `payloadLength` (2) + kind (1).
const HEADER_TAIL_SIZE: usize = 2 + 1;

/// Field widths both peers must agree on. The record size follows from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireConfig {
    /// Serial length in bytes. Default: 8.
    pub serial_len: usize,
    /// Token length in bytes. Default: 8.
    pub token_len: usize,
    /// Property name field width. Default: 64.
    pub name_len: usize,
    /// String value field width. Default: 64.
    pub string_len: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            serial_len: 8,
            token_len: 8,
            name_len: 64,
            string_len: 64,
        }
    }
}

impl WireConfig {
    pub fn validate(&self) -> Result<()> {
        if self.serial_len == 0 || self.token_len == 0 {
            return Err(WireError::InvalidConfig(
                "serial and token lengths must be non-zero".to_string(),
            ));
        }
        if self.name_len == 0 {
            return Err(WireError::InvalidConfig(
                "name length must be non-zero".to_string(),
            ));
        }
        if self.string_len < FIXED_POINT_SIZE {
            return Err(WireError::InvalidConfig(format!(
                "string length must be at least {FIXED_POINT_SIZE}"
            )));
        }
        if self.payload_size() > usize::from(u16::MAX) {
            return Err(WireError::InvalidConfig(format!(
                "payload of {} bytes does not fit the length field",
                self.payload_size()
            )));
        }
        Ok(())
    }

    /// Width of the value union.
    pub fn value_size(&self) -> usize {
        self.string_len.max(FIXED_POINT_SIZE)
    }

    /// Name field + type tag + value union.
    pub fn envelope_size(&self) -> usize {
        self.name_len + 1 + self.value_size()
    }

    pub fn command_data_size(&self) -> usize {
        self.envelope_size().max(self.name_len).max(1)
    }

    pub fn command_payload_size(&self) -> usize {
        1 + self.command_data_size()
    }

    /// Width of the payload union.
    pub fn payload_size(&self) -> usize {
        self.command_payload_size()
            .max(ERROR_PAYLOAD_SIZE)
            .max(HANDSHAKE_PAYLOAD_SIZE)
    }

    pub fn header_size(&self) -> usize {
        self.serial_len + self.token_len + HEADER_TAIL_SIZE
    }

    /// Size of every record on the wire.
    pub fn record_size(&self) -> usize {
        self.header_size() + self.payload_size()
    }

    /// Meaningful byte count of `payload`'s active member.
    pub fn payload_length(&self, payload: &Payload) -> usize {
        match payload {
            Payload::Error(_) | Payload::InternalError(_) => ERROR_PAYLOAD_SIZE,
            Payload::Handshake(_) => HANDSHAKE_PAYLOAD_SIZE,
            Payload::Command(cmd) => {
                1 + match &cmd.data {
                    CommandData::Empty => 0,
                    CommandData::Index(_) | CommandData::Count(_) => 1,
                    CommandData::Name(_) | CommandData::Text(_) => self.name_len,
                    CommandData::Value(_) => self.envelope_size(),
                }
            }
        }
    }
}

/// Whether a record travels from master to slave or back.
///
/// The command data union has no tag of its own; the active member depends on
/// the command and on the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Master to slave (handshakes travel this way too).
    Request,
    /// Slave to master.
    Reply,
}

/// Encode a message as one fixed-size record.
///
/// Wire format (little-endian, packed):
/// ```text
/// ┌──────────┬──────────┬────────────────┬──────────┬───────────────────┐
/// │ serial   │ token    │ payloadLength  │ kind     │ payload union     │
/// │ (S B)    │ (T B)    │ (2B LE)        │ (1B)     │ (zero-padded)     │
/// └──────────┴──────────┴────────────────┴──────────┴───────────────────┘
/// ```
///
/// On error nothing is appended to `dst`.
pub fn encode_message(msg: &WireMessage, config: &WireConfig, dst: &mut BytesMut) -> Result<()> {
    config.validate()?;
    check_len("serial", msg.serial.len(), config.serial_len)?;
    check_len("token", msg.token.len(), config.token_len)?;

    let start = dst.len();
    dst.reserve(config.record_size());
    let encoded = encode_into(msg, config, dst);
    if encoded.is_err() {
        dst.truncate(start);
    }
    encoded
}

fn encode_into(msg: &WireMessage, config: &WireConfig, dst: &mut BytesMut) -> Result<()> {
    dst.put_slice(msg.serial.as_bytes());
    dst.put_slice(msg.token.as_bytes());
    // validate() bounds the payload union by u16::MAX.
    dst.put_u16_le(msg.payload_length(config) as u16);
    dst.put_u8(msg.kind().as_u8());

    let payload_start = dst.len();
    match &msg.payload {
        Payload::Error(err) | Payload::InternalError(err) => encode_error(err, dst)?,
        Payload::Command(cmd) => encode_command(cmd, config, dst)?,
        Payload::Handshake(hs) => encode_handshake(hs, dst),
    }
    let written = dst.len() - payload_start;
    dst.put_bytes(0, config.payload_size() - written);
    Ok(())
}

fn encode_error(err: &ErrorPayload, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(err.kind.as_u8());
    put_str(dst, "error message", &err.message, ERROR_MESSAGE_LEN)
}

fn encode_handshake(hs: &HandshakePayload, dst: &mut BytesMut) {
    for version in [hs.desired, hs.minimum, hs.maximum] {
        dst.put_u8(version.release);
        dst.put_u8(version.major);
        dst.put_u8(version.minor);
    }
    dst.put_u8(hs.result.as_u8());
}

fn encode_command(cmd: &CommandPayload, config: &WireConfig, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(cmd.command.as_u8());
    match &cmd.data {
        CommandData::Empty => Ok(()),
        CommandData::Index(v) | CommandData::Count(v) => {
            dst.put_u8(*v);
            Ok(())
        }
        CommandData::Name(name) => put_str(dst, "property name", name, config.name_len),
        CommandData::Text(text) => put_str(dst, "property name", text, config.name_len),
        CommandData::Value(envelope) => encode_envelope(envelope, config, dst),
    }
}

fn encode_envelope(envelope: &ValueEnvelope, config: &WireConfig, dst: &mut BytesMut) -> Result<()> {
    put_str(dst, "property name", &envelope.name, config.name_len)?;
    dst.put_u8(envelope.value_type().as_u8());

    let value_start = dst.len();
    match &envelope.value {
        Value::Boolean(v) => dst.put_u8(u8::from(*v)),
        Value::Integer(v) => dst.put_i32_le(*v),
        Value::UnsignedInteger(v) => dst.put_u32_le(*v),
        Value::String(v) => put_str(dst, "string value", v, config.string_len)?,
        Value::Float(fp) => {
            dst.put_i32_le(fp.scaled);
            dst.put_u16_le(fp.precision);
        }
    }
    let written = dst.len() - value_start;
    dst.put_bytes(0, config.value_size() - written);
    Ok(())
}

/// Decode one record from `src`.
///
/// Returns `Ok(None)` while fewer than [`WireConfig::record_size`] bytes are
/// buffered. Otherwise exactly one record is consumed, even when its content
/// turns out to be malformed, so the stream stays aligned.
pub fn decode_message(
    src: &mut BytesMut,
    config: &WireConfig,
    direction: Direction,
) -> Result<Option<WireMessage>> {
    config.validate()?;
    let size = config.record_size();
    if src.len() < size {
        return Ok(None);
    }
    let record = src.split_to(size).freeze();
    decode_record(record, config, direction).map(Some)
}

/// Decode a record that is already exactly [`WireConfig::record_size`] long.
pub fn decode_record(mut record: Bytes, config: &WireConfig, direction: Direction) -> Result<WireMessage> {
    if record.len() != config.record_size() {
        return Err(WireError::IncompleteRecord {
            expected: config.record_size(),
            actual: record.len(),
        });
    }

    let serial = Serial::new(record.split_to(config.serial_len));
    let token = Token::new(record.split_to(config.token_len));
    let _payload_length = record.get_u16_le();
    let kind = MessageKind::from_u8(record.get_u8())?;

    let payload = match kind {
        MessageKind::Error => Payload::Error(decode_error(&mut record)?),
        MessageKind::InternalError => Payload::InternalError(decode_error(&mut record)?),
        MessageKind::Command => Payload::Command(decode_command(&mut record, config, direction)?),
        MessageKind::Handshake => Payload::Handshake(decode_handshake(&mut record)?),
    };

    Ok(WireMessage::new(serial, token, payload))
}

fn decode_error(src: &mut Bytes) -> Result<ErrorPayload> {
    let kind = ErrorKind::from_u8(src.get_u8())?;
    let message = get_str(&src.split_to(ERROR_MESSAGE_LEN), "error message")?;
    Ok(ErrorPayload { kind, message })
}

fn decode_handshake(src: &mut Bytes) -> Result<HandshakePayload> {
    let mut version = || ApiVersion::new(src.get_u8(), src.get_u8(), src.get_u8());
    let desired = version();
    let minimum = version();
    let maximum = version();
    let result = HandshakeResult::from_u8(src.get_u8())?;
    Ok(HandshakePayload {
        desired,
        minimum,
        maximum,
        result,
    })
}

fn decode_command(src: &mut Bytes, config: &WireConfig, direction: Direction) -> Result<CommandPayload> {
    let command = Command::from_u8(src.get_u8())?;
    let mut data = src.split_to(config.command_data_size());

    let data = match (command, direction) {
        (Command::Disconnect | Command::PollEvents, _) => CommandData::Empty,
        (Command::GetPropertiesCount, Direction::Request) => CommandData::Empty,
        (Command::GetPropertiesCount, Direction::Reply) => CommandData::Count(data.get_u8()),
        (Command::GetPropertyName, Direction::Request) => CommandData::Index(data.get_u8()),
        (Command::GetPropertyName, Direction::Reply) => {
            CommandData::Text(get_str(&data[..config.name_len], "property name")?)
        }
        (Command::Get, Direction::Request) => {
            CommandData::Name(get_str(&data[..config.name_len], "property name")?)
        }
        (Command::Get, Direction::Reply) | (Command::Set, _) => {
            CommandData::Value(decode_envelope(&mut data, config)?)
        }
    };

    Ok(CommandPayload { command, data })
}

fn decode_envelope(src: &mut Bytes, config: &WireConfig) -> Result<ValueEnvelope> {
    let name = get_str(&src.split_to(config.name_len), "property name")?;
    let value_type = ValueType::from_u8(src.get_u8())?;
    let mut raw = src.split_to(config.value_size());

    let value = match value_type {
        ValueType::Boolean => Value::Boolean(raw.get_u8() != 0),
        ValueType::Integer => Value::Integer(raw.get_i32_le()),
        ValueType::UnsignedInteger => Value::UnsignedInteger(raw.get_u32_le()),
        ValueType::String => Value::String(get_str(&raw[..config.string_len], "string value")?),
        ValueType::Float => {
            let scaled = raw.get_i32_le();
            let precision = raw.get_u16_le();
            Value::Float(FixedPoint::new(scaled, precision))
        }
    };

    Ok(ValueEnvelope { name, value })
}

fn check_len(field: &'static str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(WireError::FieldLength {
            field,
            len,
            expected,
        });
    }
    Ok(())
}

/// Write `value` into a zero-padded field of `width` bytes.
fn put_str(dst: &mut BytesMut, field: &'static str, value: &str, width: usize) -> Result<()> {
    if value.len() > width {
        return Err(WireError::StringTooLong {
            field,
            len: value.len(),
            max: width,
        });
    }
    dst.put_slice(value.as_bytes());
    dst.put_bytes(0, width - value.len());
    Ok(())
}

/// Read a NUL-terminated string, or the whole field when it has no NUL.
fn get_str(raw: &[u8], field: &'static str) -> Result<String> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_owned)
        .map_err(|_| WireError::InvalidUtf8 { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial() -> Serial {
        Serial::new(vec![0, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef])
    }

    fn token() -> Token {
        Token::new(vec![1, 2, 3, 4, 5, 6, 7, 8])
    }

    fn encode(msg: &WireMessage) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_message(msg, &WireConfig::default(), &mut buf).unwrap();
        buf
    }

    fn decode(buf: &mut BytesMut, direction: Direction) -> WireMessage {
        decode_message(buf, &WireConfig::default(), direction)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_default_sizes() {
        let cfg = WireConfig::default();
        assert_eq!(cfg.envelope_size(), 129);
        assert_eq!(cfg.command_payload_size(), 130);
        assert_eq!(ERROR_PAYLOAD_SIZE, 101);
        assert_eq!(HANDSHAKE_PAYLOAD_SIZE, 10);
        assert_eq!(cfg.payload_size(), 130);
        assert_eq!(cfg.record_size(), 149);
    }

    #[test]
    fn test_every_kind_encodes_to_record_size() {
        let cfg = WireConfig::default();
        let messages = [
            WireMessage::command(serial(), token(), CommandPayload::properties_count()),
            WireMessage::error(serial(), token(), ErrorKind::Unsupported, "Bad property index"),
            WireMessage::handshake(serial(), token(), HandshakePayload::offer(ApiVersion::default())),
        ];
        for msg in &messages {
            assert_eq!(encode(msg).len(), cfg.record_size());
        }
    }

    #[test]
    fn test_header_layout() {
        let msg = WireMessage::command(serial(), token(), CommandPayload::property_name(7));
        let buf = encode(&msg);

        assert_eq!(&buf[0..8], serial().as_bytes());
        assert_eq!(&buf[8..16], token().as_bytes());
        assert_eq!(u16::from_le_bytes([buf[16], buf[17]]), 2);
        assert_eq!(buf[18], MessageKind::Command.as_u8());
        assert_eq!(buf[19], Command::GetPropertyName.as_u8());
        assert_eq!(buf[20], 7);
        assert!(buf[21..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_value_envelope_roundtrip_each_type() {
        let values = [
            Value::Boolean(true),
            Value::Integer(-42),
            Value::UnsignedInteger(4_000_000_000),
            Value::String("Widget".to_string()),
            Value::Float(FixedPoint::new(3140, 1000)),
        ];
        for value in values {
            let envelope = ValueEnvelope::new("prop", value);
            let msg = WireMessage::command(serial(), token(), CommandPayload::set(envelope.clone()));
            let mut buf = encode(&msg);

            let decoded = decode(&mut buf, Direction::Request);
            assert_eq!(decoded, msg);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_get_depends_on_direction() {
        let request = WireMessage::command(serial(), token(), CommandPayload::get("Model"));
        let mut buf = encode(&request);
        let decoded = decode(&mut buf, Direction::Request);
        assert_eq!(
            decoded.payload,
            Payload::Command(CommandPayload::get("Model"))
        );

        let reply = WireMessage::command(
            serial(),
            token(),
            CommandPayload::new(
                Command::Get,
                CommandData::Value(ValueEnvelope::new("Model", Value::String("Widget".into()))),
            ),
        );
        let mut buf = encode(&reply);
        assert_eq!(decode(&mut buf, Direction::Reply), reply);
    }

    #[test]
    fn test_count_and_name_replies() {
        let count = WireMessage::command(
            serial(),
            token(),
            CommandPayload::new(Command::GetPropertiesCount, CommandData::Count(3)),
        );
        let mut buf = encode(&count);
        assert_eq!(decode(&mut buf, Direction::Reply), count);

        let name = WireMessage::command(
            serial(),
            token(),
            CommandPayload::new(Command::GetPropertyName, CommandData::Text("Level".into())),
        );
        let mut buf = encode(&name);
        assert_eq!(decode(&mut buf, Direction::Reply), name);
    }

    #[test]
    fn test_error_and_handshake_roundtrip() {
        let err = WireMessage::error(serial(), token(), ErrorKind::AccessDenied, "Invalid session token");
        let mut buf = encode(&err);
        assert_eq!(decode(&mut buf, Direction::Reply), err);

        let mut hs = HandshakePayload::offer(ApiVersion::new(1, 2, 3));
        hs.result = HandshakeResult::Fail;
        let msg = WireMessage::handshake(serial(), token(), hs);
        let mut buf = encode(&msg);
        assert_eq!(decode(&mut buf, Direction::Request), msg);
    }

    #[test]
    fn test_full_width_name_has_no_terminator() {
        let name = "n".repeat(64);
        let msg = WireMessage::command(serial(), token(), CommandPayload::get(name.clone()));
        let mut buf = encode(&msg);
        assert_eq!(
            decode(&mut buf, Direction::Request).payload,
            Payload::Command(CommandPayload::get(name))
        );
    }

    #[test]
    fn test_decode_incomplete_record() {
        let msg = WireMessage::command(serial(), token(), CommandPayload::properties_count());
        let mut buf = encode(&msg);
        buf.truncate(100);

        let result = decode_message(&mut buf, &WireConfig::default(), Direction::Request).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn test_unknown_kind_consumes_record() {
        let msg = WireMessage::command(serial(), token(), CommandPayload::properties_count());
        let mut buf = encode(&msg);
        buf[18] = 42;
        buf.extend_from_slice(&encode(&msg));

        let result = decode_message(&mut buf, &WireConfig::default(), Direction::Request);
        match result {
            Err(err) => {
                assert!(matches!(err, WireError::UnknownKind(42)));
                assert!(!err.is_fatal());
            }
            Ok(_) => panic!("expected unknown kind"),
        }
        assert_eq!(decode(&mut buf, Direction::Request), msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_value_type_and_bad_utf8() {
        let envelope = ValueEnvelope::new("x", Value::Integer(1));
        let msg = WireMessage::command(serial(), token(), CommandPayload::set(envelope));

        let mut buf = encode(&msg);
        buf[20 + 64] = 9;
        let result = decode_message(&mut buf, &WireConfig::default(), Direction::Request);
        assert!(matches!(result, Err(WireError::UnknownValueType(9))));

        let mut buf = encode(&msg);
        buf[20] = 0xff;
        let result = decode_message(&mut buf, &WireConfig::default(), Direction::Request);
        assert!(matches!(result, Err(WireError::InvalidUtf8 { .. })));
    }

    #[test]
    fn test_encode_rejects_long_strings_without_writing() {
        let long = "x".repeat(65);
        let msg = WireMessage::command(serial(), token(), CommandPayload::get(long));
        let mut buf = BytesMut::from(&b"keep"[..]);

        let result = encode_message(&msg, &WireConfig::default(), &mut buf);
        assert!(matches!(
            result,
            Err(WireError::StringTooLong { len: 65, max: 64, .. })
        ));
        assert_eq!(&buf[..], b"keep");

        let msg = WireMessage::error(serial(), token(), ErrorKind::Ok, "e".repeat(101));
        assert!(encode_message(&msg, &WireConfig::default(), &mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_encode_rejects_wrong_identifier_length() {
        let msg = WireMessage::command(Serial::new(vec![1, 2]), token(), CommandPayload::disconnect());
        let result = encode_message(&msg, &WireConfig::default(), &mut BytesMut::new());
        assert!(matches!(
            result,
            Err(WireError::FieldLength {
                field: "serial",
                len: 2,
                expected: 8
            })
        ));
    }

    #[test]
    fn test_custom_config_sizes() {
        let cfg = WireConfig {
            serial_len: 4,
            token_len: 16,
            name_len: 16,
            string_len: 8,
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.envelope_size(), 25);
        assert_eq!(cfg.payload_size(), ERROR_PAYLOAD_SIZE);
        assert_eq!(cfg.record_size(), 4 + 16 + 3 + 101);

        let msg = WireMessage::command(
            Serial::new(vec![9; 4]),
            Token::zeroed(16),
            CommandPayload::set(ValueEnvelope::new("t", Value::String("12345678".into()))),
        );
        let mut buf = BytesMut::new();
        encode_message(&msg, &cfg, &mut buf).unwrap();
        assert_eq!(buf.len(), cfg.record_size());
        let decoded = decode_message(&mut buf, &cfg, Direction::Request).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_invalid_config() {
        let cfg = WireConfig {
            string_len: 4,
            ..WireConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(WireError::InvalidConfig(_))));

        let cfg = WireConfig {
            serial_len: 0,
            ..WireConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_payload_length() {
        let cfg = WireConfig::default();
        let msg = WireMessage::command(serial(), token(), CommandPayload::disconnect());
        assert_eq!(msg.payload_length(&cfg), 1);
        let msg = WireMessage::command(
            serial(),
            token(),
            CommandPayload::set(ValueEnvelope::new("a", Value::Boolean(false))),
        );
        assert_eq!(msg.payload_length(&cfg), 130);
        let msg = WireMessage::error(serial(), token(), ErrorKind::Ok, "");
        assert_eq!(msg.payload_length(&cfg), 101);
    }
}
