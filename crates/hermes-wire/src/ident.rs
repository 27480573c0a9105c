use std::fmt;

use bytes::Bytes;

use crate::error::{Result, WireError};

/// Permanent identifier of a slave device and the key of the master registry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Serial(Bytes);

/// Current authorized session of a slave.
///
/// Issued or renewed only during the handshake. `Debug` never prints the
/// bytes and tracing fields must not carry it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(Bytes);

impl Serial {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Parse a serial from hex, e.g. `00000000deadbeef`.
    pub fn from_hex(input: &str) -> Result<Self> {
        decode_hex(input).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Token {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The "no session yet" token of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self(Bytes::from(vec![0u8; len]))
    }

    pub fn from_hex(input: &str) -> Result<Self> {
        decode_hex(input).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serial({self})")
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<redacted:{} bytes>)", self.0.len())
    }
}

/// Hex form of the token, for operators who pass it back on a command line.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

fn decode_hex(input: &str) -> Result<Bytes> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(WireError::InvalidHex(input.to_string()));
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| WireError::InvalidHex(input.to_string()))
        })
        .collect::<Result<Vec<u8>>>()
        .map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_hex_display_and_parse() {
        let serial = Serial::new(vec![0x00, 0x01, 0xab, 0xff]);
        assert_eq!(serial.to_string(), "0001abff");
        assert_eq!(Serial::from_hex("0001abff").unwrap(), serial);
        assert_eq!(Serial::from_hex("0x0001ABFF").unwrap(), serial);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(Serial::from_hex(""), Err(WireError::InvalidHex(_))));
        assert!(matches!(Serial::from_hex("abc"), Err(WireError::InvalidHex(_))));
        assert!(matches!(Token::from_hex("zz11"), Err(WireError::InvalidHex(_))));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let dbg = format!("{token:?}");
        assert_eq!(dbg, "Token(<redacted:4 bytes>)");
        assert!(!dbg.contains("dead"));
    }

    #[test]
    fn test_zeroed_token() {
        let token = Token::zeroed(8);
        assert_eq!(token.len(), 8);
        assert!(token.as_bytes().iter().all(|b| *b == 0));
    }
}
