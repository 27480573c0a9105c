/// Errors that can occur while encoding, decoding or transferring records.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The channel delivered fewer bytes than a whole record.
    #[error("short read ({actual} of {expected} bytes)")]
    ShortRead { expected: usize, actual: usize },

    /// The channel accepted fewer bytes than a whole record.
    #[error("short write ({actual} of {expected} bytes)")]
    ShortWrite { expected: usize, actual: usize },

    /// A serial or token does not have the configured length.
    #[error("{field} must be {expected} bytes, got {len}")]
    FieldLength {
        field: &'static str,
        len: usize,
        expected: usize,
    },

    /// A string does not fit its fixed-size field.
    #[error("{field} is {len} bytes, max {max}")]
    StringTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A hex identifier could not be parsed.
    #[error("invalid hex identifier '{0}'")]
    InvalidHex(String),

    /// A string field is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("unknown command {0}")]
    UnknownCommand(u8),

    #[error("unknown value type {0}")]
    UnknownValueType(u8),

    #[error("unknown error kind {0}")]
    UnknownErrorKind(u8),

    #[error("unknown handshake result {0}")]
    UnknownHandshakeResult(u8),

    /// A value was read as a type other than the one it carries.
    #[error("value type mismatch (expected {expected}, found {found})")]
    TypeMismatch {
        expected: crate::value::ValueType,
        found: crate::value::ValueType,
    },

    /// The wire configuration cannot describe a valid record.
    #[error("invalid wire config: {0}")]
    InvalidConfig(String),

    /// Fewer bytes than a whole record were handed to the decoder.
    #[error("incomplete record ({actual} of {expected} bytes)")]
    IncompleteRecord { expected: usize, actual: usize },
}

impl WireError {
    /// Whether the channel that produced this error is no longer usable.
    ///
    /// Short transfers leave the stream misaligned. Every other error concerns
    /// a single record that was consumed in full.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ShortRead { .. } | Self::ShortWrite { .. })
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
