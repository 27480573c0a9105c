use hermes_wire::{Command, ErrorPayload, Serial};

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hermes_transport::TransportError),

    /// Record-level error.
    #[error("wire error: {0}")]
    Wire(#[from] hermes_wire::WireError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The authenticator refused the slave.
    #[error("slave {serial} rejected")]
    Rejected { serial: Serial },

    /// A handshake arrived but no authenticator is configured.
    #[error("no authenticator configured")]
    MissingAuthenticator,

    /// The remote peer answered with an error payload.
    #[error("remote error: {0}")]
    Remote(ErrorPayload),

    /// The reply does not belong to the request that was sent.
    #[error("unexpected reply (expected {expected}, got {got})")]
    UnexpectedReply { expected: String, got: String },

    /// The command is never answered, so it cannot be used as a request.
    #[error("command {0} has no reply")]
    NoReply(Command),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The slave has not completed a handshake yet.
    #[error("session not established")]
    NotEstablished,
}

impl PeerError {
    /// Whether the underlying connection is no longer usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Wire(err) => err.is_fatal(),
            Self::Transport(_)
            | Self::Rejected { .. }
            | Self::MissingAuthenticator
            | Self::Disconnected(_) => true,
            Self::HandshakeFailed(_)
            | Self::Remote(_)
            | Self::UnexpectedReply { .. }
            | Self::NoReply(_)
            | Self::NotEstablished => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
