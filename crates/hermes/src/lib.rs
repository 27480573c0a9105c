//! Hermes: a minimal RPC protocol for devices that expose named, typed
//! properties to a coordinating master.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte channel contract plus in-memory and TCP channels
//! - [`wire`]: fixed-size binary records and their codec
//! - [`peer`]: slave dispatcher, handshake, master registry (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use hermes_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use hermes_wire::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use hermes_peer::*;
}
