//! Byte channel contract and transports for the Hermes protocol.
//!
//! Every Hermes exchange travels over a [`Channel`]: a blocking, byte-exact
//! transport that never raises errors and reports degradation through
//! [`Channel::good`]. This is the lowest layer; the wire codec and the peers
//! build on top of it.
//!
//! Provided channels:
//! - [`MemoryChannel`]: connected in-process pair, mainly for tests
//! - [`TcpChannel`]: blocking TCP stream, created through [`TcpEndpoint`]

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryChannel, DEFAULT_CAPACITY};
pub use tcp::{TcpChannel, TcpConfig, TcpEndpoint, DEFAULT_READ_TIMEOUT};
pub use traits::Channel;
