//! Protocol engine of the Hermes RPC protocol.
//!
//! A slave exposes a small set of named, typed properties through a
//! [`PropertyProvider`]; a master authenticates slaves and reads or writes
//! those properties through a [`SlaveDescriptor`] stub. Every access is one
//! synchronous request/response exchange of fixed-size records.

pub mod connector;
pub mod descriptor;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod master;
pub mod property;
pub mod provider;
pub mod slave;

pub use connector::{connect_slave, ConnectConfig};
pub use descriptor::SlaveDescriptor;
pub use error::{PeerError, Result};
pub use handshake::{initiate, issue_token, random_serial, respond, Authenticator, TokenAuthority};
pub use listener::MasterListener;
pub use master::{Master, MasterConfig};
pub use property::{Property, PropertyTable};
pub use provider::PropertyProvider;
pub use slave::{Dispatch, Slave, SlaveConfig, SlaveState};
