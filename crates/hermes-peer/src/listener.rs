use std::net::SocketAddr;

use hermes_transport::{TcpConfig, TcpEndpoint};

use crate::error::Result;
use crate::master::Master;

/// Accepts TCP connections and feeds them into a [`Master`].
pub struct MasterListener {
    endpoint: TcpEndpoint,
    master: Master,
}

impl MasterListener {
    /// Bind to a TCP address such as `0.0.0.0:1311`.
    pub fn bind(addr: &str, master: Master) -> Result<Self> {
        Self::bind_with_config(addr, master, TcpConfig::default())
    }

    pub fn bind_with_config(addr: &str, master: Master, config: TcpConfig) -> Result<Self> {
        let endpoint = TcpEndpoint::bind_with_config(addr, config)?;
        Ok(Self { endpoint, master })
    }

    /// Make [`accept_next`](Self::accept_next) return immediately when no
    /// slave is waiting.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        Ok(self.endpoint.set_nonblocking(nonblocking)?)
    }

    /// Accept the next connection and register its slave.
    ///
    /// Returns `Ok(false)` when the slave was rejected.
    pub fn accept_next(&mut self) -> Result<bool> {
        let channel = self.endpoint.accept()?;
        self.master.accept(channel)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut Master {
        &mut self.master
    }

    pub fn into_master(self) -> Master {
        self.master
    }
}
