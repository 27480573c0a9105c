use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::Channel;

/// Receive timeout applied to accepted and connected streams by default.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Socket options applied when a [`TcpChannel`] is created.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Receive timeout. Expiry degrades the channel. Default: 30 s.
    pub read_timeout: Option<Duration>,
    /// Send timeout. Default: none.
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm; records are small and latency-bound.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            write_timeout: None,
            nodelay: true,
        }
    }
}

/// A [`Channel`] over a blocking TCP stream.
///
/// Bytes pulled off the socket are kept in an internal buffer so `wait` can
/// accumulate a full record before `read` hands it out. EOF, a receive
/// timeout or any socket error marks the channel not-good.
pub struct TcpChannel {
    stream: TcpStream,
    buf: BytesMut,
    good: AtomicBool,
    peer: Option<SocketAddr>,
}

impl TcpChannel {
    /// Wrap a connected stream using [`TcpConfig::default`].
    pub fn new(stream: TcpStream) -> Self {
        Self::with_config(stream, &TcpConfig::default())
    }

    /// Wrap a connected stream and apply `config`.
    ///
    /// A stream whose options cannot be applied is returned already degraded.
    pub fn with_config(stream: TcpStream, config: &TcpConfig) -> Self {
        let peer = stream.peer_addr().ok();
        let configured = stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_read_timeout(config.read_timeout))
            .and_then(|()| stream.set_write_timeout(config.write_timeout))
            .and_then(|()| stream.set_nodelay(config.nodelay));
        let good = match configured {
            Ok(()) => true,
            Err(err) => {
                warn!(?peer, error = %err, "failed to configure tcp stream");
                false
            }
        };

        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            good: AtomicBool::new(good),
            peer,
        }
    }

    /// Address of the remote end, if known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn degrade(&self) {
        self.good.store(false, Ordering::Release);
    }

    /// Bytes the kernel has received but we have not read yet.
    #[cfg(unix)]
    fn pending(&self) -> usize {
        use std::os::fd::AsRawFd;

        let mut count: libc::c_int = 0;
        // SAFETY: `count` is a valid writable c_int, which is what FIONREAD
        // expects, and the descriptor is an open socket owned by `self.stream`.
        let rc = unsafe { libc::ioctl(self.stream.as_raw_fd(), libc::FIONREAD, &mut count) };
        if rc < 0 {
            warn!(
                peer = ?self.peer,
                error = %std::io::Error::last_os_error(),
                "FIONREAD failed"
            );
            self.degrade();
            return 0;
        }
        usize::try_from(count).unwrap_or(0)
    }

    #[cfg(not(unix))]
    fn pending(&self) -> usize {
        0
    }
}

impl Channel for TcpChannel {
    fn good(&self) -> bool {
        self.good.load(Ordering::Acquire)
    }

    fn available(&self) -> usize {
        if !self.good() {
            return self.buf.len();
        }
        self.buf.len() + self.pending()
    }

    fn wait(&mut self, len: usize) -> usize {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while self.buf.len() < len && self.good() {
            let want = (len - self.buf.len())
                .max(self.pending())
                .min(READ_CHUNK_SIZE);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => {
                    debug!(peer = ?self.peer, "tcp peer closed the stream");
                    self.degrade();
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(peer = ?self.peer, error = %err, "tcp read failed");
                    self.degrade();
                }
            }
        }
        self.buf.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.buf.len() < buf.len() {
            self.wait(buf.len());
        }
        let count = buf.len().min(self.buf.len());
        buf[..count].copy_from_slice(&self.buf[..count]);
        self.buf.advance(count);
        count
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if !self.good() {
            return 0;
        }
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.stream.write(&buf[offset..]) {
                Ok(0) => {
                    self.degrade();
                    break;
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(peer = ?self.peer, error = %err, "tcp write failed");
                    self.degrade();
                    break;
                }
            }
        }
        offset
    }

    fn flush(&mut self) {
        self.buf.clear();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut pending = self.pending();
        while pending > 0 && self.good() {
            let want = pending.min(READ_CHUNK_SIZE);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => self.degrade(),
                Ok(n) => pending = pending.saturating_sub(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => self.degrade(),
            }
        }
    }

    fn close(&mut self) -> bool {
        self.degrade();
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotConnected => true,
            Err(err) => {
                debug!(peer = ?self.peer, error = %err, "tcp shutdown failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpChannel")
            .field("peer", &self.peer)
            .field("buffered", &self.buf.len())
            .field("good", &self.good())
            .finish()
    }
}

/// A listening TCP socket that hands out [`TcpChannel`]s.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: TcpConfig,
}

impl TcpEndpoint {
    /// Bind and listen on `addr` (e.g. `0.0.0.0:1311`).
    pub fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, TcpConfig::default())
    }

    /// Bind and listen, applying `config` to every accepted channel.
    pub fn bind_with_config(addr: &str, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Switch `accept` between blocking and nonblocking mode.
    ///
    /// In nonblocking mode an idle listener fails with
    /// [`TransportError::Accept`] of kind [`std::io::ErrorKind::WouldBlock`].
    /// Accepted channels are always blocking.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(TransportError::Io)
    }

    /// Accept an incoming connection.
    pub fn accept(&self) -> Result<TcpChannel> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted tcp connection");
        Ok(TcpChannel::with_config(stream, &self.config))
    }

    /// Connect to a listening endpoint (blocking).
    pub fn connect(addr: &str) -> Result<TcpChannel> {
        Self::connect_with_config(addr, &TcpConfig::default())
    }

    /// Connect to a listening endpoint and apply `config`.
    pub fn connect_with_config(addr: &str, config: &TcpConfig) -> Result<TcpChannel> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr, "connected over tcp");
        let channel = TcpChannel::with_config(stream, config);
        if !channel.good() {
            return Err(TransportError::Io(std::io::Error::other(
                "failed to configure connected stream",
            )));
        }
        Ok(channel)
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn loopback() -> TcpEndpoint {
        TcpEndpoint::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn test_bind_accept_connect() {
        let endpoint = loopback();
        let addr = endpoint.local_addr().to_string();

        let client = thread::spawn(move || {
            let mut channel = TcpEndpoint::connect(&addr).unwrap();
            assert_eq!(channel.write(b"hello"), 5);
            channel
        });

        let mut server = endpoint.accept().unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(server.read(&mut buf), 5);
        assert_eq!(&buf, b"hello");
        assert!(server.good());

        client.join().unwrap();
    }

    #[test]
    fn test_wait_accumulates_split_writes() {
        let endpoint = loopback();
        let addr = endpoint.local_addr().to_string();

        let client = thread::spawn(move || {
            let mut channel = TcpEndpoint::connect(&addr).unwrap();
            channel.write(b"abc");
            thread::sleep(Duration::from_millis(20));
            channel.write(b"def");
            channel
        });

        let mut server = endpoint.accept().unwrap();
        assert!(server.wait(6) >= 6);
        assert!(server.available() >= 6);
        let mut buf = [0u8; 6];
        assert_eq!(server.read(&mut buf), 6);
        assert_eq!(&buf, b"abcdef");

        client.join().unwrap();
    }

    #[test]
    fn test_peer_close_degrades_and_short_reads() {
        let endpoint = loopback();
        let addr = endpoint.local_addr().to_string();

        let client = thread::spawn(move || {
            let mut channel = TcpEndpoint::connect(&addr).unwrap();
            channel.write(b"xy");
            assert!(channel.close());
            assert!(!channel.good());
        });

        let mut server = endpoint.accept().unwrap();
        client.join().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf), 2);
        assert!(!server.good());
        assert_eq!(server.write(b"late"), 0);
    }

    #[test]
    fn test_read_timeout_degrades() {
        let config = TcpConfig {
            read_timeout: Some(Duration::from_millis(30)),
            ..TcpConfig::default()
        };
        let endpoint = TcpEndpoint::bind_with_config("127.0.0.1:0", config).unwrap();
        let addr = endpoint.local_addr().to_string();

        let client = thread::spawn(move || {
            let channel = TcpEndpoint::connect(&addr).unwrap();
            thread::sleep(Duration::from_millis(200));
            drop(channel);
        });

        let mut server = endpoint.accept().unwrap();
        assert_eq!(server.wait(4), 0);
        assert!(!server.good());

        client.join().unwrap();
    }

    #[test]
    fn test_flush_discards_pending_bytes() {
        let endpoint = loopback();
        let addr = endpoint.local_addr().to_string();

        let client = thread::spawn(move || {
            let mut channel = TcpEndpoint::connect(&addr).unwrap();
            channel.write(b"stale-bytes");
            channel
        });

        let mut server = endpoint.accept().unwrap();
        let _client = client.join().unwrap();
        server.wait(11);

        server.flush();
        assert_eq!(server.available(), 0);
        assert!(server.good());
    }

    #[test]
    fn test_connect_refused() {
        let endpoint = loopback();
        let addr = endpoint.local_addr().to_string();
        drop(endpoint);

        let result = TcpEndpoint::connect(&addr);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_nonblocking_accept_without_client_would_block() {
        let endpoint = loopback();
        endpoint.set_nonblocking(true).unwrap();

        match endpoint.accept() {
            Err(TransportError::Accept(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock)
            }
            other => panic!("expected WouldBlock, got {other:?}"),
        }
    }

    #[test]
    fn test_nonblocking_accept_yields_blocking_channel() {
        let endpoint = loopback();
        endpoint.set_nonblocking(true).unwrap();
        let addr = endpoint.local_addr().to_string();

        let mut client = TcpEndpoint::connect(&addr).unwrap();
        let mut server = loop {
            match endpoint.accept() {
                Ok(channel) => break channel,
                Err(TransportError::Accept(err))
                    if err.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(err) => panic!("accept failed: {err}"),
            }
        };

        let writer = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            client.write(b"late");
            client
        });
        let mut buf = [0u8; 4];
        assert_eq!(server.read(&mut buf), 4);
        assert_eq!(&buf, b"late");
        let _client = writer.join().unwrap();
    }

    #[test]
    fn test_bind_rejects_bad_address() {
        let result = TcpEndpoint::bind("not-an-address");
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}
