/// A blocking byte transport between two Hermes peers.
///
/// The contract is count-based: operations return how many bytes they moved
/// and never fail loudly. A caller that needs an exact transfer compares the
/// returned count with what it asked for and, on a mismatch, treats the
/// channel as degraded and checks [`good`](Channel::good).
///
/// Implementations may guard their own buffers internally, but they do not
/// serialize request/response exchanges; at most one exchange may be in flight
/// per channel.
pub trait Channel: Send {
    /// Returns `true` while further I/O may succeed.
    fn good(&self) -> bool;

    /// Bytes that can be read right now without blocking.
    fn available(&self) -> usize;

    /// Block the calling thread until at least `len` bytes are available or
    /// the channel stops being good. Returns the bytes available afterwards.
    fn wait(&mut self, len: usize) -> usize;

    /// Read up to `buf.len()` bytes, blocking through [`wait`](Channel::wait)
    /// until that many are available or the channel degrades.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Drop whatever is currently readable without blocking.
    fn flush(&mut self);

    /// Close the channel. Returns `false` if closing failed.
    fn close(&mut self) -> bool;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn good(&self) -> bool {
        (**self).good()
    }

    fn available(&self) -> usize {
        (**self).available()
    }

    fn wait(&mut self, len: usize) -> usize {
        (**self).wait(len)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        (**self).write(buf)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn close(&mut self) -> bool {
        (**self).close()
    }
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn good(&self) -> bool {
        (**self).good()
    }

    fn available(&self) -> usize {
        (**self).available()
    }

    fn wait(&mut self, len: usize) -> usize {
        (**self).wait(len)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        (**self).write(buf)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn close(&mut self) -> bool {
        (**self).close()
    }
}
