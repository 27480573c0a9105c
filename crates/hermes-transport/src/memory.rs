use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::traits::Channel;

/// Default number of bytes each direction of a [`MemoryChannel`] can queue.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// One endpoint of an in-process channel pair.
///
/// Both endpoints share two byte queues, one per direction, guarded by a
/// single mutex. Blocked readers sleep on a condition variable until a writer
/// or [`close`](Channel::close) wakes them. Cloning an endpoint yields another
/// handle on the same endpoint, not a new connection. Dropping the last handle
/// of an endpoint closes the pair.
pub struct MemoryChannel {
    shared: Arc<Shared>,
    side: usize,
}

struct Shared {
    state: Mutex<State>,
    ready: Condvar,
    capacity: usize,
    /// Live handles per side.
    handles: [AtomicUsize; 2],
}

struct State {
    /// `queues[n]` holds the bytes readable by side `n`.
    queues: [VecDeque<u8>; 2],
    closed: bool,
}

impl MemoryChannel {
    /// Create a connected pair with [`DEFAULT_CAPACITY`] per direction.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a connected pair with an explicit per-direction capacity.
    ///
    /// Writes that would exceed the capacity are truncated, which the writer
    /// observes as a short write.
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queues: [VecDeque::new(), VecDeque::new()],
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
            handles: [AtomicUsize::new(1), AtomicUsize::new(1)],
        });
        (
            Self {
                shared: Arc::clone(&shared),
                side: 0,
            },
            Self { shared, side: 1 },
        )
    }

    /// Per-direction capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn peer_side(&self) -> usize {
        1 - self.side
    }

    fn wait_locked<'a>(&'a self, mut state: MutexGuard<'a, State>, len: usize) -> MutexGuard<'a, State> {
        while state.queues[self.side].len() < len && !state.closed {
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }
}

impl Channel for MemoryChannel {
    fn good(&self) -> bool {
        !self.lock().closed
    }

    fn available(&self) -> usize {
        self.lock().queues[self.side].len()
    }

    fn wait(&mut self, len: usize) -> usize {
        let state = self.lock();
        let state = self.wait_locked(state, len);
        state.queues[self.side].len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let state = self.lock();
        let mut state = self.wait_locked(state, buf.len());
        let queue = &mut state.queues[self.side];
        let count = buf.len().min(queue.len());
        for (dst, src) in buf.iter_mut().zip(queue.drain(..count)) {
            *dst = src;
        }
        trace!(side = self.side, count, "memory channel read");
        count
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let peer = self.peer_side();
        let mut state = self.lock();
        if state.closed {
            return 0;
        }
        let queue = &mut state.queues[peer];
        let room = self.shared.capacity.saturating_sub(queue.len());
        let count = buf.len().min(room);
        queue.extend(&buf[..count]);
        if count < buf.len() {
            debug!(
                side = self.side,
                requested = buf.len(),
                written = count,
                "memory channel full, write truncated"
            );
        }
        drop(state);
        self.shared.ready.notify_all();
        count
    }

    fn flush(&mut self) {
        self.lock().queues[self.side].clear();
    }

    fn close(&mut self) -> bool {
        self.lock().closed = true;
        self.shared.ready.notify_all();
        true
    }
}

impl Clone for MemoryChannel {
    fn clone(&self) -> Self {
        self.shared.handles[self.side].fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
            side: self.side,
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if self.shared.handles[self.side].fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!(side = self.side, "last handle dropped, closing memory channel");
            self.close();
        }
    }
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("side", &self.side)
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_pair_roundtrip_both_directions() {
        let (mut left, mut right) = MemoryChannel::pair();

        assert_eq!(left.write(b"ping"), 4);
        let mut buf = [0u8; 4];
        assert_eq!(right.read(&mut buf), 4);
        assert_eq!(&buf, b"ping");

        assert_eq!(right.write(b"pong"), 4);
        assert_eq!(left.read(&mut buf), 4);
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_available_counts_only_inbound_bytes() {
        let (mut left, right) = MemoryChannel::pair();
        left.write(b"abc");

        assert_eq!(left.available(), 0);
        assert_eq!(right.available(), 3);
    }

    #[test]
    fn test_wait_blocks_until_enough_bytes() {
        let (mut left, mut right) = MemoryChannel::pair();

        let writer = thread::spawn(move || {
            left.write(b"12");
            thread::sleep(Duration::from_millis(20));
            left.write(b"345");
            left
        });

        assert_eq!(right.wait(5), 5);
        let mut buf = [0u8; 5];
        assert_eq!(right.read(&mut buf), 5);
        assert_eq!(&buf, b"12345");
        writer.join().unwrap();
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (mut left, mut right) = MemoryChannel::pair();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let read = right.read(&mut buf);
            (read, right.good())
        });

        thread::sleep(Duration::from_millis(20));
        left.write(b"xy");
        assert!(left.close());

        let (read, good) = reader.join().unwrap();
        assert_eq!(read, 2);
        assert!(!good);
    }

    #[test]
    fn test_write_after_close_is_rejected() {
        let (mut left, mut right) = MemoryChannel::pair();
        right.close();

        assert!(!left.good());
        assert_eq!(left.write(b"late"), 0);
    }

    #[test]
    fn test_queued_bytes_survive_close() {
        let (mut left, mut right) = MemoryChannel::pair();
        left.write(b"bye");
        left.close();

        let mut buf = [0u8; 3];
        assert_eq!(right.read(&mut buf), 3);
        assert_eq!(&buf, b"bye");
    }

    #[test]
    fn test_capacity_truncates_writes() {
        let (mut left, right) = MemoryChannel::pair_with_capacity(4);

        assert_eq!(left.write(b"abcdef"), 4);
        assert_eq!(left.write(b"g"), 0);
        assert_eq!(right.available(), 4);
        assert_eq!(right.capacity(), 4);
    }

    #[test]
    fn test_flush_discards_readable_bytes() {
        let (mut left, mut right) = MemoryChannel::pair();
        left.write(b"stale");

        right.flush();
        assert_eq!(right.available(), 0);
        assert!(right.good());
    }

    #[test]
    fn test_drop_wakes_blocked_reader() {
        let (left, mut right) = MemoryChannel::pair();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let read = right.read(&mut buf);
            (read, right.good())
        });

        thread::sleep(Duration::from_millis(20));
        drop(left);

        let (read, good) = reader.join().unwrap();
        assert_eq!(read, 0);
        assert!(!good);
    }

    #[test]
    fn test_dropping_a_clone_keeps_the_pair_open() {
        let (left, mut right) = MemoryChannel::pair();
        let extra = left.clone();
        drop(extra);

        assert!(left.good());
        assert_eq!(right.write(b"ok"), 2);
        assert_eq!(left.available(), 2);
        drop(left);
        assert!(!right.good());
    }

    #[test]
    fn test_clone_is_a_handle_on_the_same_endpoint() {
        let (mut left, right) = MemoryChannel::pair();
        let mut right_clone = right.clone();

        left.write(b"shared");
        assert_eq!(right.available(), 6);

        let mut buf = [0u8; 6];
        assert_eq!(right_clone.read(&mut buf), 6);
        assert_eq!(right.available(), 0);
    }
}
