use bytes::BytesMut;
use hermes_transport::Channel;
use tracing::{debug, trace};

use crate::codec::{decode_message, Direction, WireConfig};
use crate::error::{Result, WireError};
use crate::message::WireMessage;

/// Read exactly one record from `channel` and decode it.
///
/// The read blocks until a whole record is available or the channel degrades.
/// Anything short of a whole record is [`WireError::ShortRead`], after which
/// the channel must be treated as unusable. A record that was read in full
/// but does not decode yields a non-fatal error.
///
/// `scratch` is caller-owned so repeated reads reuse one allocation.
pub fn read_message<C: Channel + ?Sized>(
    channel: &mut C,
    scratch: &mut BytesMut,
    config: &WireConfig,
    direction: Direction,
) -> Result<WireMessage> {
    config.validate()?;
    let size = config.record_size();

    scratch.clear();
    scratch.resize(size, 0);
    let read = channel.read(&mut scratch[..]);
    if read != size {
        scratch.clear();
        debug!(expected = size, actual = read, good = channel.good(), "short record read");
        return Err(WireError::ShortRead {
            expected: size,
            actual: read,
        });
    }

    let msg = decode_message(scratch, config, direction)?.ok_or(WireError::IncompleteRecord {
        expected: size,
        actual: read,
    })?;
    trace!(serial = %msg.serial, kind = %msg.kind(), "record read");
    Ok(msg)
}
