use bytes::BytesMut;
use hermes_transport::Channel;
use tracing::{debug, trace};

use crate::codec::{encode_message, WireConfig};
use crate::error::{Result, WireError};
use crate::message::WireMessage;

/// Encode `msg` and write it to `channel` as one whole record.
///
/// A channel that accepts fewer bytes than the record size is reported as
/// [`WireError::ShortWrite`] and must be treated as unusable.
pub fn write_message<C: Channel + ?Sized>(
    channel: &mut C,
    scratch: &mut BytesMut,
    msg: &WireMessage,
    config: &WireConfig,
) -> Result<()> {
    scratch.clear();
    encode_message(msg, config, scratch)?;

    let expected = scratch.len();
    let written = channel.write(&scratch[..]);
    scratch.clear();
    if written != expected {
        debug!(expected, actual = written, good = channel.good(), "short record write");
        return Err(WireError::ShortWrite {
            expected,
            actual: written,
        });
    }

    trace!(serial = %msg.serial, kind = %msg.kind(), "record written");
    Ok(())
}
