//! Versioned wire codec for durable session state.
//!
//! The codec is pure and deterministic: no I/O, no dependence on the live
//! registry. A record is a self-describing byte sequence whose first field
//! is the format version, read before anything else so old decoders stay
//! deterministic when newer builds add fields behind a version bump.
//!
//! Version 1 layout (big-endian, UTF-8 strings, u32 length prefixes):
//!
//! ```text
//! u32  format version
//! u32  client-id length | client-id bytes
//! u32  subscription count
//! per subscription:
//!   u32 filter length | filter bytes
//!   u8  qos (0..=2)
//!   u8  no_local (0|1)
//!   u8  retain_as_published (0|1)
//!   u8  retain_handling ordinal (0..=2)
//!   u8  identifier presence (0|1)
//!   u32 subscription identifier (only when present)
//! ```
//!
//! Decoding either fully reconstructs a `SessionState` or fails; a truncated
//! or malformed record never yields a partial session.

use super::{
    Qos, RetainHandling, SessionState, SubscriptionOptions, MAX_MQTT_STRING_LEN,
    SUBSCRIPTION_ID_MAX, SUBSCRIPTION_ID_MIN,
};
use crate::error::SessionStateError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// First (and so far only) durable format version.
pub const STATE_VERSION_1: u32 = 1;

/// Version written by this build.
pub const CURRENT_STATE_VERSION: u32 = STATE_VERSION_1;

// Fixed-width portion of one subscription entry: length prefix + five flag
// bytes. Used only to pre-size the encode buffer.
const SUBSCRIPTION_FIXED_LEN: usize = 4 + 5;

/// Encode a session snapshot into the version-1 durable record layout.
///
/// Subscription order follows map iteration order and carries no meaning;
/// round-trip equivalence is defined over the subscription set.
pub fn encode_session(state: &SessionState) -> Bytes {
    let mut buf = BytesMut::with_capacity(estimated_len(state));
    buf.put_u32(CURRENT_STATE_VERSION);
    put_string(&mut buf, state.client_id());
    buf.put_u32(state.subscription_count() as u32);
    for sub in state.iter() {
        put_string(&mut buf, &sub.topic_filter);
        buf.put_u8(sub.options.qos.value());
        buf.put_u8(u8::from(sub.options.no_local));
        buf.put_u8(u8::from(sub.options.retain_as_published));
        buf.put_u8(sub.options.retain_handling.value());
        match sub.subscription_identifier {
            Some(id) => {
                buf.put_u8(1);
                buf.put_u32(id);
            }
            None => buf.put_u8(0),
        }
    }
    buf.freeze()
}

/// Read the format version without decoding the rest of the record.
pub fn peek_version(bytes: &[u8]) -> Result<u32, SessionStateError> {
    let mut buf = bytes;
    read_u32(&mut buf, "format version")
}

/// Decode a durable record back into a `SessionState`.
///
/// The version tag dispatches to the matching layout; an unknown version
/// fails with `UnsupportedStateVersion` rather than guessing. Every
/// structural defect (truncation, oversized length, invalid ordinal, bad
/// flag byte, invalid UTF-8, out-of-range identifier, trailing bytes) fails
/// with `CorruptState`.
pub fn decode_session(bytes: &[u8]) -> Result<SessionState, SessionStateError> {
    let mut buf = bytes;
    let version = read_u32(&mut buf, "format version")?;
    match version {
        STATE_VERSION_1 => decode_v1(buf),
        other => Err(SessionStateError::UnsupportedStateVersion {
            found: other,
            supported: CURRENT_STATE_VERSION,
        }),
    }
}

fn decode_v1(mut buf: &[u8]) -> Result<SessionState, SessionStateError> {
    let client_id = read_string(&mut buf, "client id")?;
    if client_id.is_empty() {
        return Err(SessionStateError::corrupt("empty client id"));
    }
    let count = read_u32(&mut buf, "subscription count")?;

    let mut state = SessionState::new(client_id);
    for entry in 0..count {
        let filter = read_string(&mut buf, "topic filter")?;
        let qos = read_u8(&mut buf, "qos")?;
        let qos = Qos::from_value(qos).ok_or_else(|| {
            SessionStateError::corrupt(format!("invalid qos ordinal {} in entry {}", qos, entry))
        })?;
        let no_local = read_flag(&mut buf, "no_local")?;
        let retain_as_published = read_flag(&mut buf, "retain_as_published")?;
        let retain_handling = read_u8(&mut buf, "retain_handling")?;
        let retain_handling = RetainHandling::from_value(retain_handling).ok_or_else(|| {
            SessionStateError::corrupt(format!(
                "invalid retain_handling ordinal {} in entry {}",
                retain_handling, entry
            ))
        })?;
        let subscription_identifier = if read_flag(&mut buf, "identifier presence")? {
            let id = read_u32(&mut buf, "subscription identifier")?;
            if !(SUBSCRIPTION_ID_MIN..=SUBSCRIPTION_ID_MAX).contains(&id) {
                return Err(SessionStateError::corrupt(format!(
                    "subscription identifier {} out of range in entry {}",
                    id, entry
                )));
            }
            Some(id)
        } else {
            None
        };

        let options = SubscriptionOptions {
            qos,
            no_local,
            retain_as_published,
            retain_handling,
        };
        state
            .add_subscription(filter, options, subscription_identifier)
            .map_err(|err| SessionStateError::corrupt(format!("entry {}: {}", entry, err)))?;
    }

    if buf.has_remaining() {
        return Err(SessionStateError::corrupt(format!(
            "{} trailing bytes after last subscription entry",
            buf.remaining()
        )));
    }
    Ok(state)
}

fn estimated_len(state: &SessionState) -> usize {
    let subs: usize = state
        .iter()
        .map(|sub| SUBSCRIPTION_FIXED_LEN + sub.topic_filter.len() + 4)
        .sum();
    4 + 4 + state.client_id().len() + 4 + subs
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn read_u8(buf: &mut &[u8], field: &str) -> Result<u8, SessionStateError> {
    if buf.remaining() < 1 {
        return Err(truncated(field));
    }
    Ok(buf.get_u8())
}

fn read_u32(buf: &mut &[u8], field: &str) -> Result<u32, SessionStateError> {
    if buf.remaining() < 4 {
        return Err(truncated(field));
    }
    Ok(buf.get_u32())
}

fn read_flag(buf: &mut &[u8], field: &str) -> Result<bool, SessionStateError> {
    match read_u8(buf, field)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SessionStateError::corrupt(format!(
            "invalid flag byte {} for {}",
            other, field
        ))),
    }
}

fn read_string(buf: &mut &[u8], field: &str) -> Result<String, SessionStateError> {
    let len = read_u32(buf, field)? as usize;
    if len > MAX_MQTT_STRING_LEN {
        return Err(SessionStateError::corrupt(format!(
            "{} length {} exceeds {} bytes",
            field, len, MAX_MQTT_STRING_LEN
        )));
    }
    if buf.remaining() < len {
        return Err(truncated(field));
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw)
        .map_err(|_| SessionStateError::corrupt(format!("{} is not valid UTF-8", field)))
}

fn truncated(field: &str) -> SessionStateError {
    SessionStateError::corrupt(format!("record truncated while reading {}", field))
}
