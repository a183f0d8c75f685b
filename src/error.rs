//! Error taxonomy for the session persistence core.
//!
//! Decode failures are deliberately split in two: a record written by a newer
//! build fails with `UnsupportedStateVersion`, structurally invalid bytes
//! fail with `CorruptState`. Restore policy treats both as "unreadable" but
//! callers (and operators reading logs) need to tell them apart.

use std::borrow::Cow;

/// Uniform error contract for session model, codec, registry, and manager.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionStateError {
    /// Malformed input to a subscription mutation; session state unchanged.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(Cow<'static, str>),

    /// Empty or otherwise unusable client identifier.
    #[error("invalid client identifier: {0}")]
    InvalidClientId(Cow<'static, str>),

    /// The durable record carries a format version this build cannot decode.
    #[error("unsupported session state version {found} (newest supported is {supported})")]
    UnsupportedStateVersion { found: u32, supported: u32 },

    /// The durable record bytes are structurally invalid. Decoding never
    /// partially succeeds, so the record must not be treated as present.
    #[error("corrupt session state: {0}")]
    CorruptState(Cow<'static, str>),

    /// The storage collaborator failed; retry/backoff policy lives with the
    /// connection-lifecycle caller, not here.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl SessionStateError {
    pub fn invalid_subscription(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidSubscription(msg.into())
    }

    pub fn invalid_client_id(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidClientId(msg.into())
    }

    pub fn corrupt(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptState(msg.into())
    }

    pub(crate) fn persistence(err: anyhow::Error) -> Self {
        Self::PersistenceUnavailable(format!("{err:#}"))
    }

    /// True for the decode failures that make a durable record unreadable.
    ///
    /// Restore policy keys off this: such a record is either surfaced to the
    /// caller or (under `start_fresh`) logged and treated as absent, never
    /// silently substituted with an empty session.
    pub fn is_unreadable_record(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedStateVersion { .. } | Self::CorruptState(_)
        )
    }
}
