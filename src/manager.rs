//! Persistence orchestration between live sessions and durable storage.
//!
//! The manager decides how a session's durable record is written, looked up,
//! and superseded. Persistence is driven by subscription mutation and by
//! graceful disconnect, never by a timer: subscription changes are rare
//! relative to publish traffic and every write fully supersedes the prior
//! record for the same key.

use crate::config::{SessionStoreConfig, UnreadableRecordPolicy};
use crate::error::SessionStateError;
use crate::session::codec;
use crate::session::registry::{AttachOutcome, ConnectionId, SessionRegistry, SharedSession};
use crate::session::SessionState;
use crate::store::StateStore;
use std::fmt;

/// Stable durable-record address for one client's session.
///
/// Derived from the client identifier so a newer write supersedes the older
/// one (upsert, not append); at most one live record exists per client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt for a successfully written durable record.
#[derive(Debug, Clone)]
pub struct DurableRecordHandle {
    pub key: RecordKey,
    pub version: u32,
    pub encoded_len: usize,
}

/// Bridge between in-memory session state and the storage collaborator.
pub struct StateManager<S: StateStore> {
    store: S,
    config: SessionStoreConfig,
}

impl<S: StateStore> StateManager<S> {
    pub fn new(store: S, config: SessionStoreConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Durable-record key for `client_id` under the configured prefix.
    pub fn record_key(&self, client_id: &str) -> RecordKey {
        RecordKey(format!("{}{}", self.config.record_key_prefix, client_id))
    }

    /// Encode a session snapshot and upsert it under `key`.
    ///
    /// Safe to call repeatedly; concurrent writes for the same key are
    /// serialized by the storage collaborator's per-key ordering.
    pub async fn persist(
        &self,
        state: &SessionState,
        key: &RecordKey,
    ) -> Result<DurableRecordHandle, SessionStateError> {
        let payload = codec::encode_session(state);
        let encoded_len = payload.len();
        self.store
            .write(key.as_str(), payload)
            .await
            .map_err(SessionStateError::persistence)?;
        tracing::debug!(
            "persisted session client_id={} key={} bytes={}",
            state.client_id(),
            key,
            encoded_len
        );
        Ok(DurableRecordHandle {
            key: key.clone(),
            version: codec::CURRENT_STATE_VERSION,
            encoded_len,
        })
    }

    /// Snapshot a live session under its lock, then persist the snapshot.
    ///
    /// The lock is released before the storage write; a concurrent mutation
    /// lands in the next persist, not in a torn record.
    pub async fn persist_session(
        &self,
        session: &SharedSession,
        key: &RecordKey,
    ) -> Result<DurableRecordHandle, SessionStateError> {
        let snapshot = session.lock().clone();
        self.persist(&snapshot, key).await
    }

    /// Fetch and decode the durable record for `key`, if one exists.
    ///
    /// Codec failures propagate unless the configured policy downgrades an
    /// unreadable record to "absent"; either way the specific error kind is
    /// surfaced in the log, never masked as "no prior session".
    pub async fn restore(&self, key: &RecordKey) -> Result<Option<SessionState>, SessionStateError> {
        let Some(bytes) = self
            .store
            .read(key.as_str())
            .await
            .map_err(SessionStateError::persistence)?
        else {
            return Ok(None);
        };
        match codec::decode_session(&bytes) {
            Ok(state) => {
                tracing::debug!(
                    "restored session client_id={} key={} subscriptions={}",
                    state.client_id(),
                    key,
                    state.subscription_count()
                );
                Ok(Some(state))
            }
            Err(err) if err.is_unreadable_record() => {
                match self.config.unreadable_record_policy {
                    UnreadableRecordPolicy::Fail => {
                        tracing::warn!("session record unreadable key={} error={}", key, err);
                        Err(err)
                    }
                    UnreadableRecordPolicy::StartFresh => {
                        tracing::warn!(
                            "discarding unreadable session record key={} error={}",
                            key,
                            err
                        );
                        Ok(None)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Remove the durable record for `key` (clean start or session expiry).
    pub async fn delete(&self, key: &RecordKey) -> Result<(), SessionStateError> {
        self.store
            .delete(key.as_str())
            .await
            .map_err(SessionStateError::persistence)?;
        tracing::debug!("deleted session record key={}", key);
        Ok(())
    }

    /// Connect-time entry point: restore (or discard, on clean start) the
    /// durable record for `client_id` and attach `connection` in the
    /// registry.
    pub async fn resume(
        &self,
        registry: &SessionRegistry,
        client_id: &str,
        connection: ConnectionId,
        clean_start: bool,
    ) -> Result<AttachOutcome, SessionStateError> {
        if client_id.is_empty() {
            return Err(SessionStateError::invalid_client_id(
                "empty client identifier",
            ));
        }
        let key = self.record_key(client_id);
        let restored = if clean_start {
            // The stale record must not survive a clean start; per-key
            // ordering makes this delete win over any in-flight persist
            // issued before it.
            self.delete(&key).await?;
            None
        } else {
            self.restore(&key).await?
        };
        registry.attach(client_id, connection, clean_start, restored)
    }
}
