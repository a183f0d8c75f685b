//! Process-wide table of live sessions keyed by client identifier.
//!
//! The registry enforces at-most-one active owner per client id. A new
//! connection claiming an id that is already ACTIVE displaces the previous
//! connection (session takeover); the displaced connection id is handed back
//! so the connection-lifecycle collaborator can disconnect it with the
//! protocol-level takeover reason. Per client id the entry moves through
//! ABSENT -> ACTIVE -> DETACHED -> ABSENT; expiry timers that drive the
//! final transition live outside this core.

use super::SessionState;
use crate::error::SessionStateError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque identifier of a live connection, assigned by the transport layer.
pub type ConnectionId = u64;

/// A live session shared between the registry, the protocol handler, and the
/// state manager. The mutex guards mutation against concurrent snapshot
/// reads; it is only ever held for in-memory work, never across storage
/// awaits.
pub type SharedSession = Arc<Mutex<SessionState>>;

/// Whether a registered session currently has a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Active(ConnectionId),
    Detached,
}

struct RegistryEntry {
    session: SharedSession,
    attachment: AttachmentState,
}

/// Result of attaching a connection to a client identifier.
#[derive(Debug)]
pub struct AttachOutcome {
    pub session: SharedSession,
    /// Connection displaced by takeover; the lifecycle collaborator must
    /// disconnect it.
    pub displaced: Option<ConnectionId>,
    /// True when prior session state was resumed rather than created fresh
    /// (the CONNACK session-present flag).
    pub session_present: bool,
}

/// Authoritative map from client identifier to live session state.
///
/// The map lock is held only for install/detach/remove; session mutation
/// happens under the per-session lock, so unrelated sessions never serialize
/// behind each other.
#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `connection` to the session for `client_id`.
    ///
    /// A live in-memory entry wins over the `restored` argument: if the id is
    /// already registered its existing state is reused (or, on clean start,
    /// destroyed and recreated). `restored` is installed only when the id is
    /// absent from the registry, i.e. on resume after restart or failover.
    pub fn attach(
        &self,
        client_id: &str,
        connection: ConnectionId,
        clean_start: bool,
        restored: Option<SessionState>,
    ) -> Result<AttachOutcome, SessionStateError> {
        if client_id.is_empty() {
            return Err(SessionStateError::invalid_client_id(
                "empty client identifier",
            ));
        }

        let mut entries = self.entries.lock();
        let (entry, displaced, session_present) = match entries.remove(client_id) {
            Some(existing) => {
                let displaced = match existing.attachment {
                    AttachmentState::Active(prev) => Some(prev),
                    AttachmentState::Detached => None,
                };
                if clean_start {
                    let entry = RegistryEntry {
                        session: Arc::new(Mutex::new(SessionState::new(client_id))),
                        attachment: AttachmentState::Active(connection),
                    };
                    (entry, displaced, false)
                } else {
                    let entry = RegistryEntry {
                        session: existing.session,
                        attachment: AttachmentState::Active(connection),
                    };
                    (entry, displaced, true)
                }
            }
            None => {
                let (session, session_present) = match restored {
                    Some(state) if !clean_start => (state, true),
                    _ => (SessionState::new(client_id), false),
                };
                let entry = RegistryEntry {
                    session: Arc::new(Mutex::new(session)),
                    attachment: AttachmentState::Active(connection),
                };
                (entry, None, session_present)
            }
        };

        if let Some(prev) = displaced {
            tracing::info!(
                "session takeover client_id={} displaced_connection={} new_connection={}",
                client_id,
                prev,
                connection
            );
        } else {
            tracing::debug!(
                "session attach client_id={} connection={} session_present={}",
                client_id,
                connection,
                session_present
            );
        }

        let session = Arc::clone(&entry.session);
        entries.insert(client_id.to_string(), entry);
        Ok(AttachOutcome {
            session,
            displaced,
            session_present,
        })
    }

    /// Move `client_id` to DETACHED, keeping its state for a later resume.
    ///
    /// Only the connection that owns the entry may detach it; a stale detach
    /// arriving after a takeover is a no-op so the new owner is never
    /// knocked off. Returns whether the detach took effect.
    pub fn detach(&self, client_id: &str, connection: ConnectionId) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(client_id) {
            Some(entry) if entry.attachment == AttachmentState::Active(connection) => {
                entry.attachment = AttachmentState::Detached;
                tracing::debug!(
                    "session detach client_id={} connection={}",
                    client_id,
                    connection
                );
                true
            }
            _ => false,
        }
    }

    /// Remove the entry entirely (session expired or deleted by clean start).
    pub fn remove(&self, client_id: &str) -> Option<SharedSession> {
        let removed = self.entries.lock().remove(client_id);
        if removed.is_some() {
            tracing::debug!("session removed client_id={}", client_id);
        }
        removed.map(|entry| entry.session)
    }

    pub fn get(&self, client_id: &str) -> Option<SharedSession> {
        self.entries
            .lock()
            .get(client_id)
            .map(|entry| Arc::clone(&entry.session))
    }

    pub fn attachment(&self, client_id: &str) -> Option<AttachmentState> {
        self.entries
            .lock()
            .get(client_id)
            .map(|entry| entry.attachment)
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SubscriptionOptions;

    #[test]
    fn test_first_attach_creates_fresh_session() {
        let registry = SessionRegistry::new();
        let outcome = registry.attach("client-1", 1, false, None).unwrap();
        assert!(outcome.displaced.is_none());
        assert!(!outcome.session_present);
        assert_eq!(registry.attachment("client-1"), Some(AttachmentState::Active(1)));
    }

    #[test]
    fn test_takeover_displaces_active_connection() {
        let registry = SessionRegistry::new();
        let first = registry.attach("client-1", 1, false, None).unwrap();
        first
            .session
            .lock()
            .add_subscription("a/b", SubscriptionOptions::default(), None)
            .unwrap();

        let second = registry.attach("client-1", 2, false, None).unwrap();
        assert_eq!(second.displaced, Some(1));
        assert!(second.session_present);
        // State is reused, not recreated, and the registry holds one entry.
        assert_eq!(second.session.lock().subscription_count(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.attachment("client-1"), Some(AttachmentState::Active(2)));
    }

    #[test]
    fn test_clean_start_recreates_state() {
        let registry = SessionRegistry::new();
        let first = registry.attach("client-1", 1, false, None).unwrap();
        first
            .session
            .lock()
            .add_subscription("a/b", SubscriptionOptions::default(), None)
            .unwrap();

        let second = registry.attach("client-1", 2, true, None).unwrap();
        assert_eq!(second.displaced, Some(1));
        assert!(!second.session_present);
        assert!(second.session.lock().is_empty());
    }

    #[test]
    fn test_restored_state_installed_when_absent() {
        let registry = SessionRegistry::new();
        let mut restored = SessionState::new("client-1");
        restored
            .add_subscription("a/b", SubscriptionOptions::default(), Some(4))
            .unwrap();

        let outcome = registry.attach("client-1", 1, false, Some(restored)).unwrap();
        assert!(outcome.session_present);
        assert_eq!(outcome.session.lock().subscription_count(), 1);
    }

    #[test]
    fn test_restored_state_ignored_on_clean_start() {
        let registry = SessionRegistry::new();
        let mut restored = SessionState::new("client-1");
        restored
            .add_subscription("a/b", SubscriptionOptions::default(), None)
            .unwrap();

        let outcome = registry.attach("client-1", 1, true, Some(restored)).unwrap();
        assert!(!outcome.session_present);
        assert!(outcome.session.lock().is_empty());
    }

    #[test]
    fn test_detach_then_resume() {
        let registry = SessionRegistry::new();
        registry.attach("client-1", 1, false, None).unwrap();
        assert!(registry.detach("client-1", 1));
        assert_eq!(registry.attachment("client-1"), Some(AttachmentState::Detached));

        // Reconnect resumes the detached entry without displacing anyone.
        let outcome = registry.attach("client-1", 2, false, None).unwrap();
        assert!(outcome.displaced.is_none());
        assert!(outcome.session_present);
    }

    #[test]
    fn test_stale_detach_after_takeover_is_ignored() {
        let registry = SessionRegistry::new();
        registry.attach("client-1", 1, false, None).unwrap();
        registry.attach("client-1", 2, false, None).unwrap();

        // The displaced connection's late disconnect must not detach the
        // new owner.
        assert!(!registry.detach("client-1", 1));
        assert_eq!(registry.attachment("client-1"), Some(AttachmentState::Active(2)));
        assert!(registry.detach("client-1", 2));
    }

    #[test]
    fn test_empty_client_id_rejected() {
        let registry = SessionRegistry::new();
        let err = registry.attach("", 1, false, None).unwrap_err();
        assert!(matches!(err, SessionStateError::InvalidClientId(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_returns_session() {
        let registry = SessionRegistry::new();
        registry.attach("client-1", 1, false, None).unwrap();
        assert!(registry.remove("client-1").is_some());
        assert!(registry.remove("client-1").is_none());
        assert!(registry.get("client-1").is_none());
    }
}
