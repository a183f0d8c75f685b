//! In-memory model of a durable MQTT session.
//!
//! A session is a client identifier plus a keyed set of topic-filter
//! subscriptions. The protocol handler mutates it on SUBSCRIBE/UNSUBSCRIBE;
//! the state manager snapshots it for persistence. Re-subscribing to a
//! filter replaces the prior record (last write wins), matching MQTT
//! subscription semantics.

pub mod codec;
pub mod registry;

use crate::error::SessionStateError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Smallest valid MQTT 5 subscription identifier.
pub const SUBSCRIPTION_ID_MIN: u32 = 1;
/// Largest valid MQTT 5 subscription identifier (four-byte varint ceiling).
pub const SUBSCRIPTION_ID_MAX: u32 = 268_435_455;

/// MQTT strings cap at 64 KiB on the wire.
pub(crate) const MAX_MQTT_STRING_LEN: usize = 65_535;

/// MQTT quality-of-service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    /// Wire value (0..=2).
    pub fn value(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

/// MQTT 5 retain-handling policy: whether retained messages are delivered
/// upon (re)subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetainHandling {
    /// Send retained messages on every subscribe.
    SendOnSubscribe,
    /// Send retained messages only if the subscription did not already exist.
    SendIfNew,
    /// Never send retained messages on subscribe.
    DoNotSend,
}

impl RetainHandling {
    /// Wire ordinal (0..=2).
    pub fn value(self) -> u8 {
        match self {
            Self::SendOnSubscribe => 0,
            Self::SendIfNew => 1,
            Self::DoNotSend => 2,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SendOnSubscribe),
            1 => Some(Self::SendIfNew),
            2 => Some(Self::DoNotSend),
            _ => None,
        }
    }
}

/// Per-subscription options carried by SUBSCRIBE and persisted with the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub qos: Qos,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            qos: Qos::AtMostOnce,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::SendOnSubscribe,
        }
    }
}

/// One topic-filter subscription as persisted with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic_filter: String,
    pub options: SubscriptionOptions,
    /// Optional MQTT 5 identifier the client uses to correlate inbound
    /// PUBLISH packets with the subscription that caused delivery. Each
    /// subscription carries its own identifier.
    pub subscription_identifier: Option<u32>,
}

/// Mutable aggregate owned by one logical MQTT session.
///
/// Equality compares the client id and the subscription map as a set, which
/// is exactly the equivalence the codec round-trip guarantees; subscription
/// insertion order is not preserved across encode/decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    client_id: String,
    subscriptions: HashMap<String, Subscription>,
}

impl SessionState {
    /// Create an empty session for `client_id`. The identifier is fixed for
    /// the lifetime of the session; the registry and codec reject empty ids.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            subscriptions: HashMap::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Insert or replace the subscription for `filter`.
    pub fn add_subscription(
        &mut self,
        filter: impl Into<String>,
        options: SubscriptionOptions,
        subscription_identifier: Option<u32>,
    ) -> Result<(), SessionStateError> {
        let filter = filter.into();
        if filter.is_empty() {
            return Err(SessionStateError::invalid_subscription(
                "empty topic filter",
            ));
        }
        if filter.len() > MAX_MQTT_STRING_LEN {
            return Err(SessionStateError::invalid_subscription(format!(
                "topic filter exceeds {} bytes",
                MAX_MQTT_STRING_LEN
            )));
        }
        if let Some(id) = subscription_identifier {
            if !(SUBSCRIPTION_ID_MIN..=SUBSCRIPTION_ID_MAX).contains(&id) {
                return Err(SessionStateError::invalid_subscription(format!(
                    "subscription identifier {} out of range [{}, {}]",
                    id, SUBSCRIPTION_ID_MIN, SUBSCRIPTION_ID_MAX
                )));
            }
        }
        let subscription = Subscription {
            topic_filter: filter.clone(),
            options,
            subscription_identifier,
        };
        self.subscriptions.insert(filter, subscription);
        Ok(())
    }

    /// Remove the subscription for `filter`; returns whether one existed.
    pub fn remove_subscription(&mut self, filter: &str) -> bool {
        self.subscriptions.remove(filter).is_some()
    }

    pub fn subscription(&self, filter: &str) -> Option<&Subscription> {
        self.subscriptions.get(filter)
    }

    /// Snapshot copy of all subscriptions, not a live view. Taken under the
    /// session lock so a concurrent encode never observes a torn state.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(qos: Qos) -> SubscriptionOptions {
        SubscriptionOptions {
            qos,
            ..SubscriptionOptions::default()
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let mut state = SessionState::new("client-1");
        state
            .add_subscription("sensors/+/temp", options(Qos::AtLeastOnce), Some(7))
            .unwrap();

        let sub = state.subscription("sensors/+/temp").unwrap();
        assert_eq!(sub.options.qos, Qos::AtLeastOnce);
        assert_eq!(sub.subscription_identifier, Some(7));
        assert_eq!(state.subscription_count(), 1);
    }

    #[test]
    fn test_resubscribe_replaces() {
        let mut state = SessionState::new("client-1");
        state
            .add_subscription("a/b", options(Qos::AtMostOnce), None)
            .unwrap();
        state
            .add_subscription("a/b", options(Qos::ExactlyOnce), Some(3))
            .unwrap();

        assert_eq!(state.subscription_count(), 1);
        let sub = state.subscription("a/b").unwrap();
        assert_eq!(sub.options.qos, Qos::ExactlyOnce);
        assert_eq!(sub.subscription_identifier, Some(3));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut state = SessionState::new("client-1");
        state
            .add_subscription("a/b", SubscriptionOptions::default(), None)
            .unwrap();

        assert!(state.remove_subscription("a/b"));
        assert!(!state.remove_subscription("a/b"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_rejects_empty_filter() {
        let mut state = SessionState::new("client-1");
        let err = state
            .add_subscription("", SubscriptionOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, SessionStateError::InvalidSubscription(_)));
        assert!(state.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_identifier() {
        let mut state = SessionState::new("client-1");
        for bad in [0, SUBSCRIPTION_ID_MAX + 1] {
            let err = state
                .add_subscription("a/b", SubscriptionOptions::default(), Some(bad))
                .unwrap_err();
            assert!(matches!(err, SessionStateError::InvalidSubscription(_)));
        }
        state
            .add_subscription("a/b", SubscriptionOptions::default(), Some(SUBSCRIPTION_ID_MAX))
            .unwrap();
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut state = SessionState::new("client-1");
        state
            .add_subscription("a/b", SubscriptionOptions::default(), None)
            .unwrap();
        let snapshot = state.subscriptions();
        state.remove_subscription("a/b");
        assert_eq!(snapshot.len(), 1);
        assert!(state.is_empty());
    }

    #[test]
    fn test_equivalence_ignores_insertion_order() {
        let mut a = SessionState::new("client-1");
        a.add_subscription("x", options(Qos::AtMostOnce), None).unwrap();
        a.add_subscription("y", options(Qos::AtLeastOnce), Some(2)).unwrap();

        let mut b = SessionState::new("client-1");
        b.add_subscription("y", options(Qos::AtLeastOnce), Some(2)).unwrap();
        b.add_subscription("x", options(Qos::AtMostOnce), None).unwrap();

        assert_eq!(a, b);
    }
}
