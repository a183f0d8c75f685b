#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
// Struct field patterns
#![allow(clippy::struct_excessive_bools)]
// Iterator patterns
#![allow(clippy::iter_without_into_iter)]

//! Persistence core for durable MQTT sessions.
//!
//! This crate captures a client's durable session (client identifier plus
//! topic-filter subscriptions with their per-subscription options and
//! optional subscription identifiers) as an in-memory model and reversibly
//! encodes it into a versioned durable record so the session survives broker
//! restarts, clean-start=false reconnects, and failover:
//! - `session` - the session-state model and the wire codec
//! - `session::registry` - live-session table with takeover semantics
//! - `manager` - persistence orchestration over a storage collaborator
//! - `store` - the narrow durable key-value contract this core consumes
//!
//! Transport, packet framing, and the durable-message engine itself live
//! outside this crate and are reached only through the `store` contract.

pub mod config;
pub mod error;
pub mod manager;
pub mod session;
pub mod store;

pub use config::{SessionStoreConfig, UnreadableRecordPolicy};
pub use error::SessionStateError;
pub use manager::{DurableRecordHandle, RecordKey, StateManager};
pub use session::codec::{decode_session, encode_session, CURRENT_STATE_VERSION};
pub use session::registry::{
    AttachOutcome, AttachmentState, ConnectionId, SessionRegistry, SharedSession,
};
pub use session::{
    Qos, RetainHandling, SessionState, Subscription, SubscriptionOptions, SUBSCRIPTION_ID_MAX,
    SUBSCRIPTION_ID_MIN,
};
pub use store::{MemoryStateStore, StateStore};
