//! Core types for Home Assistant
//!
//! The value types every other crate in the workspace speaks: EntityId,
//! State, Context, plus the slug helper used to derive ids from names.

mod context;
mod entity_id;
mod naming;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use naming::slugify;
pub use state::State;

/// State value for an entity whose value is not known yet
pub const STATE_UNKNOWN: &str = "unknown";

/// State value for an entity that cannot currently be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Standard event payloads
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Payload broadcast by the state store on every write or removal
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }
}
