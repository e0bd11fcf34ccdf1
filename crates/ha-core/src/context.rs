//! Origin of a state write

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Attached to every state; a fresh ULID per write unless a caller passes one along
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,

    /// Set when the write came from a user action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Context of the write that triggered this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Ulid::new().into()
    }
}

impl From<Ulid> for Context {
    fn from(id: Ulid) -> Self {
        Self {
            id: id.to_string(),
            user_id: None,
            parent_id: None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
