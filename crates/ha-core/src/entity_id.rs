//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::slugify;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("invalid domain '{0}'")]
    InvalidDomain(String),

    #[error("invalid object_id '{0}'")]
    InvalidObjectId(String),
}

/// A Home Assistant entity ID such as `number.adaptive_lighting_override_brightness_living_room`
///
/// Both halves are lowercase alphanumeric with underscores and may not
/// start or end with `_`. The domain additionally rejects `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create a new EntityId from already-valid parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if domain.contains("__") || !is_slug(&domain) {
            return Err(EntityIdError::InvalidDomain(domain));
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectId(object_id));
        }

        Ok(Self { domain, object_id })
    }

    /// Build an entity id from free text, slugifying it into the object_id
    pub fn from_name(domain: impl Into<String>, name: &str) -> Result<Self, EntityIdError> {
        Self::new(domain, slugify(name))
    }

    /// Same domain, object_id with `_{n}` appended (used to resolve collisions)
    pub fn with_suffix(&self, n: usize) -> Self {
        Self {
            domain: self.domain.clone(),
            object_id: format!("{}_{}", self.object_id, n),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// `(?!_)[\da-z_]+(?<!_)`
fn is_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_id() {
        let id: EntityId = "number.override_brightness".parse().unwrap();
        assert_eq!(id.domain(), "number");
        assert_eq!(id.object_id(), "override_brightness");
        assert_eq!(id.to_string(), "number.override_brightness");
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            "no_separator".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "too.many.parts".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            ".object".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyDomain
        );
    }

    #[test]
    fn test_underscore_rules() {
        assert!("light._room".parse::<EntityId>().is_err());
        assert!("light.room_".parse::<EntityId>().is_err());
        assert!("my__light.room".parse::<EntityId>().is_err());
        assert!("light.my__room".parse::<EntityId>().is_ok());
        assert!("Number.room".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_from_name_and_suffix() {
        let id = EntityId::from_name("number", "Adaptive Lighting Override Brightness: Den")
            .unwrap();
        assert_eq!(
            id.to_string(),
            "number.adaptive_lighting_override_brightness_den"
        );
        assert_eq!(
            id.with_suffix(2).to_string(),
            "number.adaptive_lighting_override_brightness_den_2"
        );
    }

    #[test]
    fn test_serializes_as_string() {
        let id = EntityId::new("number", "kitchen").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"number.kitchen\"");
        let parsed: EntityId = serde_json::from_str("\"number.kitchen\"").unwrap();
        assert_eq!(parsed, id);
    }
}
