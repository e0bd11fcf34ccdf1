//! Number entities
//!
//! A number entity exposes a bounded float the user can set from the UI
//! (slider or input box). Entities implement [`NumberEntity`] in native
//! units; the helpers here turn that into state and attributes and guard
//! the user-facing set path.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::entity::{Entity, EntityError};

/// Entity domain for number entities
pub const DOMAIN: &str = "number";

pub const DEFAULT_MIN_VALUE: f64 = 0.0;
pub const DEFAULT_MAX_VALUE: f64 = 100.0;
pub const DEFAULT_STEP: f64 = 1.0;

/// How the frontend renders the number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NumberMode {
    #[default]
    Auto,
    Box,
    Slider,
}

impl NumberMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberMode::Auto => "auto",
            NumberMode::Box => "box",
            NumberMode::Slider => "slider",
        }
    }
}

#[async_trait]
pub trait NumberEntity: Entity {
    fn native_value(&self) -> Option<f64>;

    fn native_min_value(&self) -> f64 {
        DEFAULT_MIN_VALUE
    }

    fn native_max_value(&self) -> f64 {
        DEFAULT_MAX_VALUE
    }

    /// Explicit step; when `None` one is derived from the range
    fn native_step(&self) -> Option<f64> {
        None
    }

    fn native_unit_of_measurement(&self) -> Option<String> {
        None
    }

    fn mode(&self) -> NumberMode {
        NumberMode::Auto
    }

    async fn async_set_native_value(&self, value: f64) -> Result<(), EntityError>;
}

/// Step shown to the user
///
/// Without an explicit step, start at 1 and divide by 10 until the step
/// is smaller than the range.
pub fn number_step<E: NumberEntity + ?Sized>(entity: &E) -> f64 {
    if let Some(step) = entity.native_step() {
        return step;
    }
    let range = (entity.native_max_value() - entity.native_min_value()).abs();
    let mut step = DEFAULT_STEP;
    while range > 0.0 && range <= step {
        step /= 10.0;
    }
    step
}

/// State string for a number entity
pub fn number_state<E: NumberEntity + ?Sized>(entity: &E) -> Option<String> {
    entity.native_value().map(format_number)
}

/// Capability attributes every number entity carries
pub fn number_attributes<E: NumberEntity + ?Sized>(entity: &E) -> HashMap<String, Value> {
    HashMap::from([
        ("min".to_string(), json!(entity.native_min_value())),
        ("max".to_string(), json!(entity.native_max_value())),
        ("step".to_string(), json!(number_step(entity))),
        ("mode".to_string(), json!(entity.mode().as_str())),
    ])
}

/// Set a number from user input (UI slider, `number.set_value`)
///
/// Values outside `[min, max]` are rejected, not clamped.
pub async fn async_set_value<E: NumberEntity + ?Sized>(
    entity: &E,
    value: f64,
) -> Result<(), EntityError> {
    let min = entity.native_min_value();
    let max = entity.native_max_value();
    if !(min..=max).contains(&value) {
        return Err(EntityError::OutOfRange {
            entity_id: entity
                .entity_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            value,
            min,
            max,
        });
    }

    debug!(value, "Setting number value");
    entity.async_set_native_value(value).await
}

/// Format a number for state display (no trailing `.0` on whole numbers)
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
