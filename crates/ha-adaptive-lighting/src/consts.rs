//! Adaptive Lighting constants

pub const DOMAIN: &str = "adaptive_lighting";

pub const CONF_NAME: &str = "name";

pub const ICON_BRIGHTNESS: &str = "mdi:brightness-4";
pub const ICON_COLOR_TEMP: &str = "mdi:sun-thermometer";

/// Percent
pub const DEFAULT_OVERRIDE_BRIGHTNESS: f64 = 100.0;
/// Kelvin
pub const DEFAULT_OVERRIDE_COLOR_TEMP: f64 = 4000.0;

/// Keys of the number entities in the per-entry runtime data
pub const OVERRIDE_BRIGHTNESS_NUMBER: &str = "override_brightness_number";
pub const OVERRIDE_COLOR_TEMP_NUMBER: &str = "override_color_temp_number";
