//! Config Entries
//!
//! A config entry is one configured instance of an integration: its domain,
//! a title, immutable `data` captured by the config flow and user-editable
//! `options`. Platforms receive the entry they are being set up for.

pub mod entry;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
