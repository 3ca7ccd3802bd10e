//! Storage traits for data the engine doesn't own: user preferences and the
//! settings they're recorded in.

pub mod settings;

pub use settings::{PreferenceKey, SettingsStore};
