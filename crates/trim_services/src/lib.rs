//! Trim Services Layer
//!
//! Settings loading and on-disk output for trim sessions.

pub mod settings;
pub mod sink;

pub use settings::{parse_frame_range, Settings, SettingsError};
pub use sink::JsonLinesSink;
