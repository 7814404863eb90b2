//! Trim configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How image creation is replayed at the start of the trimmed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCreationPolicy {
    /// Image calls in the order the application issued them.
    #[default]
    Ordered,
    /// Per-image calls rebuilt from final state. Smaller, but only valid when
    /// creation order does not affect the result.
    Unordered,
}

/// Frames `[start, end)` of the trim window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    #[serde(default = "FrameRange::open_end")]
    pub end: u64,
}

impl FrameRange {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Window that stays open until the session ends.
    pub const fn starting_at(start: u64) -> Self {
        Self { start, end: u64::MAX }
    }

    fn open_end() -> u64 {
        u64::MAX
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == u64::MAX
    }

    pub fn contains(&self, frame: u64) -> bool {
        (self.start..self.end).contains(&frame)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open_ended() {
            write!(f, "{}-", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// `None` disables trimming.
    pub frames: Option<FrameRange>,
    pub image_creation: ImageCreationPolicy,
}

impl TrimConfig {
    pub fn with_frames(frames: FrameRange) -> Self {
        Self {
            frames: Some(frames),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.frames {
            Some(FrameRange { start, end }) if end <= start => {
                Err(ConfigError::EmptyFrameRange { start, end })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ranges_are_rejected() {
        assert!(TrimConfig::default().validate().is_ok());
        assert!(TrimConfig::with_frames(FrameRange::new(3, 4)).validate().is_ok());
        assert!(matches!(
            TrimConfig::with_frames(FrameRange::new(4, 4)).validate(),
            Err(ConfigError::EmptyFrameRange { start: 4, end: 4 })
        ));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: TrimConfig =
            serde_json::from_str(r#"{ "frames": { "start": 10 }, "image_creation": "unordered" }"#).unwrap();
        assert_eq!(config.frames, Some(FrameRange::starting_at(10)));
        assert_eq!(config.image_creation, ImageCreationPolicy::Unordered);

        let config: TrimConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrimConfig::default());
    }

    #[test]
    fn range_display_and_membership() {
        assert_eq!(FrameRange::new(10, 20).to_string(), "10-20");
        assert_eq!(FrameRange::starting_at(5).to_string(), "5-");
        assert!(FrameRange::new(10, 20).contains(10));
        assert!(!FrameRange::new(10, 20).contains(20));
    }
}
