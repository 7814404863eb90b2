//! Settings management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use trim_core::{ConfigError, FrameRange, TrimConfig};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings")]
    Parse(#[from] serde_json::Error),

    #[error("malformed frame range {input:?}, expected \"start-end\" or \"start-\"")]
    FrameRange { input: String },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trim: TrimConfig,
    /// Default filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Where the trimmed stream goes. Stdout when unset.
    pub output: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trim: TrimConfig::with_frames(FrameRange::new(2, 4)),
            log_level: "info".to_string(),
            output: None,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.trim.validate()?;
        Ok(settings)
    }

    /// Override the trim window from its command-line form.
    pub fn set_frame_range(&mut self, input: &str) -> Result<(), SettingsError> {
        self.trim.frames = Some(parse_frame_range(input)?);
        self.trim.validate()?;
        Ok(())
    }
}

/// Parse `"10-20"` (frames 10 up to 20) or `"10-"` (open ended).
pub fn parse_frame_range(input: &str) -> Result<FrameRange, SettingsError> {
    let malformed = || SettingsError::FrameRange {
        input: input.to_string(),
    };
    let (start, end) = input.trim().split_once('-').ok_or_else(malformed)?;
    let start = start.trim().parse::<u64>().map_err(|_| malformed())?;
    let end = end.trim();
    if end.is_empty() {
        return Ok(FrameRange::starting_at(start));
    }
    let end = end.parse::<u64>().map_err(|_| malformed())?;
    Ok(FrameRange::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trim_core::ImageCreationPolicy;

    #[test]
    fn frame_ranges_parse() {
        assert_eq!(parse_frame_range("10-20").unwrap(), FrameRange::new(10, 20));
        assert_eq!(parse_frame_range(" 7 - ").unwrap(), FrameRange::starting_at(7));
        for bad in ["", "10", "-5", "a-b", "3-x"] {
            assert!(matches!(parse_frame_range(bad), Err(SettingsError::FrameRange { .. })), "{bad}");
        }
    }

    #[test]
    fn settings_fill_in_defaults() {
        let settings = Settings::from_json(r#"{ "log_level": "debug" }"#).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.trim, Settings::default().trim);
        assert!(settings.output.is_none());

        let settings = Settings::from_json(
            r#"{ "trim": { "frames": { "start": 5, "end": 9 }, "image_creation": "unordered" } }"#,
        )
        .unwrap();
        assert_eq!(settings.trim.frames, Some(FrameRange::new(5, 9)));
        assert_eq!(settings.trim.image_creation, ImageCreationPolicy::Unordered);
    }

    #[test]
    fn invalid_windows_are_rejected() {
        let result = Settings::from_json(r#"{ "trim": { "frames": { "start": 9, "end": 5 } } }"#);
        assert!(matches!(result, Err(SettingsError::Invalid(_))));

        let mut settings = Settings::default();
        assert!(settings.set_frame_range("4-4").is_err());
        settings.set_frame_range("1-8").unwrap();
        assert_eq!(settings.trim.frames, Some(FrameRange::new(1, 8)));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = Settings::load("/nonexistent/vktrim.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vktrim.json"));
    }
}
