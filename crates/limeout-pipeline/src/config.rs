//! Pipeline configuration, loadable from JSON.

use limeout_core::{FrameRate, LimeoutError, PixelRect, Result};
use limeout_effects::{Background, ChromaKeyParams, CropMargins};
use limeout_media::ExportConfig;
use limeout_tracking::StabilizerSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Everything a preview or export run needs besides the media itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub key: ChromaKeyParams,
    pub stabilizer: StabilizerSettings,
    pub margins: CropMargins,
    /// Stabilization reference region; `None` disables stabilization.
    pub region: Option<PixelRect>,
    /// Source frame the region is picked from.
    pub reference_frame: u64,
    pub background: Background,
    pub export: ExportConfig,
    /// Output frame rate; the source rate when unset.
    pub fps: Option<f64>,
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "limeout_tracking=debug,warn").
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LimeoutError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&content)
            .map_err(|e| LimeoutError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LimeoutError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LimeoutError::Config(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Checks that do not need the source dimensions.
    pub fn validate(&self) -> Result<()> {
        self.key.validate()?;
        self.stabilizer.validate()?;
        if let Some(fps) = self.fps {
            if FrameRate::from_fps_f64(fps).is_none() {
                return Err(LimeoutError::invalid(format!(
                    "frame rate must be positive, got {fps}"
                )));
            }
        }
        Ok(())
    }

    /// Output frame rate for a source running at `source`.
    pub fn output_frame_rate(&self, source: FrameRate) -> FrameRate {
        self.fps
            .and_then(FrameRate::from_fps_f64)
            .unwrap_or(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limeout_media::Strictness;

    #[test]
    fn test_defaults_round_trip() {
        let config = PipelineConfig::default();
        let parsed = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed.key, config.key);
        assert_eq!(parsed.margins, CropMargins::NONE);
        assert_eq!(parsed.region, None);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = PipelineConfig::from_json(
            r#"{
                "margins": {"left": 4, "top": 2, "right": 4, "bottom": 2},
                "region": {"x": 10, "y": 12, "width": 32, "height": 32},
                "export": {"strictness": "abort"},
                "fps": 25.0
            }"#,
        )
        .unwrap();
        assert_eq!(config.margins, CropMargins::new(4, 2, 4, 2));
        assert_eq!(config.region, Some(PixelRect::new(10, 12, 32, 32)));
        assert_eq!(config.export.strictness, Strictness::Abort);
        assert!(config.export.retry_once);
        assert_eq!(config.stabilizer.search_margin, 50);
        assert_eq!(config.output_frame_rate(FrameRate::FPS_30), FrameRate::FPS_25);
    }

    #[test]
    fn test_source_rate_without_override() {
        let config = PipelineConfig::default();
        assert_eq!(config.output_frame_rate(FrameRate::FPS_29_97), FrameRate::FPS_29_97);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(LimeoutError::Config(_))
        ));
        assert!(PipelineConfig::from_json(r#"{"key": {"spill_strength": 3.0}}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"fps": -1.0}"#).is_err());
        assert!(matches!(
            PipelineConfig::load("/no/such/limeout.json"),
            Err(LimeoutError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("limeout-config-{}.json", uuid::Uuid::new_v4()));
        let config = PipelineConfig {
            region: Some(PixelRect::new(1, 2, 16, 16)),
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.region, config.region);
        std::fs::remove_file(path).unwrap();
    }
}
