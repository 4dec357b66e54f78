//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::clock::TimeBase;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default capture settings.
    pub capture: CaptureDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Byte order of one 4-byte captured pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    /// R, G, B, then an ignored fourth byte.
    #[default]
    Rgba,
    /// B, G, R, A.
    Bgra,
}

/// Quarter-turn applied while converting captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    /// Source rows become output columns; the source top-right corner
    /// lands at the output top-left.
    CounterClockwise90,
    /// Source rows become output columns; the source top-left corner
    /// lands at the output top-right.
    Clockwise90,
}

impl Rotation {
    /// Whether source width and height are swapped in the output.
    pub fn swaps_axes(self) -> bool {
        !matches!(self, Rotation::None)
    }
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Capture ticks per second.
    pub fps: u32,

    /// Output frame width in pixels.
    pub width: u32,

    /// Output frame height in pixels.
    pub height: u32,

    /// Border (left and right) left out of the converted picture.
    pub padding_width: u32,

    /// Border (top and bottom) left out of the converted picture.
    pub padding_height: u32,

    /// Captured pixel byte order.
    pub color_order: ColorOrder,

    /// Rotation applied during conversion.
    pub rotation: Rotation,

    /// Audio sample rate (mono).
    pub audio_sample_rate: u32,

    /// Samples per encoded audio frame.
    pub audio_frame_size: usize,

    /// Video stream time base.
    pub video_time_base: TimeBase,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "screenmux=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Whether to include thread names in text output.
    #[serde(default)]
    pub thread_names: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            fps: 10,
            width: 640,
            height: 480,
            padding_width: 0,
            padding_height: 0,
            color_order: ColorOrder::Rgba,
            rotation: Rotation::None,
            audio_sample_rate: 44_100,
            audio_frame_size: 1024,
            video_time_base: TimeBase::new(1, 10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            thread_names: true,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("screenmux").join("config.json")
}
