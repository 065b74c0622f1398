//! Inbound composition request schema and its validation limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::quality::{JobPriority, VideoQuality};
use crate::scene::{AudioSettings, TextOverlay, Transition, VideoSettings};
use crate::timeline::{CompositionSettings, MediaKind, OutputFormat};

/// Request validation limits, overridable via environment configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Maximum media file size in bytes
    pub max_file_size: u64,
    /// Maximum scene count per timeline
    pub max_scenes: usize,
    /// Maximum per-scene duration in seconds
    pub max_scene_duration: f64,
    /// Maximum total timeline duration in seconds
    pub max_total_duration: f64,
    /// Duration assumed for scenes without an explicit one
    pub default_scene_duration: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
            max_scenes: 20,
            max_scene_duration: 60.0,
            max_total_duration: 600.0,
            default_scene_duration: 5.0,
        }
    }
}

/// Structured validation failure identifying the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One scene as declared in the request, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneSpec {
    /// URL, local path, or base64-embedded media
    pub source: String,

    #[serde(default)]
    pub media_kind: MediaKind,

    /// Display duration in seconds; the configured default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default)]
    pub transition: Transition,

    /// Transition duration in seconds (0-3)
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,

    /// Optional voice track (URL, path, or base64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voiceover: Option<String>,

    /// Optional per-scene background music
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_music: Option<String>,

    #[serde(default)]
    pub audio_settings: AudioSettings,

    #[serde(default)]
    pub video_settings: VideoSettings,

    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    /// Loop media shorter than the declared duration
    #[serde(default, rename = "loop")]
    pub looped: bool,
}

fn default_transition_duration() -> f64 {
    0.5
}

/// The inbound composition request.
///
/// Scene order is significant and preserved exactly as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionRequest {
    pub scenes: Vec<SceneSpec>,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub quality: VideoQuality,

    /// Frames per second (15-60)
    #[serde(default = "default_fps")]
    pub fps: u8,

    #[serde(default)]
    pub priority: JobPriority,

    #[serde(default)]
    pub composition_settings: CompositionSettings,

    /// Completion notification endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Free-form metadata echoed back in snapshots and webhooks
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_fps() -> u8 {
    30
}

impl CompositionRequest {
    /// Validate every request-level bound, failing on the first offense.
    ///
    /// This runs before any asset is resolved; scenes without an explicit
    /// duration count as `limits.default_scene_duration` toward the total.
    pub fn validate(&self, limits: &Limits) -> Result<(), ValidationError> {
        if self.scenes.is_empty() {
            return Err(ValidationError::new("scenes", "at least one scene is required"));
        }
        if self.scenes.len() > limits.max_scenes {
            return Err(ValidationError::new(
                "scenes",
                format!("maximum {} scenes allowed", limits.max_scenes),
            ));
        }
        if !(15..=60).contains(&self.fps) {
            return Err(ValidationError::new("fps", "fps must be between 15 and 60"));
        }

        let s = &self.composition_settings;
        if !(0.0..=1.0).contains(&s.background_music_volume) {
            return Err(ValidationError::new(
                "composition_settings.background_music_volume",
                "volume must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=10.0).contains(&s.intro_duration) {
            return Err(ValidationError::new(
                "composition_settings.intro_duration",
                "intro duration must be between 0 and 10 seconds",
            ));
        }
        if !(0.0..=10.0).contains(&s.outro_duration) {
            return Err(ValidationError::new(
                "composition_settings.outro_duration",
                "outro duration must be between 0 and 10 seconds",
            ));
        }

        let mut total = 0.0;
        for (idx, scene) in self.scenes.iter().enumerate() {
            Self::validate_scene(idx, scene, limits)?;
            total += scene.duration.unwrap_or(limits.default_scene_duration);
        }
        if total > limits.max_total_duration {
            return Err(ValidationError::new(
                "scenes",
                format!(
                    "total duration {:.1}s exceeds maximum {:.0}s",
                    total, limits.max_total_duration
                ),
            ));
        }

        Ok(())
    }

    fn validate_scene(idx: usize, scene: &SceneSpec, limits: &Limits) -> Result<(), ValidationError> {
        let field = |name: &str| format!("scenes[{}].{}", idx, name);

        if scene.source.trim().is_empty() {
            return Err(ValidationError::new(field("source"), "source must be a non-empty string"));
        }
        if let Some(d) = scene.duration {
            if d <= 0.0 {
                return Err(ValidationError::new(field("duration"), "duration must be positive"));
            }
            if d > limits.max_scene_duration {
                return Err(ValidationError::new(
                    field("duration"),
                    format!("duration cannot exceed {:.0} seconds", limits.max_scene_duration),
                ));
            }
        }
        if !(0.0..=3.0).contains(&scene.transition_duration) {
            return Err(ValidationError::new(
                field("transition_duration"),
                "transition duration must be between 0 and 3 seconds",
            ));
        }

        let audio = &scene.audio_settings;
        if !(0.0..=2.0).contains(&audio.volume) {
            return Err(ValidationError::new(
                field("audio_settings.volume"),
                "volume must be between 0.0 and 2.0",
            ));
        }
        if let (Some(start), Some(end)) = (audio.start_time, audio.end_time) {
            if end <= start {
                return Err(ValidationError::new(
                    field("audio_settings.end_time"),
                    "trim window end must be after start",
                ));
            }
        }

        let video = &scene.video_settings;
        if video.rotate > 360 {
            return Err(ValidationError::new(
                field("video_settings.rotate"),
                "rotation must be between 0 and 360 degrees",
            ));
        }
        if !(0.1..=3.0).contains(&video.brightness) {
            return Err(ValidationError::new(
                field("video_settings.brightness"),
                "brightness must be between 0.1 and 3.0",
            ));
        }
        if !(0.1..=3.0).contains(&video.contrast) {
            return Err(ValidationError::new(
                field("video_settings.contrast"),
                "contrast must be between 0.1 and 3.0",
            ));
        }
        if !(0.0..=3.0).contains(&video.saturation) {
            return Err(ValidationError::new(
                field("video_settings.saturation"),
                "saturation must be between 0.0 and 3.0",
            ));
        }

        for (oidx, overlay) in scene.text_overlays.iter().enumerate() {
            let ofield = |name: &str| format!("scenes[{}].text_overlays[{}].{}", idx, oidx, name);
            if overlay.text.is_empty() {
                return Err(ValidationError::new(ofield("text"), "overlay text must not be empty"));
            }
            if !(8..=200).contains(&overlay.font_size) {
                return Err(ValidationError::new(
                    ofield("font_size"),
                    "font size must be between 8 and 200",
                ));
            }
            if overlay.start_time < 0.0 {
                return Err(ValidationError::new(
                    ofield("start_time"),
                    "start time must not be negative",
                ));
            }
            if let Some(d) = overlay.duration {
                if d <= 0.0 {
                    return Err(ValidationError::new(
                        ofield("duration"),
                        "overlay duration must be positive",
                    ));
                }
            }
        }

        Ok(())
    }
}
