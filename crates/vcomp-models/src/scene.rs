//! Scene-level model types: transitions, audio/video settings, overlays.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::timeline::{MediaKind, SourceSpec};

/// Transition applied at the boundary before a scene.
///
/// Every non-cut variant maps to a fixed FFmpeg `xfade` transition name;
/// cut means plain concatenation with no blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    Fade,
    Cut,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    ZoomIn,
    ZoomOut,
    Dissolve,
    Crossfade,
    WipeLeft,
    WipeRight,
    CircleOpen,
    CircleClose,
}

impl Transition {
    /// FFmpeg `xfade` transition name, or `None` for a hard cut.
    pub fn xfade_name(&self) -> Option<&'static str> {
        match self {
            Transition::Cut => None,
            Transition::Fade => Some("fade"),
            Transition::Crossfade => Some("fade"),
            Transition::SlideLeft => Some("slideleft"),
            Transition::SlideRight => Some("slideright"),
            Transition::SlideUp => Some("slideup"),
            Transition::SlideDown => Some("slidedown"),
            Transition::ZoomIn => Some("zoomin"),
            Transition::ZoomOut => Some("circlecrop"),
            Transition::Dissolve => Some("dissolve"),
            Transition::WipeLeft => Some("wipeleft"),
            Transition::WipeRight => Some("wiperight"),
            Transition::CircleOpen => Some("circleopen"),
            Transition::CircleClose => Some("circleclose"),
        }
    }

    pub fn is_cut(&self) -> bool {
        matches!(self, Transition::Cut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Fade => "fade",
            Transition::Cut => "cut",
            Transition::SlideLeft => "slide_left",
            Transition::SlideRight => "slide_right",
            Transition::SlideUp => "slide_up",
            Transition::SlideDown => "slide_down",
            Transition::ZoomIn => "zoom_in",
            Transition::ZoomOut => "zoom_out",
            Transition::Dissolve => "dissolve",
            Transition::Crossfade => "crossfade",
            Transition::WipeLeft => "wipe_left",
            Transition::WipeRight => "wipe_right",
            Transition::CircleOpen => "circle_open",
            Transition::CircleClose => "circle_close",
        }
    }

    pub const ALL: [Transition; 14] = [
        Transition::Fade,
        Transition::Cut,
        Transition::SlideLeft,
        Transition::SlideRight,
        Transition::SlideUp,
        Transition::SlideDown,
        Transition::ZoomIn,
        Transition::ZoomOut,
        Transition::Dissolve,
        Transition::Crossfade,
        Transition::WipeLeft,
        Transition::WipeRight,
        Transition::CircleOpen,
        Transition::CircleClose,
    ];
}

/// Audio effect applied to a scene's voice track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioEffect {
    #[default]
    None,
    FadeIn,
    FadeOut,
    Normalize,
    Amplify,
    NoiseReduction,
}

/// Per-scene audio settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioSettings {
    /// Volume multiplier (0.0-2.0)
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// Effects to apply, in order
    #[serde(default)]
    pub effects: Vec<AudioEffect>,

    /// Trim window start (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,

    /// Trim window end (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

fn default_volume() -> f64 {
    1.0
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            effects: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }
}

/// Per-scene video transform settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSettings {
    /// Scale filter argument (e.g. "1920:1080")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,

    /// Crop filter argument (e.g. "1920:1080:0:0")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,

    /// Rotation angle in degrees (0-360)
    #[serde(default)]
    pub rotate: u16,

    /// Brightness multiplier (0.1-3.0)
    #[serde(default = "default_unity")]
    pub brightness: f64,

    /// Contrast multiplier (0.1-3.0)
    #[serde(default = "default_unity")]
    pub contrast: f64,

    /// Saturation multiplier (0.0-3.0)
    #[serde(default = "default_unity")]
    pub saturation: f64,
}

fn default_unity() -> f64 {
    1.0
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            scale: None,
            crop: None,
            rotate: 0,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

impl VideoSettings {
    /// True when the settings are a pure pass-through.
    pub fn is_identity(&self) -> bool {
        self.scale.is_none()
            && self.crop.is_none()
            && self.rotate == 0
            && (self.brightness - 1.0).abs() < f64::EPSILON
            && (self.contrast - 1.0).abs() < f64::EPSILON
            && (self.saturation - 1.0).abs() < f64::EPSILON
    }
}

/// Overlay text placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextPosition {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

/// A timed text overlay within a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    /// Text to render
    pub text: String,

    #[serde(default)]
    pub position: TextPosition,

    /// Font size (8-200)
    #[serde(default = "default_font_size")]
    pub font_size: u16,

    /// Font color (name or hex)
    #[serde(default = "default_font_color")]
    pub font_color: String,

    /// Optional box color behind the text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,

    /// When the text appears (seconds from scene start)
    #[serde(default)]
    pub start_time: f64,

    /// How long the text stays visible; scene remainder when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

fn default_font_size() -> u16 {
    24
}

fn default_font_color() -> String {
    "white".to_string()
}

/// A validated timeline element with its media fully resolved.
///
/// Produced by the timeline builder from a [`crate::SceneSpec`]; every
/// source reference has been turned into a local [`Asset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Primary media source as declared
    pub source: SourceSpec,

    /// Declared media kind
    pub media_kind: MediaKind,

    /// Resolved primary media
    pub asset: Asset,

    /// Resolved voice track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_asset: Option<Asset>,

    /// Resolved per-scene background music
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_asset: Option<Asset>,

    /// Display duration in seconds
    pub duration: f64,

    /// Transition applied at this scene's leading boundary
    pub transition: Transition,

    /// Transition duration in seconds (0-3)
    pub transition_duration: f64,

    #[serde(default)]
    pub audio_settings: AudioSettings,

    #[serde(default)]
    pub video_settings: VideoSettings,

    /// Ordered text overlays
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    /// Loop media shorter than the declared duration
    #[serde(default)]
    pub looped: bool,
}
