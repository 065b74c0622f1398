//! Timeline-level types: media kinds, source classification, composition
//! settings, output parameters, and the validated timeline itself.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::asset::Asset;
use crate::scene::Scene;
use crate::quality::VideoQuality;

/// Kind of media a scene declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// Extension allow-list for this kind (lowercase, with leading dot).
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &[".jpg", ".jpeg", ".png", ".bmp", ".gif"],
            MediaKind::Audio => &[".mp3", ".wav", ".m4a", ".aac", ".flac"],
            MediaKind::Video => &[".mp4", ".avi", ".mov", ".mkv"],
        }
    }

    /// Check a file path's extension against the allow-list.
    pub fn allows_path(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let dotted = format!(".{}", ext.to_ascii_lowercase());
        self.allowed_extensions().contains(&dotted.as_str())
    }

    /// Default extension used when persisting embedded data of this kind.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => ".jpg",
            MediaKind::Audio => ".mp3",
            MediaKind::Video => ".mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// A classified media source reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceSpec {
    /// http/https URL fetched by the resolver
    RemoteUrl(String),
    /// Base64 payload, optionally with a `data:` prefix
    EmbeddedBase64(String),
    /// Path on the local filesystem
    LocalPath(PathBuf),
}

impl SourceSpec {
    /// Classify a raw request string the way the inbound schema declares
    /// sources: URLs by scheme, embedded data by `data:` prefix, anything
    /// else as a local path.
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceSpec::RemoteUrl(raw.to_string())
        } else if raw.starts_with("data:") {
            SourceSpec::EmbeddedBase64(raw.to_string())
        } else {
            SourceSpec::LocalPath(PathBuf::from(raw))
        }
    }
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Avi,
    Webm,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mov => "mov",
            OutputFormat::Avi => "avi",
            OutputFormat::Webm => "webm",
        }
    }

    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Mp4,
        OutputFormat::Mov,
        OutputFormat::Avi,
        OutputFormat::Webm,
    ];
}

/// Global composition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionSettings {
    /// Background color for intro/outro and audio-only scenes
    #[serde(default = "default_background_color")]
    pub background_color: String,

    /// Optional global background music source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_music: Option<String>,

    /// Background music mix volume (0.0-1.0)
    #[serde(default = "default_music_volume")]
    pub background_music_volume: f64,

    /// Intro segment duration in seconds (0-10)
    #[serde(default)]
    pub intro_duration: f64,

    /// Outro segment duration in seconds (0-10)
    #[serde(default)]
    pub outro_duration: f64,

    /// Crossfade audio across scene boundaries
    #[serde(default = "default_true")]
    pub crossfade_audio: bool,
}

fn default_background_color() -> String {
    "black".to_string()
}

fn default_music_volume() -> f64 {
    0.3
}

fn default_true() -> bool {
    true
}

impl Default for CompositionSettings {
    fn default() -> Self {
        Self {
            background_color: default_background_color(),
            background_music: None,
            background_music_volume: default_music_volume(),
            intro_duration: 0.0,
            outro_duration: 0.0,
            crossfade_audio: true,
        }
    }
}

/// Output encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputParams {
    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub quality: VideoQuality,

    /// Frames per second (15-60)
    #[serde(default = "default_fps")]
    pub fps: u8,
}

fn default_fps() -> u8 {
    30
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4,
            quality: VideoQuality::High,
            fps: 30,
        }
    }
}

/// A fully validated, ordered composition plan.
///
/// Built exactly once at job admission and never mutated afterwards. Scene
/// order is the declared request order; nothing downstream may reorder it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timeline {
    pub scenes: Vec<Scene>,
    pub settings: CompositionSettings,
    pub output: OutputParams,
    /// Resolved global background music, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_music_asset: Option<Asset>,
}

impl Timeline {
    /// Sum of scene durations (transition overlap not subtracted).
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sources() {
        assert_eq!(
            SourceSpec::classify("https://example.com/a.jpg"),
            SourceSpec::RemoteUrl("https://example.com/a.jpg".to_string())
        );
        assert_eq!(
            SourceSpec::classify("data:image/png;base64,AAAA"),
            SourceSpec::EmbeddedBase64("data:image/png;base64,AAAA".to_string())
        );
        assert_eq!(
            SourceSpec::classify("uploads/a.jpg"),
            SourceSpec::LocalPath(PathBuf::from("uploads/a.jpg"))
        );
    }

    #[test]
    fn test_extension_allow_lists() {
        assert!(MediaKind::Image.allows_path(Path::new("photo.JPG")));
        assert!(MediaKind::Audio.allows_path(Path::new("track.flac")));
        assert!(!MediaKind::Video.allows_path(Path::new("track.flac")));
        assert!(!MediaKind::Image.allows_path(Path::new("noext")));
    }
}
