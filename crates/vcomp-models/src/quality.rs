//! Quality tiers and job priorities.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output quality tier.
///
/// Each tier maps to a fixed encoder preset / CRF pair and a target
/// resolution. The mapping is a static lookup, never constructed at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum VideoQuality {
    #[serde(rename = "480p")]
    Low,
    #[serde(rename = "720p")]
    Medium,
    #[default]
    #[serde(rename = "1080p")]
    High,
    #[serde(rename = "1440p")]
    Ultra,
    #[serde(rename = "2160p")]
    Uhd,
}

impl VideoQuality {
    /// FFmpeg encoder preset for the final encode.
    pub fn preset(&self) -> &'static str {
        match self {
            VideoQuality::Low => "fast",
            VideoQuality::Medium => "medium",
            VideoQuality::High => "slow",
            VideoQuality::Ultra => "slower",
            VideoQuality::Uhd => "veryslow",
        }
    }

    /// Constant Rate Factor for the final encode (lower is better).
    pub fn crf(&self) -> u8 {
        match self {
            VideoQuality::Low => 28,
            VideoQuality::Medium => 23,
            VideoQuality::High => 18,
            VideoQuality::Ultra => 15,
            VideoQuality::Uhd => 12,
        }
    }

    /// Target frame size (width, height), 16:9.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            VideoQuality::Low => (854, 480),
            VideoQuality::Medium => (1280, 720),
            VideoQuality::High => (1920, 1080),
            VideoQuality::Ultra => (2560, 1440),
            VideoQuality::Uhd => (3840, 2160),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::Low => "480p",
            VideoQuality::Medium => "720p",
            VideoQuality::High => "1080p",
            VideoQuality::Ultra => "1440p",
            VideoQuality::Uhd => "2160p",
        }
    }

    pub const ALL: [VideoQuality; 5] = [
        VideoQuality::Low,
        VideoQuality::Medium,
        VideoQuality::High,
        VideoQuality::Ultra,
        VideoQuality::Uhd,
    ];
}

/// Job scheduling priority.
///
/// Derived `Ord` follows declaration order, so `Urgent` compares greatest;
/// the scheduler's wait queue relies on this.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
            JobPriority::Urgent => "urgent",
        }
    }
}
