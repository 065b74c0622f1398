//! Media resolution and FFmpeg render gateway.
//!
//! This crate owns everything that touches bytes: resolving declared media
//! sources into local assets, probing them, and driving FFmpeg to compose a
//! validated timeline into output files.

pub mod command;
pub mod error;
pub mod filters;
pub mod probe;
pub mod render;
pub mod resolve;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{media_duration, probe_media, MediaInfo};
pub use render::{FfmpegGateway, ProgressFn, RenderGateway, RenderOutput};
pub use resolve::{fingerprint_file, MediaResolver};
