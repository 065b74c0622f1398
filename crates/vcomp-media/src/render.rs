//! Render gateway: turns a validated timeline into output and preview files.
//!
//! The FFmpeg implementation works in three passes. Each scene is first
//! normalized into an intermediate clip at the target frame size and frame
//! rate, with its own audio track (voiceover, source audio, per-scene music,
//! or synthesized silence). The intermediates are then assembled into a
//! mezzanine with the declared transitions, intro/outro segments, and global
//! background music. The preview is encoded from the mezzanine before the
//! final encode so callers get something viewable even if the last pass dies.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use vcomp_models::{Asset, MediaKind, OutputFormat, Scene, Timeline, Transition};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{audio_chain, scene_video_chain};
use crate::probe::probe_media;
use crate::resolve::fingerprint_file;

/// Preview clip length in seconds.
const PREVIEW_SECS: f64 = 10.0;
/// Preview frame rate.
const PREVIEW_FPS: u8 = 15;
/// Preview CRF (quality over speed does not matter here).
const PREVIEW_CRF: u8 = 28;
/// Intermediate/mezzanine encode settings: near-lossless, fast.
const MEZZANINE_PRESET: &str = "veryfast";
const MEZZANINE_CRF: u8 = 18;
const SILENT_AUDIO: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Progress band boundaries reported by the gateway.
const PROGRESS_SCENES_START: u8 = 40;
const PROGRESS_SCENES_END: u8 = 80;
const PROGRESS_PREVIEW_DONE: u8 = 90;
const PROGRESS_FINAL_DONE: u8 = 100;

/// Progress sink invoked with values in 40..=100.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Result of a completed render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub output: Asset,
    pub preview: Asset,
    pub duration_seconds: f64,
}

/// Render engine abstraction, object-safe for scheduler injection.
#[async_trait]
pub trait RenderGateway: Send + Sync {
    async fn render(
        &self,
        timeline: &Timeline,
        job_id: &str,
        progress: ProgressFn,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<RenderOutput>;
}

/// FFmpeg-backed gateway. Never retries; engine failures surface with a
/// stderr tail attached.
#[derive(Debug, Clone)]
pub struct FfmpegGateway {
    work_dir: PathBuf,
    output_dir: PathBuf,
}

/// One normalized intermediate with its measured duration.
struct Clip {
    path: PathBuf,
    duration: f64,
    transition: Transition,
    transition_duration: f64,
}

impl FfmpegGateway {
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Normalize one scene into an intermediate clip.
    async fn normalize_scene(
        &self,
        index: usize,
        scene: &Scene,
        width: u32,
        height: u32,
        fps: u8,
        background_color: &str,
        job_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<Clip> {
        let out = job_dir.join(format!("scene_{index:03}.mp4"));
        let mut cmd = FfmpegCommand::new(&out);
        let mut next_input = 0usize;

        // Primary visual input. Audio-only scenes render over a solid
        // background; image scenes loop the still for the scene duration.
        let video_input = next_input;
        let source_info = match scene.media_kind {
            MediaKind::Image => {
                cmd = cmd.input_with_args(["-loop", "1"], &scene.asset.path);
                None
            }
            MediaKind::Video => {
                let info = probe_media(&scene.asset.path).await?;
                if scene.looped && info.duration > 0.0 && info.duration < scene.duration {
                    cmd = cmd.input_with_args(["-stream_loop", "-1"], &scene.asset.path);
                } else {
                    cmd = cmd.input(&scene.asset.path);
                }
                Some(info)
            }
            MediaKind::Audio => {
                cmd = cmd.lavfi(format!(
                    "color=c={background_color}:size={width}x{height}:rate={fps}"
                ));
                None
            }
        };
        next_input += 1;

        // Audio sources feeding this clip, each with its own filter chain.
        let mut sources: Vec<(String, String)> = Vec::new();
        let chain = audio_chain(&scene.audio_settings, scene.duration);

        match scene.media_kind {
            MediaKind::Audio => {
                cmd = cmd.input(&scene.asset.path);
                sources.push((format!("{next_input}:a"), chain.clone()));
                next_input += 1;
            }
            MediaKind::Video => {
                if source_info.as_ref().is_some_and(|i| i.has_audio) {
                    sources.push((format!("{video_input}:a"), chain.clone()));
                }
            }
            MediaKind::Image => {}
        }

        if let Some(voice) = &scene.voice_asset {
            cmd = cmd.input(&voice.path);
            sources.push((format!("{next_input}:a"), chain.clone()));
            next_input += 1;
        }

        if let Some(music) = &scene.music_asset {
            cmd = cmd.input_with_args(["-stream_loop", "-1"], &music.path);
            sources.push((format!("{next_input}:a"), "volume=0.300".to_string()));
            next_input += 1;
        }

        if sources.is_empty() {
            cmd = cmd.lavfi(SILENT_AUDIO);
            sources.push((format!("{next_input}:a"), String::new()));
        }

        let mut graph = vec![format!(
            "[{video_input}:v]{}[v]",
            scene_video_chain(scene, width, height, fps)
        )];
        let audio_map = build_audio_mix(&mut graph, &sources);

        let cmd = cmd
            .filter_complex(graph.join(";"))
            .map("[v]")
            .map(audio_map)
            .video_codec("libx264")
            .preset(MEZZANINE_PRESET)
            .crf(MEZZANINE_CRF)
            .pix_fmt("yuv420p")
            .audio_codec("aac")
            .audio_bitrate("192k")
            .duration(scene.duration);

        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run(&cmd)
            .await?;

        // Measure the real duration: a non-looped video shorter than its
        // declared duration yields a shorter clip, and transition offsets
        // must follow the clips as built.
        let duration = probe_media(&out).await?.duration;
        debug!(index, duration, path = %out.display(), "Normalized scene");

        Ok(Clip {
            path: out,
            duration,
            transition: scene.transition,
            transition_duration: scene.transition_duration,
        })
    }

    /// Render a solid-color segment with silent audio (intro/outro).
    async fn color_clip(
        &self,
        name: &str,
        duration: f64,
        color: &str,
        width: u32,
        height: u32,
        fps: u8,
        job_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<Clip> {
        let out = job_dir.join(format!("{name}.mp4"));
        let cmd = FfmpegCommand::new(&out)
            .lavfi(format!("color=c={color}:size={width}x{height}:rate={fps}"))
            .lavfi(SILENT_AUDIO)
            .video_codec("libx264")
            .preset(MEZZANINE_PRESET)
            .crf(MEZZANINE_CRF)
            .pix_fmt("yuv420p")
            .audio_codec("aac")
            .duration(duration);

        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run(&cmd)
            .await?;

        Ok(Clip {
            path: out,
            duration,
            transition: Transition::Cut,
            transition_duration: 0.0,
        })
    }

    /// Assemble intermediates into the mezzanine.
    async fn assemble(
        &self,
        clips: &[Clip],
        timeline: &Timeline,
        job_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        let music = timeline.background_music_asset.as_ref();

        // A single segment with no music mix passes through untouched.
        if clips.len() == 1 && music.is_none() {
            return Ok(clips[0].path.clone());
        }

        let out = job_dir.join("mezzanine.mp4");
        let mut cmd = FfmpegCommand::new(&out);
        for clip in clips {
            cmd = cmd.input(&clip.path);
        }

        let music_mix = if let Some(asset) = music {
            cmd = cmd.input_with_args(["-stream_loop", "-1"], &asset.path);
            Some((clips.len(), timeline.settings.background_music_volume))
        } else {
            None
        };

        let plans: Vec<SegmentPlan> = clips
            .iter()
            .map(|c| SegmentPlan {
                duration: c.duration,
                transition: c.transition,
                transition_duration: c.transition_duration,
            })
            .collect();
        let (graph, video_map, audio_map) =
            assembly_graph(&plans, timeline.settings.crossfade_audio, music_mix);

        let mut cmd = cmd
            .map(video_map)
            .map(audio_map)
            .video_codec("libx264")
            .preset(MEZZANINE_PRESET)
            .crf(MEZZANINE_CRF)
            .pix_fmt("yuv420p")
            .audio_codec("aac")
            .audio_bitrate("192k");
        if !graph.is_empty() {
            cmd = cmd.filter_complex(graph);
        }

        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run(&cmd)
            .await?;
        Ok(out)
    }

    /// Encode the short preview from the mezzanine.
    async fn encode_preview(
        &self,
        mezzanine: &Path,
        job_id: &str,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        let out = self.output_dir.join(format!("{job_id}_preview.mp4"));
        let cmd = FfmpegCommand::new(&out)
            .input(mezzanine)
            .duration(PREVIEW_SECS)
            .video_codec("libx264")
            .preset("ultrafast")
            .crf(PREVIEW_CRF)
            .fps(PREVIEW_FPS)
            .pix_fmt("yuv420p")
            .audio_codec("aac")
            .audio_bitrate("128k")
            .output_args(["-movflags", "+faststart"]);

        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run(&cmd)
            .await?;
        Ok(out)
    }

    /// Final encode at the requested tier, fps, and container.
    async fn encode_final(
        &self,
        mezzanine: &Path,
        timeline: &Timeline,
        job_id: &str,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        let params = &timeline.output;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let out = self
            .output_dir
            .join(format!("{job_id}_{stamp}.{}", params.format.extension()));

        let cmd = FfmpegCommand::new(&out).input(mezzanine).fps(params.fps);
        let cmd = match params.format {
            OutputFormat::Webm => cmd
                .video_codec("libvpx-vp9")
                .crf(params.quality.crf())
                .output_args(["-b:v", "0"])
                .audio_codec("libopus")
                .audio_bitrate("128k"),
            format => {
                let cmd = cmd
                    .video_codec("libx264")
                    .preset(params.quality.preset())
                    .crf(params.quality.crf())
                    .pix_fmt("yuv420p")
                    .audio_codec("aac")
                    .audio_bitrate("192k");
                if format == OutputFormat::Mp4 {
                    cmd.output_args(["-movflags", "+faststart"])
                } else {
                    cmd
                }
            }
        };

        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run(&cmd)
            .await?;
        Ok(out)
    }
}

#[async_trait]
impl RenderGateway for FfmpegGateway {
    async fn render(
        &self,
        timeline: &Timeline,
        job_id: &str,
        progress: ProgressFn,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<RenderOutput> {
        check_ffmpeg()?;

        let job_dir = self.work_dir.join(job_id);
        tokio::fs::create_dir_all(&job_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let (width, height) = timeline.output.quality.resolution();
        let fps = timeline.output.fps;
        let settings = &timeline.settings;
        progress(PROGRESS_SCENES_START);

        let mut clips: Vec<Clip> = Vec::new();
        if settings.intro_duration > 0.0 {
            clips.push(
                self.color_clip(
                    "intro",
                    settings.intro_duration,
                    &settings.background_color,
                    width,
                    height,
                    fps,
                    &job_dir,
                    &cancel,
                )
                .await?,
            );
        }

        let span = PROGRESS_SCENES_END - PROGRESS_SCENES_START;
        let total = timeline.scenes.len() as u32;
        for (i, scene) in timeline.scenes.iter().enumerate() {
            if *cancel.borrow() {
                return Err(MediaError::Cancelled);
            }
            clips.push(
                self.normalize_scene(
                    i,
                    scene,
                    width,
                    height,
                    fps,
                    &settings.background_color,
                    &job_dir,
                    &cancel,
                )
                .await?,
            );
            let done = (i + 1) as u32;
            progress(PROGRESS_SCENES_START + (span as u32 * done / total) as u8);
        }

        if settings.outro_duration > 0.0 {
            clips.push(
                self.color_clip(
                    "outro",
                    settings.outro_duration,
                    &settings.background_color,
                    width,
                    height,
                    fps,
                    &job_dir,
                    &cancel,
                )
                .await?,
            );
        }

        let mezzanine = self.assemble(&clips, timeline, &job_dir, &cancel).await?;
        progress(PROGRESS_SCENES_END);

        let preview_path = self.encode_preview(&mezzanine, job_id, &cancel).await?;
        progress(PROGRESS_PREVIEW_DONE);

        let output_path = self
            .encode_final(&mezzanine, timeline, job_id, &cancel)
            .await?;
        progress(PROGRESS_FINAL_DONE);

        let info = probe_media(&output_path).await?;
        let output_size = tokio::fs::metadata(&output_path).await?.len();
        let preview_size = tokio::fs::metadata(&preview_path).await?.len();
        let output_fp = fingerprint_file(&output_path).await?;
        let preview_fp = fingerprint_file(&preview_path).await?;

        // Intermediates are per-job scratch; the outputs live elsewhere.
        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            debug!(job_id, "Failed to clean work dir: {}", e);
        }

        info!(
            job_id,
            output = %output_path.display(),
            duration = info.duration,
            size_bytes = output_size,
            "Render complete"
        );

        Ok(RenderOutput {
            output: Asset::new(output_path, output_fp, MediaKind::Video, output_size),
            preview: Asset::new(preview_path, preview_fp, MediaKind::Video, preview_size),
            duration_seconds: info.duration,
        })
    }
}

/// Route audio sources through their chains and mix them down to one label.
/// Returns the `-map` argument for the mixed track.
fn build_audio_mix(graph: &mut Vec<String>, sources: &[(String, String)]) -> String {
    if sources.len() == 1 {
        let (label, chain) = &sources[0];
        if chain.is_empty() {
            return label.clone();
        }
        graph.push(format!("[{label}]{chain}[a]"));
        return "[a]".to_string();
    }

    let mut mixed = String::new();
    for (i, (label, chain)) in sources.iter().enumerate() {
        let chain = if chain.is_empty() { "anull" } else { chain };
        graph.push(format!("[{label}]{chain}[s{i}]"));
        mixed.push_str(&format!("[s{i}]"));
    }
    graph.push(format!(
        "{mixed}amix=inputs={}:duration=first:dropout_transition=0[a]",
        sources.len()
    ));
    "[a]".to_string()
}

/// Boundary plan for one assembly segment.
struct SegmentPlan {
    duration: f64,
    /// Transition at this segment's leading boundary (ignored for the first).
    transition: Transition,
    transition_duration: f64,
}

/// Build the assembly filter graph over N segment inputs.
///
/// Offsets are a pure function of the accumulated output duration: each
/// xfade starts `transition_duration` before the end of the accumulated
/// stream, and each crossfade shortens the total by that overlap. Returns
/// (graph, video map, audio map); the graph is empty for a single segment
/// with no music.
fn assembly_graph(
    segments: &[SegmentPlan],
    crossfade_audio: bool,
    music: Option<(usize, f64)>,
) -> (String, String, String) {
    let mut parts: Vec<String> = Vec::new();
    let mut video = "[0:v]".to_string();
    let mut audio = "[0:a]".to_string();
    let mut elapsed = segments.first().map(|s| s.duration).unwrap_or(0.0);

    for (i, seg) in segments.iter().enumerate().skip(1) {
        let video_out = format!("[v{i}]");
        let audio_out = format!("[a{i}]");

        match seg.transition.xfade_name() {
            None => {
                parts.push(format!("{video}[{i}:v]concat=n=2:v=1:a=0{video_out}"));
                parts.push(format!("{audio}[{i}:a]concat=n=2:v=0:a=1{audio_out}"));
                elapsed += seg.duration;
            }
            Some(name) => {
                let overlap = seg
                    .transition_duration
                    .min(seg.duration)
                    .min(elapsed)
                    .max(0.0);
                let offset = elapsed - overlap;
                parts.push(format!(
                    "{video}[{i}:v]xfade=transition={name}:duration={overlap:.3}:offset={offset:.3}{video_out}"
                ));
                if crossfade_audio {
                    parts.push(format!("{audio}[{i}:a]acrossfade=d={overlap:.3}{audio_out}"));
                } else {
                    // Keep the audio length matched to the shortened video
                    // by trimming the overlap off the incoming track.
                    parts.push(format!(
                        "[{i}:a]atrim=start={overlap:.3},asetpts=PTS-STARTPTS[at{i}]"
                    ));
                    parts.push(format!("{audio}[at{i}]concat=n=2:v=0:a=1{audio_out}"));
                }
                elapsed += seg.duration - overlap;
            }
        }

        video = video_out;
        audio = audio_out;
    }

    if let Some((index, volume)) = music {
        parts.push(format!("[{index}:a]volume={volume:.3}[bgm]"));
        parts.push(format!(
            "{audio}[bgm]amix=inputs=2:duration=first:dropout_transition=0[amixed]"
        ));
        audio = "[amixed]".to_string();
    }

    let video_map = if video == "[0:v]" { "0:v".to_string() } else { video };
    let audio_map = if audio == "[0:a]" { "0:a".to_string() } else { audio };
    (parts.join(";"), video_map, audio_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(duration: f64, transition: Transition, td: f64) -> SegmentPlan {
        SegmentPlan {
            duration,
            transition,
            transition_duration: td,
        }
    }

    #[test]
    fn test_xfade_offsets_accumulate_with_overlap() {
        let segments = vec![
            seg(5.0, Transition::Cut, 0.0),
            seg(4.0, Transition::Fade, 1.0),
            seg(3.0, Transition::SlideLeft, 0.5),
        ];
        let (graph, vmap, amap) = assembly_graph(&segments, true, None);

        // First boundary: offset 5-1=4. Second: elapsed 5+4-1=8, offset 7.5.
        assert!(graph.contains("xfade=transition=fade:duration=1.000:offset=4.000"));
        assert!(graph.contains("xfade=transition=slideleft:duration=0.500:offset=7.500"));
        assert!(graph.contains("acrossfade=d=1.000"));
        assert_eq!(vmap, "[v2]");
        assert_eq!(amap, "[a2]");
    }

    #[test]
    fn test_cut_uses_concat() {
        let segments = vec![seg(5.0, Transition::Cut, 0.0), seg(5.0, Transition::Cut, 0.5)];
        let (graph, _, _) = assembly_graph(&segments, true, None);
        assert!(graph.contains("concat=n=2:v=1:a=0"));
        assert!(graph.contains("concat=n=2:v=0:a=1"));
        assert!(!graph.contains("xfade"));
    }

    #[test]
    fn test_no_audio_crossfade_trims_overlap() {
        let segments = vec![seg(5.0, Transition::Cut, 0.0), seg(4.0, Transition::Fade, 1.0)];
        let (graph, _, _) = assembly_graph(&segments, false, None);
        assert!(graph.contains("atrim=start=1.000"));
        assert!(!graph.contains("acrossfade"));
    }

    #[test]
    fn test_overlap_clamped_to_segment_durations() {
        let segments = vec![seg(0.5, Transition::Cut, 0.0), seg(4.0, Transition::Fade, 2.0)];
        let (graph, _, _) = assembly_graph(&segments, true, None);
        // Overlap cannot exceed the accumulated 0.5 s.
        assert!(graph.contains("duration=0.500:offset=0.000"));
    }

    #[test]
    fn test_background_music_mix_appended() {
        let segments = vec![seg(5.0, Transition::Cut, 0.0)];
        let (graph, vmap, amap) = assembly_graph(&segments, true, Some((1, 0.3)));
        assert!(graph.contains("[1:a]volume=0.300[bgm]"));
        assert!(graph.contains("amix=inputs=2:duration=first"));
        assert_eq!(vmap, "0:v");
        assert_eq!(amap, "[amixed]");
    }

    #[test]
    fn test_single_segment_maps_inputs_directly() {
        let segments = vec![seg(5.0, Transition::Fade, 0.5)];
        let (graph, vmap, amap) = assembly_graph(&segments, true, None);
        assert!(graph.is_empty());
        assert_eq!(vmap, "0:v");
        assert_eq!(amap, "0:a");
    }

    #[test]
    fn test_audio_mix_single_source_passthrough() {
        let mut graph = Vec::new();
        let map = build_audio_mix(&mut graph, &[("1:a".to_string(), String::new())]);
        assert_eq!(map, "1:a");
        assert!(graph.is_empty());
    }

    #[test]
    fn test_audio_mix_multiple_sources() {
        let mut graph = Vec::new();
        let sources = vec![
            ("0:a".to_string(), "volume=0.800".to_string()),
            ("1:a".to_string(), String::new()),
        ];
        let map = build_audio_mix(&mut graph, &sources);
        assert_eq!(map, "[a]");
        assert_eq!(graph[0], "[0:a]volume=0.800[s0]");
        assert_eq!(graph[1], "[1:a]anull[s1]");
        assert!(graph[2].contains("amix=inputs=2"));
    }
}
