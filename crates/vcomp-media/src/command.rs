//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// How many trailing stderr lines to attach to a failure.
const STDERR_TAIL_LINES: usize = 20;

/// One `-i` input with its preceding arguments.
#[derive(Debug, Clone)]
struct Input {
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Input>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command targeting the given output file.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add a plain file input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(std::iter::empty::<String>(), path)
    }

    /// Add a file input with arguments placed before its `-i`.
    pub fn input_with_args<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            args: args.into_iter().map(Into::into).collect(),
            source: path.as_ref().to_string_lossy().to_string(),
        });
        self
    }

    /// Add a synthetic `lavfi` input (color backgrounds, silent audio).
    pub fn lavfi(mut self, spec: impl Into<String>) -> Self {
        self.inputs.push(Input {
            args: vec!["-f".to_string(), "lavfi".to_string()],
            source: spec.into(),
        });
        self
    }

    /// Add an output argument (after all inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the filter graph.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set encoder preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set output frame rate.
    pub fn fps(self, fps: u8) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Set pixel format.
    pub fn pix_fmt(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(fmt)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Cap the output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{seconds:.3}"))
    }

    /// Stop at the shortest input.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Build the full argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.clone());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runner for FFmpeg commands with cooperative cancellation.
#[derive(Default)]
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process when the watched flag flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run the command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Collect a stderr tail so failures carry the engine's diagnosis.
        let stderr = child.stderr.take();
        let tail_handle = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
            tail
        });

        let status = if let Some(mut cancel_rx) = self.cancel_rx.clone() {
            tokio::select! {
                status = child.wait() => status?,
                _ = cancelled(&mut cancel_rx) => {
                    info!("FFmpeg cancelled, killing process");
                    let _ = child.kill().await;
                    let _ = tail_handle.await;
                    return Err(MediaError::Cancelled);
                }
            }
        } else {
            child.wait().await?
        };

        let tail = tail_handle.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let stderr = (!tail.is_empty()).then(|| tail.join("\n"));
            Err(MediaError::render_failed(
                format!("FFmpeg exited with status {status}"),
                stderr,
            ))
        }
    }
}

/// Resolve once the flag is true; pends forever otherwise.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling; never resolve.
            std::future::pending::<()>().await;
        }
    }
}

/// Check that FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_input_ordering() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input_with_args(["-loop", "1", "-t", "5.000"], "slide.png")
            .input("voice.mp3")
            .filter_complex("[0:v]scale=1920:1080[v]")
            .map("[v]")
            .map("1:a")
            .video_codec("libx264")
            .crf(18);

        let args = cmd.build_args();
        let first_i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[first_i + 1], "slide.png");
        assert!(args.iter().position(|a| a == "-loop").unwrap() < first_i);
        assert!(args.contains(&"voice.mp3".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_lavfi_input() {
        let cmd = FfmpegCommand::new("out.mp4").lavfi("color=c=black:size=1920x1080:d=2");
        let args = cmd.build_args();
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "lavfi");
    }

    #[test]
    fn test_overwrite_and_log_level_lead() {
        let args = FfmpegCommand::new("out.mp4").input("in.mp4").build_args();
        assert_eq!(args[0], "-y");
        assert_eq!(args[1], "-v");
        assert_eq!(args[2], "error");
    }
}
