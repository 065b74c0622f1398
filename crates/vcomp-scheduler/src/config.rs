//! Scheduler configuration.

use std::path::PathBuf;

use chrono::Duration;
use vcomp_models::Limits;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Request validation limits
    pub limits: Limits,
    /// Directory for resolved media (downloads, decoded payloads)
    pub media_dir: PathBuf,
    /// Scratch directory for per-job intermediates
    pub work_dir: PathBuf,
    /// Directory for finished outputs and previews
    pub output_dir: PathBuf,
    /// Maximum jobs rendering at once
    pub max_concurrent_jobs: usize,
    /// Maximum jobs waiting for a slot
    pub max_queued_jobs: usize,
    /// Time-to-live from job creation
    pub job_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            media_dir: PathBuf::from("/tmp/vcomp/media"),
            work_dir: PathBuf::from("/tmp/vcomp/work"),
            output_dir: PathBuf::from("generated_videos"),
            max_concurrent_jobs: 5,
            max_queued_jobs: 50,
            job_ttl: Duration::hours(24),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limit_defaults = Limits::default();

        Self {
            limits: Limits {
                max_file_size: env_parse("VCOMP_MAX_FILE_SIZE", limit_defaults.max_file_size),
                max_scenes: env_parse("VCOMP_MAX_SCENES", limit_defaults.max_scenes),
                max_scene_duration: env_parse(
                    "VCOMP_MAX_SCENE_SECS",
                    limit_defaults.max_scene_duration,
                ),
                max_total_duration: env_parse(
                    "VCOMP_MAX_TOTAL_SECS",
                    limit_defaults.max_total_duration,
                ),
                default_scene_duration: limit_defaults.default_scene_duration,
            },
            media_dir: env_path("VCOMP_MEDIA_DIR", defaults.media_dir),
            work_dir: env_path("VCOMP_WORK_DIR", defaults.work_dir),
            output_dir: env_path("VCOMP_OUTPUT_DIR", defaults.output_dir),
            max_concurrent_jobs: env_parse(
                "VCOMP_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            ),
            max_queued_jobs: env_parse("VCOMP_MAX_QUEUED_JOBS", defaults.max_queued_jobs),
            job_ttl: Duration::hours(env_parse("VCOMP_JOB_TTL_HOURS", 24)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.max_queued_jobs, 50);
        assert_eq!(config.job_ttl, Duration::hours(24));
        assert_eq!(config.limits.max_scenes, 20);
    }
}
