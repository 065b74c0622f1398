//! Timeline construction: validate first, then resolve in declared order.

use vcomp_media::MediaResolver;
use vcomp_models::{
    CompositionRequest, Limits, MediaKind, OutputParams, Scene, SourceSpec, Timeline,
};

use crate::error::{SchedulerError, SchedulerResult};

/// Builds a validated [`Timeline`] from an inbound request.
///
/// Every request-level bound is checked before any asset is touched, so a
/// request that would be rejected anyway never causes a download. Scenes
/// resolve strictly in declared order and the first failure aborts the
/// build, identifying the scene index.
pub struct TimelineBuilder {
    resolver: MediaResolver,
    limits: Limits,
}

impl TimelineBuilder {
    pub fn new(resolver: MediaResolver, limits: Limits) -> Self {
        Self { resolver, limits }
    }

    /// Build the timeline, reporting `(scenes_resolved, scenes_total)`.
    pub async fn build<F>(
        &self,
        request: &CompositionRequest,
        progress: F,
    ) -> SchedulerResult<Timeline>
    where
        F: Fn(usize, usize),
    {
        request.validate(&self.limits)?;

        let total = request.scenes.len();
        let mut scenes = Vec::with_capacity(total);

        for (index, spec) in request.scenes.iter().enumerate() {
            let source = SourceSpec::classify(&spec.source);
            let at_scene = |e| SchedulerError::SceneResolution { index, source: e };

            let asset = self
                .resolver
                .resolve(&source, spec.media_kind)
                .await
                .map_err(at_scene)?;

            let voice_asset = match &spec.voiceover {
                Some(raw) => Some(
                    self.resolver
                        .resolve(&SourceSpec::classify(raw), MediaKind::Audio)
                        .await
                        .map_err(at_scene)?,
                ),
                None => None,
            };

            let music_asset = match &spec.background_music {
                Some(raw) => Some(
                    self.resolver
                        .resolve(&SourceSpec::classify(raw), MediaKind::Audio)
                        .await
                        .map_err(at_scene)?,
                ),
                None => None,
            };

            scenes.push(Scene {
                source,
                media_kind: spec.media_kind,
                asset,
                voice_asset,
                music_asset,
                duration: spec.duration.unwrap_or(self.limits.default_scene_duration),
                transition: spec.transition,
                transition_duration: spec.transition_duration,
                audio_settings: spec.audio_settings.clone(),
                video_settings: spec.video_settings.clone(),
                text_overlays: spec.text_overlays.clone(),
                looped: spec.looped,
            });
            progress(index + 1, total);
        }

        let background_music_asset = match &request.composition_settings.background_music {
            Some(raw) => Some(
                self.resolver
                    .resolve(&SourceSpec::classify(raw), MediaKind::Audio)
                    .await?,
            ),
            None => None,
        };

        Ok(Timeline {
            scenes,
            settings: request.composition_settings.clone(),
            output: OutputParams {
                format: request.output_format,
                quality: request.quality,
                fps: request.fps,
            },
            background_music_asset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vcomp_models::{
        AudioSettings, CompositionSettings, JobPriority, OutputFormat, SceneSpec, Transition,
        VideoQuality, VideoSettings,
    };

    fn embedded_image() -> String {
        format!("data:image/png;base64,{}", BASE64.encode([1u8, 2, 3, 4]))
    }

    fn embedded_audio() -> String {
        format!("data:audio/mpeg;base64,{}", BASE64.encode([9u8, 9, 9]))
    }

    fn spec(source: String) -> SceneSpec {
        SceneSpec {
            source,
            media_kind: MediaKind::Image,
            duration: Some(4.0),
            transition: Transition::Fade,
            transition_duration: 0.5,
            voiceover: None,
            background_music: None,
            audio_settings: AudioSettings::default(),
            video_settings: VideoSettings::default(),
            text_overlays: Vec::new(),
            looped: false,
        }
    }

    fn request(scenes: Vec<SceneSpec>) -> CompositionRequest {
        CompositionRequest {
            scenes,
            output_format: OutputFormat::Mp4,
            quality: VideoQuality::High,
            fps: 30,
            priority: JobPriority::Normal,
            composition_settings: CompositionSettings::default(),
            webhook_url: None,
            metadata: HashMap::new(),
        }
    }

    fn builder(dir: &std::path::Path) -> TimelineBuilder {
        TimelineBuilder::new(MediaResolver::new(dir, 1024), Limits::default())
    }

    #[tokio::test]
    async fn test_scenes_resolve_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut second = spec(embedded_image());
        second.voiceover = Some(embedded_audio());
        let req = request(vec![spec(embedded_image()), second]);

        let calls = AtomicUsize::new(0);
        let timeline = builder(dir.path())
            .build(&req, |done, total| {
                assert_eq!(total, 2);
                assert_eq!(done, calls.fetch_add(1, Ordering::SeqCst) + 1);
            })
            .await
            .unwrap();

        assert_eq!(timeline.scene_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(timeline.scenes[0].voice_asset.is_none());
        let voice = timeline.scenes[1].voice_asset.as_ref().unwrap();
        assert_eq!(voice.kind, MediaKind::Audio);
        assert!((timeline.total_duration() - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_validation_precedes_resolution() {
        let dir = tempfile::tempdir().unwrap();
        // fps out of bounds; the unresolvable source must never be touched.
        let mut req = request(vec![spec("/definitely/missing.jpg".to_string())]);
        req.fps = 90;

        let err = builder(dir.path()).build(&req, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(v) if v.field == "fps"));

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolution_failure_names_scene_index() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(vec![
            spec(embedded_image()),
            spec("/definitely/missing.jpg".to_string()),
        ]);

        let err = builder(dir.path()).build(&req, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SceneResolution { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_global_background_music_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(vec![spec(embedded_image())]);
        req.composition_settings.background_music = Some(embedded_audio());

        let timeline = builder(dir.path()).build(&req, |_, _| {}).await.unwrap();
        let music = timeline.background_music_asset.as_ref().unwrap();
        assert_eq!(music.kind, MediaKind::Audio);
    }

    #[tokio::test]
    async fn test_missing_duration_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = spec(embedded_image());
        s.duration = None;
        let timeline = builder(dir.path())
            .build(&request(vec![s]), |_, _| {})
            .await
            .unwrap();
        assert!((timeline.scenes[0].duration - 5.0).abs() < 1e-9);
    }
}
