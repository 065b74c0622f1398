//! FFmpeg filter construction for scene normalization.
//!
//! Everything here is pure string building; the render gateway wires the
//! chains into `-filter_complex` graphs.

use vcomp_models::{AudioEffect, AudioSettings, Scene, TextOverlay, TextPosition, VideoSettings};

/// Fade length used by the fade_in/fade_out audio effects.
const AUDIO_FADE_SECS: f64 = 1.0;

/// Scale-and-pad chain normalizing any input to the target frame.
pub fn normalize_chain(width: u32, height: u32, fps: u8) -> String {
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,\
         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}"
    )
}

/// `eq` filter for brightness/contrast/saturation, `None` at unity.
///
/// The request carries brightness as a multiplier; `eq` wants an additive
/// offset, so 1.0 maps to 0.0.
pub fn eq_filter(settings: &VideoSettings) -> Option<String> {
    let unity = |v: f64| (v - 1.0).abs() < f64::EPSILON;
    if unity(settings.brightness) && unity(settings.contrast) && unity(settings.saturation) {
        return None;
    }
    Some(format!(
        "eq=brightness={:.3}:contrast={:.3}:saturation={:.3}",
        settings.brightness - 1.0,
        settings.contrast,
        settings.saturation
    ))
}

/// Rotation filter. Right angles use lossless `transpose`; anything else
/// falls back to `rotate` with padding to the rotated bounding box.
pub fn rotate_filter(degrees: u16) -> Option<String> {
    match degrees % 360 {
        0 => None,
        90 => Some("transpose=1".to_string()),
        180 => Some("transpose=1,transpose=1".to_string()),
        270 => Some("transpose=2".to_string()),
        other => Some(format!(
            "rotate={other}*PI/180:ow=rotw({other}*PI/180):oh=roth({other}*PI/180)"
        )),
    }
}

/// Full video chain for one scene: user crop/scale, rotation, frame
/// normalization, color adjustment, then text overlays.
pub fn scene_video_chain(scene: &Scene, width: u32, height: u32, fps: u8) -> String {
    let vs = &scene.video_settings;
    let mut steps: Vec<String> = Vec::new();

    if let Some(crop) = &vs.crop {
        steps.push(format!("crop={crop}"));
    }
    if let Some(scale) = &vs.scale {
        steps.push(format!("scale={scale}"));
    }
    if let Some(rotate) = rotate_filter(vs.rotate) {
        steps.push(rotate);
    }
    steps.push(normalize_chain(width, height, fps));
    if let Some(eq) = eq_filter(vs) {
        steps.push(eq);
    }
    for overlay in &scene.text_overlays {
        steps.push(drawtext_filter(overlay, scene.duration));
    }

    steps.join(",")
}

/// `drawtext` filter for a timed overlay.
pub fn drawtext_filter(overlay: &TextOverlay, scene_duration: f64) -> String {
    let (x, y) = position_expr(overlay.position);
    let end = overlay
        .duration
        .map(|d| overlay.start_time + d)
        .unwrap_or(scene_duration);

    let mut parts = vec![
        format!("text='{}'", escape_drawtext(&overlay.text)),
        format!("fontsize={}", overlay.font_size),
        format!("fontcolor={}", overlay.font_color),
        format!("x={x}"),
        format!("y={y}"),
        format!(
            "enable='between(t,{:.3},{:.3})'",
            overlay.start_time, end
        ),
    ];

    if let Some(bg) = &overlay.background_color {
        parts.push("box=1".to_string());
        parts.push(format!("boxcolor={bg}@0.6"));
        parts.push("boxborderw=8".to_string());
    }

    format!("drawtext={}", parts.join(":"))
}

fn position_expr(position: TextPosition) -> (&'static str, &'static str) {
    match position {
        TextPosition::Center => ("(w-text_w)/2", "(h-text_h)/2"),
        TextPosition::Top => ("(w-text_w)/2", "h/10"),
        TextPosition::Bottom => ("(w-text_w)/2", "h-text_h-h/10"),
        TextPosition::Left => ("w/10", "(h-text_h)/2"),
        TextPosition::Right => ("w-text_w-w/10", "(h-text_h)/2"),
    }
}

/// Escape text for embedding inside a single-quoted drawtext argument.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\\\\\'")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// Audio chain for a scene track: trim window, volume, then effects in
/// declared order. Empty when nothing applies.
pub fn audio_chain(settings: &AudioSettings, scene_duration: f64) -> String {
    let mut steps: Vec<String> = Vec::new();

    match (settings.start_time, settings.end_time) {
        (None, None) => {}
        (start, end) => {
            let mut trim = String::from("atrim=");
            let mut args = Vec::new();
            if let Some(s) = start {
                args.push(format!("start={s:.3}"));
            }
            if let Some(e) = end {
                args.push(format!("end={e:.3}"));
            }
            trim.push_str(&args.join(":"));
            steps.push(trim);
            steps.push("asetpts=PTS-STARTPTS".to_string());
        }
    }

    if (settings.volume - 1.0).abs() > f64::EPSILON {
        steps.push(format!("volume={:.3}", settings.volume));
    }

    for effect in &settings.effects {
        match effect {
            AudioEffect::None => {}
            AudioEffect::FadeIn => {
                let d = AUDIO_FADE_SECS.min(scene_duration);
                steps.push(format!("afade=t=in:st=0:d={d:.3}"));
            }
            AudioEffect::FadeOut => {
                let d = AUDIO_FADE_SECS.min(scene_duration);
                let st = (scene_duration - d).max(0.0);
                steps.push(format!("afade=t=out:st={st:.3}:d={d:.3}"));
            }
            AudioEffect::Normalize => steps.push("loudnorm".to_string()),
            AudioEffect::Amplify => steps.push("volume=1.5".to_string()),
            AudioEffect::NoiseReduction => {
                steps.push("highpass=f=200".to_string());
                steps.push("lowpass=f=3000".to_string());
            }
        }
    }

    steps.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcomp_models::{Asset, MediaKind, SourceSpec, Transition};
    use std::path::PathBuf;

    fn scene_with(video_settings: VideoSettings, overlays: Vec<TextOverlay>) -> Scene {
        Scene {
            source: SourceSpec::LocalPath(PathBuf::from("a.jpg")),
            media_kind: MediaKind::Image,
            asset: Asset::new(PathBuf::from("a.jpg"), "00".into(), MediaKind::Image, 1),
            voice_asset: None,
            music_asset: None,
            duration: 5.0,
            transition: Transition::Fade,
            transition_duration: 0.5,
            audio_settings: AudioSettings::default(),
            video_settings,
            text_overlays: overlays,
            looped: false,
        }
    }

    #[test]
    fn test_eq_filter_skipped_at_unity() {
        assert!(eq_filter(&VideoSettings::default()).is_none());
        let brighter = VideoSettings {
            brightness: 1.2,
            ..Default::default()
        };
        assert_eq!(
            eq_filter(&brighter).unwrap(),
            "eq=brightness=0.200:contrast=1.000:saturation=1.000"
        );
    }

    #[test]
    fn test_rotate_right_angles_use_transpose() {
        assert_eq!(rotate_filter(0), None);
        assert_eq!(rotate_filter(90).unwrap(), "transpose=1");
        assert_eq!(rotate_filter(270).unwrap(), "transpose=2");
        assert!(rotate_filter(45).unwrap().starts_with("rotate=45"));
    }

    #[test]
    fn test_scene_chain_always_normalizes() {
        let chain = scene_video_chain(&scene_with(VideoSettings::default(), vec![]), 1920, 1080, 30);
        assert!(chain.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(chain.contains("fps=30"));
        assert!(!chain.contains("drawtext"));
    }

    #[test]
    fn test_drawtext_window_defaults_to_scene_remainder() {
        let overlay = TextOverlay {
            text: "Hello: it's 100%".to_string(),
            position: TextPosition::Bottom,
            font_size: 32,
            font_color: "white".to_string(),
            background_color: Some("black".to_string()),
            start_time: 1.0,
            duration: None,
        };
        let f = drawtext_filter(&overlay, 5.0);
        assert!(f.contains("enable='between(t,1.000,5.000)'"));
        assert!(f.contains("y=h-text_h-h/10"));
        assert!(f.contains("box=1"));
        assert!(f.contains("\\:"));
        assert!(f.contains("\\%"));
    }

    #[test]
    fn test_audio_chain_order() {
        let settings = AudioSettings {
            volume: 0.8,
            effects: vec![AudioEffect::FadeIn, AudioEffect::Normalize],
            start_time: Some(1.0),
            end_time: Some(6.0),
        };
        let chain = audio_chain(&settings, 5.0);
        assert_eq!(
            chain,
            "atrim=start=1.000:end=6.000,asetpts=PTS-STARTPTS,volume=0.800,\
             afade=t=in:st=0:d=1.000,loudnorm"
        );
    }

    #[test]
    fn test_audio_chain_empty_for_defaults() {
        assert!(audio_chain(&AudioSettings::default(), 5.0).is_empty());
    }
}
