//! Subtitle composition and ASS script rendering.

use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

use shorts_models::{
    seconds_to_timecode, Scene, StyleName, SubtitleCue, SubtitleStyle, SubtitleTrack,
    DEFAULT_FALLBACK_DURATION_SECS,
};

use crate::error::{MediaError, MediaResult};

/// ASS `Name` field marking cues built from fallback timing.
pub const DEGRADED_CUE_NAME: &str = "degraded";

/// Subtitle layout configuration.
#[derive(Debug, Clone)]
pub struct SubtitleConfig {
    /// Words per caption line
    pub words_per_cue: usize,
    pub font_name: String,
    pub play_res_x: u32,
    pub play_res_y: u32,
    /// Duration assumed for scenes without a measured duration
    pub fallback_duration_secs: f64,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            words_per_cue: 3,
            font_name: "Pretendard".to_string(),
            play_res_x: 1080,
            play_res_y: 1920,
            fallback_duration_secs: DEFAULT_FALLBACK_DURATION_SECS,
        }
    }
}

impl SubtitleConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            words_per_cue: std::env::var("SUBTITLE_WORDS_PER_CUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(d.words_per_cue),
            font_name: std::env::var("SUBTITLE_FONT").unwrap_or(d.font_name),
            play_res_x: std::env::var("TARGET_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.play_res_x),
            play_res_y: std::env::var("TARGET_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.play_res_y),
            fallback_duration_secs: std::env::var("FALLBACK_SCENE_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.fallback_duration_secs),
        }
    }
}

/// Builds one subtitle track per campaign from aligned scenes.
#[derive(Debug, Clone, Default)]
pub struct SubtitleComposer {
    config: SubtitleConfig,
}

impl SubtitleComposer {
    pub fn new(config: SubtitleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SubtitleConfig {
        &self.config
    }

    /// Turn scenes into timed cues with a running cumulative offset.
    ///
    /// Scenes must be in timeline order with strictly increasing indices.
    /// Every scene advances the offset by its duration, including scenes
    /// without text.
    pub fn compose(&self, scenes: &[Scene]) -> MediaResult<SubtitleTrack> {
        let chunk_size = self.config.words_per_cue.max(1);
        let mut cues = Vec::new();
        let mut cumulative = 0.0_f64;
        let mut previous: Option<u32> = None;

        for scene in scenes {
            if let Some(prev) = previous {
                if scene.index <= prev {
                    return Err(MediaError::subtitle_failed(format!(
                        "scene {} follows scene {}; scenes must stay in timeline order",
                        scene.index, prev
                    )));
                }
            }
            previous = Some(scene.index);

            let duration = scene.duration_or(self.config.fallback_duration_secs);
            let scene_end = cumulative + duration;

            if !scene.has_text() {
                cumulative = scene_end;
                continue;
            }

            let style = if scene.emotion.is_high_energy() {
                StyleName::Highlight
            } else {
                StyleName::Default
            };
            let degraded = scene.alignment_degraded();

            if scene.word_timestamps.len() >= 2 {
                let chunks: Vec<_> = scene.word_timestamps.chunks(chunk_size).collect();
                let texts: Vec<String> = if degraded {
                    spread_text(&scene.text, chunks.len())
                } else {
                    chunks
                        .iter()
                        .map(|chunk| {
                            chunk
                                .iter()
                                .map(|w| w.word.as_str())
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect()
                };

                for (chunk, text) in chunks.iter().zip(texts) {
                    if text.trim().is_empty() {
                        continue;
                    }
                    // Non-empty by construction of `chunks`
                    let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
                        continue;
                    };
                    let start = (cumulative + first.start_sec).clamp(cumulative, scene_end);
                    let end = (cumulative + last.end_sec).clamp(start, scene_end);
                    cues.push(SubtitleCue {
                        start_sec: start,
                        end_sec: end,
                        style,
                        text,
                        scene_index: scene.index,
                        degraded,
                    });
                }
            } else {
                cues.push(SubtitleCue {
                    start_sec: cumulative,
                    end_sec: scene_end,
                    style,
                    text: scene.text.trim().to_string(),
                    scene_index: scene.index,
                    degraded,
                });
            }

            cumulative = scene_end;
        }

        let track = SubtitleTrack {
            play_res_x: self.config.play_res_x,
            play_res_y: self.config.play_res_y,
            styles: vec![
                SubtitleStyle::default_style(&self.config.font_name),
                SubtitleStyle::highlight_style(&self.config.font_name),
            ],
            cues,
        };

        if !track.is_monotonic() {
            return Err(MediaError::subtitle_failed(
                "cue start times are not monotonic",
            ));
        }

        let degraded = track.degraded_cue_count();
        if degraded > 0 {
            warn!(
                "{} of {} subtitle cues use fallback timing",
                degraded,
                track.cues.len()
            );
        }
        debug!(
            "Composed {} subtitle cues over {:.2}s",
            track.cues.len(),
            cumulative
        );

        Ok(track)
    }
}

/// Render and write the track as an `.ass` script.
pub async fn write_ass(track: &SubtitleTrack, path: &Path) -> MediaResult<()> {
    tokio::fs::write(path, render_ass(track)).await?;
    Ok(())
}

/// Split `text` into `parts` runs of whitespace-separated words, as evenly
/// as possible. Runs may be empty when there are fewer words than parts.
fn spread_text(text: &str, parts: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let parts = parts.max(1);
    (0..parts)
        .map(|i| {
            let from = i * words.len() / parts;
            let to = (i + 1) * words.len() / parts;
            words[from..to].join(" ")
        })
        .collect()
}

/// Make cue text safe for a Dialogue line.
fn sanitize_text(text: &str) -> String {
    text.trim()
        .replace("\r\n", "\n")
        .replace('\n', "\\N")
        .replace(['{', '}'], "")
}

fn ass_bool(v: bool) -> i32 {
    if v {
        -1
    } else {
        0
    }
}

/// Render a track as an Advanced SubStation Alpha script.
pub fn render_ass(track: &SubtitleTrack) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "[Script Info]");
    let _ = writeln!(out, "Title: Shorts Subtitle");
    let _ = writeln!(out, "ScriptType: v4.00+");
    let _ = writeln!(out, "PlayResX: {}", track.play_res_x);
    let _ = writeln!(out, "PlayResY: {}", track.play_res_y);
    let _ = writeln!(out, "WrapStyle: 0");
    let _ = writeln!(out, "ScaledBorderAndShadow: yes");
    let _ = writeln!(out);

    let _ = writeln!(out, "[V4+ Styles]");
    let _ = writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    for style in &track.styles {
        let _ = writeln!(
            out,
            "Style: {},{},{},{},&H000000FF,{},{},{},0,0,0,100,100,1,0,1,{},{},{},{},{},{},1",
            style.name,
            style.font_name,
            style.font_size,
            style.primary_color,
            style.outline_color,
            style.back_color,
            ass_bool(style.bold),
            style.outline,
            style.shadow,
            style.alignment,
            style.margin_h,
            style.margin_h,
            style.margin_v,
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "[Events]");
    let _ = writeln!(
        out,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );
    for cue in &track.cues {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},{},{},0,0,0,,{}",
            seconds_to_timecode(cue.start_sec),
            seconds_to_timecode(cue.end_sec),
            cue.style,
            if cue.degraded { DEGRADED_CUE_NAME } else { "" },
            sanitize_text(&cue.text),
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorts_models::{AlignmentSource, EmotionTag, WordTimestamp};

    fn scene(index: u32, text: &str, duration: f64, words: &[(&str, f64, f64)]) -> Scene {
        let mut s = Scene::new(index, text, EmotionTag::Friendly);
        s.measured_duration = Some(duration);
        s.word_timestamps = words
            .iter()
            .map(|(w, a, b)| WordTimestamp::new(*w, *a, *b))
            .collect();
        s.alignment_source = Some(AlignmentSource::Model);
        s
    }

    #[test]
    fn test_second_scene_is_offset_by_first_duration() {
        let scenes = vec![
            scene(0, "one two", 2.5, &[("one", 0.0, 0.4), ("two", 0.5, 1.0)]),
            scene(1, "three four", 3.0, &[("three", 0.0, 0.6), ("four", 0.7, 1.2)]),
        ];

        let track = SubtitleComposer::default().compose(&scenes).unwrap();
        assert_eq!(track.cues.len(), 2);
        assert_eq!(track.cues[0].start_sec, 0.0);
        assert_eq!(track.cues[1].start_sec, 2.5);
        assert_eq!(track.cues[1].text, "three four");
    }

    #[test]
    fn test_chunks_never_exceed_configured_size() {
        let words: Vec<(&str, f64, f64)> = (0..7)
            .map(|i| ("w", i as f64 * 0.3, i as f64 * 0.3 + 0.25))
            .collect();
        let scenes = vec![scene(0, "w w w w w w w", 3.0, &words)];

        let track = SubtitleComposer::default().compose(&scenes).unwrap();
        assert_eq!(track.cues.len(), 3);
        for cue in &track.cues {
            assert!(cue.text.split_whitespace().count() <= 3);
        }
        assert!(track.is_monotonic());
    }

    #[test]
    fn test_single_word_scene_spans_whole_duration() {
        let scenes = vec![scene(0, "Hello", 1.75, &[("Hello", 0.1, 0.6)])];
        let track = SubtitleComposer::default().compose(&scenes).unwrap();
        assert_eq!(track.cues.len(), 1);
        assert_eq!(track.cues[0].start_sec, 0.0);
        assert_eq!(track.cues[0].end_sec, 1.75);
        assert_eq!(track.cues[0].text, "Hello");
    }

    #[test]
    fn test_blank_scene_advances_offset_without_cue() {
        let scenes = vec![
            scene(0, "   ", 2.0, &[]),
            scene(1, "after", 1.0, &[]),
        ];
        let track = SubtitleComposer::default().compose(&scenes).unwrap();
        assert_eq!(track.cues.len(), 1);
        assert_eq!(track.cues[0].start_sec, 2.0);
    }

    #[test]
    fn test_missing_duration_uses_fallback() {
        let mut first = scene(0, "x", 1.0, &[]);
        first.measured_duration = None;
        let scenes = vec![first, scene(1, "y", 1.0, &[])];

        let track = SubtitleComposer::default().compose(&scenes).unwrap();
        assert_eq!(track.cues[1].start_sec, DEFAULT_FALLBACK_DURATION_SECS);
    }

    #[test]
    fn test_out_of_order_scenes_fail() {
        let scenes = vec![scene(1, "b", 1.0, &[]), scene(0, "a", 1.0, &[])];
        let err = SubtitleComposer::default().compose(&scenes).unwrap_err();
        assert!(matches!(err, MediaError::SubtitleFailed(_)));
    }

    #[test]
    fn test_high_energy_uses_highlight() {
        let mut s = scene(0, "go go", 1.0, &[("go", 0.0, 0.3), ("go", 0.3, 0.6)]);
        s.emotion = EmotionTag::Hyped;
        let track = SubtitleComposer::default().compose(&[s]).unwrap();
        assert_eq!(track.cues[0].style, StyleName::Highlight);
    }

    #[test]
    fn test_degraded_cues_carry_real_text() {
        let mut s = scene(
            0,
            "real words spoken here today",
            1.2,
            &[
                ("[word_0]", 0.0, 0.3),
                ("[word_1]", 0.3, 0.6),
                ("[word_2]", 0.6, 0.9),
                ("[word_3]", 0.9, 1.2),
            ],
        );
        s.alignment_source = Some(AlignmentSource::UniformFallback);

        let track = SubtitleComposer::default().compose(&[s]).unwrap();
        assert_eq!(track.cues.len(), 2);
        assert!(track.cues.iter().all(|c| c.degraded));
        assert_eq!(track.cues[0].text, "real words");
        assert_eq!(track.cues[1].text, "spoken here today");
        assert!(!render_ass(&track).contains("[word_"));
    }

    #[test]
    fn test_word_end_clamped_to_scene() {
        let scenes = vec![
            scene(0, "a b", 1.0, &[("a", 0.0, 0.5), ("b", 0.5, 1.4)]),
            scene(1, "c d", 1.0, &[("c", 0.0, 0.5), ("d", 0.5, 0.9)]),
        ];
        let track = SubtitleComposer::default().compose(&scenes).unwrap();
        assert_eq!(track.cues[0].end_sec, 1.0);
        assert!(track.cues[1].start_sec >= 1.0);
    }

    #[test]
    fn test_render_ass_layout() {
        let mut s = scene(0, "a b", 1.5, &[("a{x}", 0.0, 0.5), ("b", 0.5, 1.23)]);
        s.alignment_source = Some(AlignmentSource::Model);
        let track = SubtitleComposer::default().compose(&[s]).unwrap();

        let ass = render_ass(&track);
        assert!(ass.starts_with("[Script Info]\n"));
        assert!(ass.contains("PlayResX: 1080\nPlayResY: 1920\n"));
        assert!(ass.contains(
            "Style: Default,Pretendard,74,&H00FFFFFF,&H000000FF,&H00000000,&H96000000,-1,0,0,0,100,100,1,0,1,3.5,1,2,60,60,90,1"
        ));
        assert!(ass.contains("Style: Highlight,Pretendard,82,&H0000BFFF"));
        assert!(ass.contains("Dialogue: 0,0:00:00.00,0:00:01.23,Default,,0,0,0,,ax b\n"));
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("line one\nline two"), "line one\\Nline two");
        assert_eq!(sanitize_text("{\\b1}bold"), "\\b1bold");
    }

    #[tokio::test]
    async fn test_write_ass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.ass");
        let composer = SubtitleComposer::default();
        let track = composer.compose(&[scene(0, "hi", 1.0, &[])]).unwrap();

        write_ass(&track, &path).await.unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("Dialogue: 0,0:00:00.00,0:00:01.00,Default,,0,0,0,,hi"));
    }
}
