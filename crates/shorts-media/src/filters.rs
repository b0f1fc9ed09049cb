//! FFmpeg filter graph builders.
//!
//! All builders return plain strings so they can be checked without running
//! FFmpeg.

use std::path::Path;

/// Pixel rectangle cut out of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Inset every edge by `floor(dimension * fraction)`. The remaining
    /// width and height are rounded down to even values for yuv420p.
    pub fn inset(width: u32, height: u32, fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 0.25)
        } else {
            0.0
        };

        let x = (width as f64 * fraction).floor() as u32;
        let y = (height as f64 * fraction).floor() as u32;

        Self {
            x,
            y,
            width: even(width.saturating_sub(2 * x)).max(2),
            height: even(height.saturating_sub(2 * y)).max(2),
        }
    }
}

fn even(v: u32) -> u32 {
    v - (v % 2)
}

/// Brightness/contrast/saturation shift applied through `eq`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorGrade {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

/// Everything the laundering filter chain needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunderFilter {
    pub crop: CropRect,
    pub target_width: u32,
    pub target_height: u32,
    pub speed_factor: f64,
    pub sharpen_amount: f64,
    pub color: ColorGrade,
    pub fps: u32,
}

impl LaunderFilter {
    /// Build the `-vf` chain: crop, fill-scale to target, retime, sharpen,
    /// color shift, constant frame rate.
    pub fn build(&self) -> String {
        let tw = self.target_width;
        let th = self.target_height;
        format!(
            "crop={}:{}:{}:{},\
             scale={tw}:{th}:force_original_aspect_ratio=increase:flags=lanczos,crop={tw}:{th},setsar=1,\
             setpts=PTS/{:.3},\
             unsharp=5:5:{:.2}:5:5:0,\
             eq=brightness={:.3}:contrast={:.3}:saturation={:.3},\
             fps={}",
            self.crop.width,
            self.crop.height,
            self.crop.x,
            self.crop.y,
            self.speed_factor,
            self.sharpen_amount,
            self.color.brightness,
            self.color.contrast,
            self.color.saturation,
            self.fps,
        )
    }
}

/// Fit into `width`x`height` without distortion, padding with black.
pub fn letterbox_filter(width: u32, height: u32, fps: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps}",
        w = width,
        h = height,
        fps = fps
    )
}

/// Letterbox and freeze the last frame for up to `pad_secs` so a short clip
/// can fill its slot. The output is cut with `-t`.
pub fn segment_filter(width: u32, height: u32, fps: u32, pad_secs: f64) -> String {
    let mut filter = letterbox_filter(width, height, fps);
    if pad_secs > 0.0 {
        filter.push_str(&format!(",tpad=stop_mode=clone:stop_duration={:.3}", pad_secs));
    }
    filter
}

/// Escape a path for use inside a quoted filter option.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Burn-in filter for an ASS subtitle file.
pub fn subtitle_filter(ass_path: &Path) -> String {
    format!("ass='{}'", escape_filter_path(&ass_path.to_string_lossy()))
}

/// Join `durations.len()` audio inputs (starting at input 0) into one mono
/// 44.1 kHz track labelled `[narration]`.
///
/// Each input is padded with silence and cut to its slot duration so the
/// narration stays in lockstep with the video segments.
pub fn narration_concat_graph(durations: &[f64]) -> String {
    let mut graph = String::new();
    for (i, d) in durations.iter().enumerate() {
        graph.push_str(&format!(
            "[{i}:a]aresample=44100,aformat=channel_layouts=mono,apad,atrim=0:{d:.3},asetpts=PTS-STARTPTS[a{i}];"
        ));
    }
    for i in 0..durations.len() {
        graph.push_str(&format!("[a{i}]"));
    }
    graph.push_str(&format!(
        "concat=n={}:v=0:a=1[narration]",
        durations.len()
    ));
    graph
}

/// Background music settings for the final mix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicMix {
    /// Linear gain applied to the music bed
    pub volume: f64,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
}

/// Final-pass filter graph over input 0 (video), 1 (narration) and
/// optionally 2 (looped music). Produces `[vout]` and `[aout]`.
pub fn final_mix_graph(
    subtitles: Option<&Path>,
    music: Option<&MusicMix>,
    total_secs: f64,
) -> String {
    let video = match subtitles {
        Some(path) => format!("[0:v]{}[vout]", subtitle_filter(path)),
        None => "[0:v]null[vout]".to_string(),
    };

    let audio = match music {
        Some(mix) => {
            let fade_out_start = (total_secs - mix.fade_out_secs).max(0.0);
            format!(
                "[1:a]aresample=44100[nar];\
                 [2:a]aresample=44100,volume={:.3},afade=t=in:st=0:d={:.2},afade=t=out:st={:.3}:d={:.2}[bgm];\
                 [nar][bgm]amix=inputs=2:duration=first:dropout_transition=2:normalize=0[aout]",
                mix.volume, mix.fade_in_secs, fade_out_start, mix.fade_out_secs
            )
        }
        None => "[1:a]aresample=44100[aout]".to_string(),
    };

    format!("{};{}", video, audio)
}
