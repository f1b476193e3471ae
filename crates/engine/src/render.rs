use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::plan::{PlanError, TimelinePlan};
use crate::timeline::TICKS_PER_SECOND;

/// Output frame for the vertical reel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Canvas {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderCommand {
    pub ffmpeg_args: Vec<String>,
    pub output_path: PathBuf,
}

fn secs(ticks: i64) -> String {
    format!("{:.3}", ticks as f64 / TICKS_PER_SECOND as f64)
}

/// Build the ffmpeg invocation for a validated plan.
/// Hard cuts only: every binding is trimmed, fitted to the canvas and
/// concatenated in order, with the voiceover as the only audio track.
pub fn generate_render_command(
    plan: &TimelinePlan,
    audio_path: &Path,
    output_path: PathBuf,
    canvas: &Canvas,
) -> Result<RenderCommand, PlanError> {
    plan.validate()?;

    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];
    for binding in &plan.bindings {
        if binding.loops > 0 {
            args.push("-stream_loop".into());
            args.push(binding.loops.to_string());
        }
        args.push("-i".into());
        args.push(binding.asset_path.to_string_lossy().to_string());
    }
    let audio_input = plan.bindings.len();
    args.push("-i".into());
    args.push(audio_path.to_string_lossy().to_string());

    let mut filter_parts = Vec::with_capacity(plan.bindings.len() + 1);
    for (idx, binding) in plan.bindings.iter().enumerate() {
        // [0:v]trim=start=1.000:duration=2.000,setpts=PTS-STARTPTS,scale=...,crop=...,fps=30[v0]
        filter_parts.push(format!(
            "[{idx}:v]trim=start={}:duration={},setpts=PTS-STARTPTS,\
             scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},\
             fps={fps},setsar=1[v{idx}]",
            secs(binding.in_ticks),
            secs(binding.window_ticks()),
            w = canvas.width,
            h = canvas.height,
            fps = canvas.fps,
        ));
    }
    let concat_inputs: String = (0..plan.bindings.len()).map(|i| format!("[v{i}]")).collect();
    filter_parts.push(format!(
        "{}concat=n={}:v=1:a=0[outv]",
        concat_inputs,
        plan.bindings.len()
    ));

    args.extend([
        "-filter_complex".into(),
        filter_parts.join(";"),
        "-map".into(),
        "[outv]".into(),
        "-map".into(),
        format!("{audio_input}:a"),
        "-t".into(),
        secs(plan.total_ticks),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "medium".into(),
        "-crf".into(),
        "23".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        output_path.to_string_lossy().to_string(),
    ]);

    Ok(RenderCommand {
        ffmpeg_args: args,
        output_path,
    })
}
