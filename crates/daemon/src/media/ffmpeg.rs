use anyhow::{Context, Result};
use engine::render::RenderCommand;
use engine::timeline::secs_to_ticks;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::config::MediaConfig;
use crate::media::{run_with_timeout, MediaProbe, Renderer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_ticks: i64,
    pub width: i32,
    pub height: i32,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutput {
    format: Option<FormatInfo>,
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<i32>,
    height: Option<i32>,
    duration: Option<String>,
}

impl ProbeOutput {
    fn into_info(self) -> MediaInfo {
        // Container duration first; some muxers only report it per stream.
        let duration_seconds = self
            .format
            .and_then(|f| f.duration)
            .or_else(|| self.streams.iter().find_map(|s| s.duration.clone()))
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let video_stream = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let (width, height) = video_stream
            .map(|vs| (vs.width.unwrap_or(0), vs.height.unwrap_or(0)))
            .unwrap_or((0, 0));

        MediaInfo {
            duration_ticks: secs_to_ticks(duration_seconds),
            width,
            height,
            has_video: video_stream.is_some(),
            has_audio: self
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some("audio")),
        }
    }
}

pub struct FFmpegWrapper {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    probe_timeout: Duration,
    render_timeout: Duration,
}

impl FFmpegWrapper {
    pub fn new(config: &MediaConfig) -> Self {
        FFmpegWrapper {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            render_timeout: Duration::from_secs(config.render_timeout_secs),
        }
    }

    pub async fn probe(&self, media_path: &Path) -> Result<MediaInfo> {
        let mut command = Command::new(&self.ffprobe_bin);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=codec_type,width,height,duration",
                "-of",
                "json",
            ])
            .arg(media_path);
        let output = run_with_timeout(command, self.probe_timeout, "ffprobe")
            .await
            .context("Failed to execute ffprobe. Make sure FFmpeg is installed.")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed on {}: {}", media_path.display(), stderr.trim());
        }

        let probe_output: ProbeOutput = serde_json::from_slice(&output.stdout)
            .context("Failed to parse ffprobe JSON output")?;
        Ok(probe_output.into_info())
    }

    /// Cut `[start, start + duration]` out of `input` without re-encoding.
    pub async fn trim_copy(
        &self,
        input_path: &Path,
        output_path: &Path,
        start_secs: f64,
        duration_secs: f64,
        limit: Duration,
    ) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut command = Command::new(&self.ffmpeg_bin);
        command
            .args(["-y", "-hide_banner", "-loglevel", "error", "-ss"])
            .arg(format!("{start_secs:.3}"))
            .arg("-i")
            .arg(input_path)
            .arg("-t")
            .arg(format!("{duration_secs:.3}"))
            .args(["-c", "copy", "-avoid_negative_ts", "make_zero"])
            .arg(output_path);
        let output = run_with_timeout(command, limit, "ffmpeg trim").await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg failed to trim {}: {}", input_path.display(), stderr.trim());
        }
        Ok(())
    }

    pub async fn run_render(&self, render: &RenderCommand) -> Result<()> {
        if let Some(parent) = render.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut command = Command::new(&self.ffmpeg_bin);
        command.args(&render.ffmpeg_args);
        let output = run_with_timeout(command, self.render_timeout, "ffmpeg render").await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg render failed: {}", stderr.trim());
        }
        tracing::info!("[RENDER] wrote {}", render.output_path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaProbe for FFmpegWrapper {
    async fn duration_ticks(&self, path: &Path) -> Result<i64> {
        let info = self.probe(path).await?;
        if info.duration_ticks <= 0 {
            anyhow::bail!("{} reports no duration", path.display());
        }
        Ok(info.duration_ticks)
    }

    async fn video_duration_ticks(&self, path: &Path) -> Result<i64> {
        let info = self.probe(path).await?;
        if !info.has_video {
            anyhow::bail!("{} has no video stream", path.display());
        }
        if info.duration_ticks <= 0 {
            anyhow::bail!("{} reports no duration", path.display());
        }
        Ok(info.duration_ticks)
    }
}

#[async_trait::async_trait]
impl Renderer for FFmpegWrapper {
    async fn render(&self, command: &RenderCommand) -> Result<()> {
        self.run_render(command).await
    }
}
