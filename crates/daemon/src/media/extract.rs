//! Short clips out of long-form sources via yt-dlp.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ExtractConfig;
use crate::errors::PipelineError;
use crate::media::ffmpeg::FFmpegWrapper;
use crate::media::run_with_timeout;

#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub target_secs: f64,
    pub dest: PathBuf,
    /// Position of the clip inside the usable range, in `[0, 1)`.
    pub start_fraction: f64,
}

#[async_trait::async_trait]
pub trait ClipExtractor: Send + Sync {
    async fn extract(&self, source_url: &str, request: &ClipRequest) -> Result<(), PipelineError>;
}

/// Start time that keeps `target` seconds clear of the head and tail
/// buffers. Sources too short for the buffers start at 0.
pub fn safe_start(duration: f64, target: f64, head: f64, tail: f64, fraction: f64) -> f64 {
    let earliest = head;
    let latest = duration - tail - target;
    if !latest.is_finite() || latest <= earliest {
        return 0.0;
    }
    earliest + fraction.clamp(0.0, 1.0) * (latest - earliest)
}

/// Section to cut, in seconds. Without a known source duration the clip
/// is taken from the top.
pub fn clip_section(duration: Option<f64>, target: f64, head: f64, tail: f64, fraction: f64) -> (f64, f64) {
    match duration {
        Some(duration) => {
            let start = safe_start(duration, target, head, tail, fraction);
            (start, (start + target).min(duration))
        }
        None => (0.0, target),
    }
}

pub struct YtDlpExtractor {
    config: ExtractConfig,
    ffmpeg: Arc<FFmpegWrapper>,
}

impl YtDlpExtractor {
    pub fn new(config: ExtractConfig, ffmpeg: Arc<FFmpegWrapper>) -> Self {
        YtDlpExtractor { config, ffmpeg }
    }

    fn limit(&self) -> Duration {
        Duration::from_secs(self.config.subprocess_timeout_secs)
    }

    async fn probe_duration(&self, url: &str) -> Result<f64> {
        let mut command = Command::new(&self.config.ytdlp_bin);
        command
            .args(["--no-warnings", "--skip-download", "--print", "duration"])
            .arg(url);
        let output = run_with_timeout(command, self.limit(), "yt-dlp probe").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp could not read {}: {}", url, stderr.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .next()
            .and_then(|line| line.trim().parse::<f64>().ok())
            .with_context(|| format!("yt-dlp printed no duration for {url}"))
    }

    async fn download(&self, url: &str, format: &str, section: Option<(f64, f64)>, dest: &Path) -> Result<()> {
        let mut command = Command::new(&self.config.ytdlp_bin);
        command
            .args(["--no-part", "--quiet", "--no-warnings", "--no-playlist"])
            .arg("-f")
            .arg(format)
            .args(["--merge-output-format", "mp4"]);
        if let Some((start, end)) = section {
            command
                .arg("--download-sections")
                .arg(format!("*{start:.2}-{end:.2}"))
                .arg("--force-keyframes-at-cuts");
        }
        command.arg("-o").arg(dest).arg(url);

        let output = run_with_timeout(command, self.limit(), "yt-dlp download").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed to download {}: {}", url, stderr.trim());
        }
        let written = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            anyhow::bail!("yt-dlp reported success but {} was not created", dest.display());
        }
        Ok(())
    }

    async fn download_and_trim(&self, url: &str, format: &str, start: f64, request: &ClipRequest) -> Result<()> {
        let full = request.dest.with_extension("full.mp4");
        let result = async {
            self.download(url, format, None, &full).await?;
            self.ffmpeg
                .trim_copy(&full, &request.dest, start, request.target_secs, self.limit())
                .await
        }
        .await;
        let _ = tokio::fs::remove_file(&full).await;
        result
    }
}

#[async_trait::async_trait]
impl ClipExtractor for YtDlpExtractor {
    async fn extract(&self, source_url: &str, request: &ClipRequest) -> Result<(), PipelineError> {
        if let Some(parent) = request.dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let duration = match self.probe_duration(source_url).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                tracing::warn!("[EXTRACT] no duration for {} ({}), cutting from the start", source_url, e);
                None
            }
        };
        let (start, end) = clip_section(
            duration,
            request.target_secs,
            self.config.head_buffer_secs,
            self.config.tail_buffer_secs,
            request.start_fraction,
        );

        let mut last_error = None;
        for format in [&self.config.primary_format, &self.config.fallback_format] {
            match self
                .download(source_url, format, Some((start, end)), &request.dest)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("[EXTRACT] section download failed ({}), trying full download", e);
                    let _ = tokio::fs::remove_file(&request.dest).await;
                }
            }
            match self.download_and_trim(source_url, format, start, request).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("[EXTRACT] full download + trim failed: {}", e);
                    let _ = tokio::fs::remove_file(&request.dest).await;
                    last_error = Some(e);
                }
            }
        }

        Err(PipelineError::ExtractionError(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("no attempt succeeded for {source_url}")),
        ))
    }
}
