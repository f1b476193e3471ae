pub mod download;
pub mod extract;
pub mod ffmpeg;

use anyhow::{Context, Result};
use engine::render::RenderCommand;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;

pub async fn compute_file_checksum(file_path: &Path) -> Result<String> {
    let file = File::open(file_path)
        .await
        .with_context(|| format!("Failed to open {}", file_path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Run a subprocess to completion, killing it if it outlives `limit`.
pub async fn run_with_timeout(mut command: Command, limit: Duration, label: &str) -> Result<Output> {
    command.kill_on_drop(true);
    match tokio::time::timeout(limit, command.output()).await {
        Ok(output) => output.with_context(|| format!("Failed to execute {label}")),
        Err(_) => anyhow::bail!("{label} timed out after {}s", limit.as_secs()),
    }
}

/// Duration lookups, in ticks.
#[async_trait::async_trait]
pub trait MediaProbe: Send + Sync {
    /// Any media, e.g. the voiceover.
    async fn duration_ticks(&self, path: &Path) -> Result<i64>;
    /// Fails unless the file carries a video stream.
    async fn video_duration_ticks(&self, path: &Path) -> Result<i64>;
}

/// Executes a finished render command.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, command: &RenderCommand) -> Result<()>;
}
