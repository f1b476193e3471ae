use anyhow::Result;
use std::time::Duration;
use tokio::process::Command;

use crate::media::run_with_timeout;
use crate::stock::{HitSource, StockHit, StockProvider};

/// Long-form search through yt-dlp's `ytsearchN:` pseudo-URL.
pub struct YtDlpSearch {
    ytdlp_bin: String,
    timeout: Duration,
}

impl YtDlpSearch {
    pub fn new(ytdlp_bin: impl Into<String>, timeout: Duration) -> Self {
        YtDlpSearch {
            ytdlp_bin: ytdlp_bin.into(),
            timeout,
        }
    }
}

/// Parse `url<TAB>duration` lines; duration may be "NA".
fn parse_listing(stdout: &str) -> Vec<StockHit> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let url = parts.next()?.trim();
            if !url.starts_with("http") {
                return None;
            }
            let duration_secs = parts.next().and_then(|d| d.trim().parse::<f64>().ok());
            Some(StockHit {
                uri: url.to_string(),
                download_url: url.to_string(),
                duration_secs,
                width: 0,
                height: 0,
                source: HitSource::LongForm,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl StockProvider for YtDlpSearch {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<StockHit>> {
        let mut command = Command::new(&self.ytdlp_bin);
        command
            .args(["--flat-playlist", "--no-warnings", "--print", "%(url)s\t%(duration)s"])
            .arg(format!("ytsearch{}:{}", per_page.max(1), query));
        let output = run_with_timeout(command, self.timeout, "yt-dlp search").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp search failed: {}", stderr.trim());
        }
        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_playlist_lines() {
        let stdout = "https://www.youtube.com/watch?v=abc\t612.0\nhttps://www.youtube.com/watch?v=def\tNA\nWARNING: junk\n";
        let hits = parse_listing(stdout);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].duration_secs, Some(612.0));
        assert_eq!(hits[1].duration_secs, None);
        assert_eq!(hits[1].source, HitSource::LongForm);
    }
}
