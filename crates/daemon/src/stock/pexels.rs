use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::stock::{get_api_key, pick_rendition, HitSource, StockHit, StockProvider};

const PEXELS_API_URL: &str = "https://api.pexels.com/videos/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    url: String,
    duration: Option<f64>,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    width: Option<u32>,
    height: Option<u32>,
}

pub struct PexelsProvider {
    client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl PexelsProvider {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        PexelsProvider {
            client: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }

    pub fn from_env(timeout: Duration) -> Option<Self> {
        get_api_key("PEXELS_API_KEY").map(|key| Self::new(key, timeout))
    }
}

fn into_hits(response: SearchResponse) -> Vec<StockHit> {
    response
        .videos
        .into_iter()
        .filter_map(|video| {
            let file = pick_rendition(&video.video_files, |f| {
                (f.width.unwrap_or(0), f.height.unwrap_or(0))
            })?;
            Some(StockHit {
                uri: video.url.clone(),
                download_url: file.link.clone(),
                duration_secs: video.duration,
                width: file.width.unwrap_or(0),
                height: file.height.unwrap_or(0),
                source: HitSource::Direct,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl StockProvider for PexelsProvider {
    fn name(&self) -> &str {
        "pexels"
    }

    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<StockHit>> {
        let per_page = per_page.to_string();
        let response = self
            .client
            .get(PEXELS_API_URL)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("orientation", "portrait"),
                ("size", "medium"),
                ("per_page", per_page.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("Pexels request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Pexels API error: {} - {}", status, error_text);
        }
        let body: SearchResponse = response.json().await.context("Invalid Pexels response")?;
        Ok(into_hits(body))
    }
}
