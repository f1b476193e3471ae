use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::stock::{get_api_key, pick_rendition, HitSource, StockHit, StockProvider};

const PIXABAY_API_URL: &str = "https://pixabay.com/api/videos/";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "pageURL")]
    page_url: String,
    duration: Option<f64>,
    videos: Renditions,
}

#[derive(Debug, Deserialize)]
struct Renditions {
    large: Option<Rendition>,
    medium: Option<Rendition>,
    small: Option<Rendition>,
    tiny: Option<Rendition>,
}

#[derive(Debug, Clone, Deserialize)]
struct Rendition {
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

pub struct PixabayProvider {
    client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl PixabayProvider {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        PixabayProvider {
            client: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }

    pub fn from_env(timeout: Duration) -> Option<Self> {
        get_api_key("PIXABAY_API_KEY").map(|key| Self::new(key, timeout))
    }
}

fn into_hits(response: SearchResponse) -> Vec<StockHit> {
    response
        .hits
        .into_iter()
        .filter_map(|hit| {
            // Pixabay returns empty url strings for renditions it lacks.
            let renditions: Vec<Rendition> = [hit.videos.large, hit.videos.medium, hit.videos.small, hit.videos.tiny]
                .into_iter()
                .flatten()
                .filter(|r| !r.url.is_empty())
                .collect();
            let best = pick_rendition(&renditions, |r| (r.width, r.height))?.clone();
            Some(StockHit {
                uri: hit.page_url,
                download_url: best.url,
                duration_secs: hit.duration,
                width: best.width,
                height: best.height,
                source: HitSource::Direct,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl StockProvider for PixabayProvider {
    fn name(&self) -> &str {
        "pixabay"
    }

    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<StockHit>> {
        // Pixabay rejects per_page below 3.
        let per_page = per_page.clamp(3, 200).to_string();
        let response = self
            .client
            .get(PIXABAY_API_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("per_page", per_page.as_str()),
                ("safesearch", "true"),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("Pixabay request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Pixabay API error: {} - {}", status, error_text);
        }
        let body: SearchResponse = response.json().await.context("Invalid Pixabay response")?;
        Ok(into_hits(body))
    }
}
