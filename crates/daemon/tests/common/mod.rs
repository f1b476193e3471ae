#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use engine::render::RenderCommand;
use engine::timeline::secs_to_ticks;
use engine::WordTiming;
use reeld::errors::PipelineError;
use reeld::media::download::MediaFetcher;
use reeld::media::extract::{ClipExtractor, ClipRequest};
use reeld::media::{MediaProbe, Renderer};
use reeld::stock::{HitSource, StockHit, StockProvider};
use reeld::{AppConfig, RunDeps};

pub struct FakeProvider {
    name: String,
    hits: HashMap<String, Vec<StockHit>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        FakeProvider {
            name: name.to_string(),
            hits: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_hits(mut self, query: &str, hits: Vec<StockHit>) -> Self {
        self.hits.insert(query.to_string(), hits);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StockProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<StockHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .hits
            .get(query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(per_page)
            .collect())
    }
}

pub fn direct_hit(uri: &str, duration_secs: f64) -> StockHit {
    StockHit {
        uri: uri.to_string(),
        download_url: format!("https://cdn.test/{uri}.mp4"),
        duration_secs: Some(duration_secs),
        width: 1080,
        height: 1920,
        source: HitSource::Direct,
    }
}

async fn write_clip(dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, b"clip").await
}

#[derive(Default)]
pub struct FakeFetcher {
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.fetched.lock().unwrap().push(url.to_string());
        write_clip(dest).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ClipExtractor for FakeExtractor {
    async fn extract(&self, _source_url: &str, request: &ClipRequest) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        write_clip(&request.dest).await?;
        Ok(())
    }
}

/// Every clip is `clip_secs` long except paths listed as broken.
pub struct FakeProbe {
    clip_ticks: i64,
    audio_ticks: i64,
    broken: HashSet<PathBuf>,
}

impl FakeProbe {
    pub fn new(clip_secs: f64) -> Self {
        FakeProbe {
            clip_ticks: secs_to_ticks(clip_secs),
            audio_ticks: secs_to_ticks(5.0),
            broken: HashSet::new(),
        }
    }

    pub fn with_audio(mut self, secs: f64) -> Self {
        self.audio_ticks = secs_to_ticks(secs);
        self
    }

    pub fn with_broken(mut self, path: PathBuf) -> Self {
        self.broken.insert(path);
        self
    }
}

#[async_trait::async_trait]
impl MediaProbe for FakeProbe {
    async fn duration_ticks(&self, _path: &Path) -> Result<i64> {
        Ok(self.audio_ticks)
    }

    async fn video_duration_ticks(&self, path: &Path) -> Result<i64> {
        if self.broken.contains(path) {
            anyhow::bail!("{} is not a video", path.display());
        }
        Ok(self.clip_ticks)
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub commands: Mutex<Vec<RenderCommand>>,
}

#[async_trait::async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, command: &RenderCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

pub fn test_config(work_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.work_dir = work_dir.to_path_buf();
    config.rng_seed = Some(7);
    config.resolver.request_delay_ms = 0;
    config
}

pub struct Fakes {
    pub provider: Arc<FakeProvider>,
    pub fetcher: Arc<FakeFetcher>,
    pub extractor: Arc<FakeExtractor>,
    pub renderer: Arc<FakeRenderer>,
}

impl Fakes {
    pub fn new(provider: FakeProvider) -> Self {
        Fakes {
            provider: Arc::new(provider),
            fetcher: Arc::new(FakeFetcher::default()),
            extractor: Arc::new(FakeExtractor::default()),
            renderer: Arc::new(FakeRenderer::default()),
        }
    }

    pub fn deps(&self, probe: FakeProbe) -> RunDeps {
        let provider: Arc<dyn StockProvider> = self.provider.clone();
        RunDeps {
            providers: vec![provider],
            long_form: None,
            extractor: self.extractor.clone(),
            fetcher: self.fetcher.clone(),
            probe: Arc::new(probe),
            renderer: self.renderer.clone(),
        }
    }
}

/// Word timings for the two-segment script used across tests.
pub fn weak_script_timings() -> Vec<WordTiming> {
    vec![
        WordTiming::new("You", 0.0, 0.3),
        WordTiming::new("are", 0.3, 0.6),
        WordTiming::new("weak.", 0.6, 1.2),
        WordTiming::new("Stop", 1.2, 1.6),
        WordTiming::new("lying", 1.6, 2.1),
        WordTiming::new("to", 2.1, 2.3),
        WordTiming::new("yourself", 2.3, 3.0),
        WordTiming::new("and", 3.0, 3.3),
        WordTiming::new("change", 3.3, 4.2),
        WordTiming::new("today.", 4.2, 5.2),
    ]
}

pub fn hits(prefix: &str, count: usize) -> Vec<StockHit> {
    (0..count)
        .map(|i| direct_hit(&format!("{prefix}-{i}"), 10.0))
        .collect()
}
