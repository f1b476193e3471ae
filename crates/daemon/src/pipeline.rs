use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use engine::render::generate_render_command;
use engine::timeline::{secs_to_ticks, ticks_to_secs};
use engine::{compile_scenes, SceneStrategy, Script, TimelinePlan, WordTiming};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::assign::ClipAssigner;
use crate::config::AppConfig;
use crate::context::ResolutionContext;
use crate::errors::PipelineError;
use crate::media::download::{HttpDownloader, MediaFetcher};
use crate::media::extract::{ClipExtractor, YtDlpExtractor};
use crate::media::ffmpeg::FFmpegWrapper;
use crate::media::{MediaProbe, Renderer};
use crate::retrieval::local_backend::LocalPool;
use crate::retrieval::{AssetCandidate, AssetResolver, ResolveRequest, ResolverDeps};
use crate::stock::pexels::PexelsProvider;
use crate::stock::pixabay::PixabayProvider;
use crate::stock::youtube::YtDlpSearch;
use crate::stock::StockProvider;

/// Body of `POST /api/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub script: Script,
    #[serde(default)]
    pub word_timings: Vec<WordTiming>,
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    /// Seconds. Takes precedence over probing `audio_path`.
    #[serde(default)]
    pub audio_duration: Option<f64>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

/// External collaborators of a run.
#[derive(Clone)]
pub struct RunDeps {
    pub providers: Vec<Arc<dyn StockProvider>>,
    pub long_form: Option<Arc<dyn StockProvider>>,
    pub extractor: Arc<dyn ClipExtractor>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub probe: Arc<dyn MediaProbe>,
    pub renderer: Arc<dyn Renderer>,
}

impl RunDeps {
    /// Real ffmpeg, yt-dlp and stock APIs. Providers without a key are skipped.
    pub fn production(config: &AppConfig) -> Result<Self> {
        let ffmpeg = Arc::new(FFmpegWrapper::new(&config.media));
        let request_timeout = Duration::from_secs(config.resolver.request_timeout_secs);

        let mut providers: Vec<Arc<dyn StockProvider>> = Vec::new();
        match PexelsProvider::from_env(request_timeout) {
            Some(pexels) => providers.push(Arc::new(pexels)),
            None => tracing::warn!("[PIPELINE] PEXELS_API_KEY not set, Pexels disabled"),
        }
        match PixabayProvider::from_env(request_timeout) {
            Some(pixabay) => providers.push(Arc::new(pixabay)),
            None => tracing::warn!("[PIPELINE] PIXABAY_API_KEY not set, Pixabay disabled"),
        }

        let long_form: Arc<dyn StockProvider> = Arc::new(YtDlpSearch::new(
            config.extract.ytdlp_bin.clone(),
            Duration::from_secs(config.extract.subprocess_timeout_secs),
        ));

        Ok(RunDeps {
            providers,
            long_form: Some(long_form),
            extractor: Arc::new(YtDlpExtractor::new(config.extract.clone(), ffmpeg.clone())),
            fetcher: Arc::new(HttpDownloader::new(request_timeout)?),
            probe: ffmpeg.clone(),
            renderer: ffmpeg,
        })
    }
}

/// Run-scoped scratch directory, removed on drop unless persisted.
pub struct RunWorkspace {
    path: PathBuf,
    keep: bool,
}

impl RunWorkspace {
    pub async fn create(root: &Path, run_id: &str) -> Result<Self, PipelineError> {
        let path = root.join(format!("run-{run_id}"));
        tokio::fs::create_dir_all(&path).await?;
        Ok(RunWorkspace { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The plan references files in here; keep them.
    pub fn persist(&mut self) {
        self.keep = true;
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "[PIPELINE] failed to remove work dir {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Race `fut` against cancellation. Cancellation wins ties.
pub async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

pub struct GenerationRun {
    config: Arc<AppConfig>,
    deps: RunDeps,
}

impl GenerationRun {
    pub fn new(config: Arc<AppConfig>, deps: RunDeps) -> Self {
        GenerationRun { config, deps }
    }

    async fn total_ticks(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<i64, PipelineError> {
        if let Some(secs) = request.audio_duration {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(PipelineError::Config(format!(
                    "audio_duration must be positive, got {secs}"
                )));
            }
            return Ok(secs_to_ticks(secs));
        }
        if let Some(audio) = &request.audio_path {
            return guarded(cancel, self.deps.probe.duration_ticks(audio))
                .await?
                .map_err(PipelineError::from);
        }
        match request.word_timings.last() {
            Some(last) if last.end_ticks() > 0 => Ok(last.end_ticks()),
            _ => Err(PipelineError::Config(
                "audio_duration, audio_path or word timings are required".into(),
            )),
        }
    }

    /// Turn a request into a validated plan, rendering it when an output
    /// path and a voiceover are given.
    pub async fn execute(
        &self,
        run_id: &str,
        request: &RunRequest,
        cancel: &CancellationToken,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<TimelinePlan, PipelineError> {
        if request.script.segments.is_empty() {
            return Err(PipelineError::Config("script has no segments".into()));
        }
        let script = request.script.clone().reindexed();
        let config = &self.config;

        let total_ticks = self.total_ticks(request, cancel).await?;
        let build = compile_scenes(&script, &request.word_timings, total_ticks, &config.scenes)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        tracing::info!(
            "[PIPELINE] run {}: {} scenes over {:.2}s ({})",
            run_id,
            build.scenes.len(),
            ticks_to_secs(total_ticks),
            build.strategy.as_str()
        );
        if !build.unmatched_segments.is_empty() {
            tracing::warn!(
                "[PIPELINE] run {}: segments {:?} did not align",
                run_id,
                build.unmatched_segments
            );
        }
        if let Some(hook_end) = build.hook_end_ticks {
            tracing::info!(
                "[PIPELINE] run {}: hook spoken until {:.2}s, folded into the first scene",
                run_id,
                ticks_to_secs(hook_end)
            );
        }
        progress(0.1);

        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let mut ctx = ResolutionContext::new(seed);
        let mut workspace = RunWorkspace::create(&config.work_dir, run_id).await?;

        let local_pool = match &config.local_footage_dir {
            Some(dir) if dir.is_dir() => match guarded(cancel, LocalPool::scan(dir)).await? {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::warn!("[PIPELINE] local footage scan failed: {:#}", e);
                    LocalPool::empty()
                }
            },
            _ => LocalPool::empty(),
        };

        let resolver = AssetResolver::build(
            config,
            ResolverDeps {
                providers: self.deps.providers.clone(),
                long_form: self.deps.long_form.clone(),
                extractor: self.deps.extractor.clone(),
                fetcher: self.deps.fetcher.clone(),
                local_pool: Arc::new(local_pool),
            },
        );

        let fallback_secs = config.extract.clip_secs;
        let segment_count = script.segments.len();
        let mut resolved: BTreeMap<usize, Vec<AssetCandidate>> = BTreeMap::new();
        for segment in &script.segments {
            // Aligned scenes belong to their segments; a segment without any
            // would only burn downloads and seen URIs.
            if build.strategy == SceneStrategy::Aligned
                && build.unmatched_segments.contains(&segment.order_index)
            {
                tracing::debug!(
                    "[PIPELINE] run {}: segment {} owns no scene, not resolved",
                    run_id,
                    segment.order_index
                );
                continue;
            }
            let target_secs = build
                .segment_duration_ticks(segment.order_index)
                .map(ticks_to_secs)
                .unwrap_or(fallback_secs);
            let resolve_request = ResolveRequest {
                segment_index: segment.order_index,
                query: segment.visual_query.clone(),
                text: segment.text.clone(),
                target_secs,
                wanted: config.resolver.variation_count,
                work_dir: workspace.path().to_path_buf(),
            };
            let candidates = guarded(cancel, resolver.resolve(&resolve_request, &mut ctx)).await?;
            resolved.insert(segment.order_index, candidates);
            progress(0.1 + 0.7 * (segment.order_index + 1) as f64 / segment_count as f64);
        }

        let mut assigner = ClipAssigner::new(self.deps.probe.clone(), &config.assign);
        let plan = guarded(cancel, assigner.assign(&build, total_ticks, &resolved, &mut ctx)).await??;
        plan.validate()?;
        progress(0.9);

        if let (Some(output), Some(audio)) = (&request.output_path, &request.audio_path) {
            let command = generate_render_command(&plan, audio, output.clone(), &config.media.canvas)?;
            guarded(cancel, self.deps.renderer.render(&command)).await??;
        }

        workspace.persist();
        tracing::info!(
            "[PIPELINE] run {} done: {} bindings, {} unique assets, {} reshuffles",
            run_id,
            plan.bindings.len(),
            ctx.seen_count(),
            plan.reshuffle_events
        );
        progress(1.0);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspace_is_removed_unless_persisted() {
        let root = tempfile::tempdir().unwrap();
        let dropped = {
            let workspace = RunWorkspace::create(root.path(), "a").await.unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!dropped.exists());

        let kept = {
            let mut workspace = RunWorkspace::create(root.path(), "b").await.unwrap();
            workspace.persist();
            workspace.path().to_path_buf()
        };
        assert!(kept.is_dir());
        assert!(kept.ends_with("run-b"));
    }

    #[tokio::test]
    async fn guarded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guarded(&cancel, async { 5 }).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        let live = CancellationToken::new();
        assert_eq!(guarded(&live, async { 5 }).await.unwrap(), 5);
    }

    #[test]
    fn request_defaults_optional_fields() {
        let request: RunRequest = serde_json::from_str(
            r#"{"script":{"hook":"Listen.","segments":[{"text":"Train hard.","visual_query":"boxer"}]}}"#,
        )
        .unwrap();
        assert!(request.word_timings.is_empty());
        assert!(request.audio_path.is_none());
        assert_eq!(request.script.segments[0].visual_query, "boxer");
    }
}
