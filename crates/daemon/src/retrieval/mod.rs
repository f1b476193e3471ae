use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use engine::SourceTier;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::AppConfig;
use crate::context::ResolutionContext;
use crate::media::download::MediaFetcher;
use crate::media::extract::ClipExtractor;
use crate::stock::StockProvider;

pub mod curated;
pub mod local_backend;
pub mod query;
pub mod rank;
pub mod search;

use curated::CuratedTier;
use local_backend::{LocalPool, LocalTier};
use query::QueryFilter;
use rank::ClipScorer;
use search::{KeywordTier, SearchSource, SearchTier};

/// Ladder rung identifier, as written in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Local,
    Curated,
    Search,
    Mood,
    Generic,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Local => "local",
            TierKind::Curated => "curated",
            TierKind::Search => "search",
            TierKind::Mood => "mood",
            TierKind::Generic => "generic",
        }
    }
}

/// A materialised candidate. `uri` is the dedup identity, `path` the local file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetCandidate {
    pub uri: String,
    pub source_tier: SourceTier,
    pub category: Option<String>,
    pub path: PathBuf,
    /// Relevance to the segment text, filled in by the resolver.
    #[serde(default)]
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub segment_index: usize,
    pub query: String,
    pub text: String,
    pub target_secs: f64,
    /// K: how many unique candidates to collect.
    pub wanted: usize,
    pub work_dir: PathBuf,
}

impl ResolveRequest {
    /// Deterministic per-run file name for the `variant`-th candidate.
    pub fn clip_path(&self, variant: usize) -> PathBuf {
        self.work_dir
            .join(format!("seg{:02}_var{}.mp4", self.segment_index, variant))
    }

    pub fn is_satisfied(&self, found: &[AssetCandidate]) -> bool {
        found.len() >= self.wanted
    }
}

/// One rung of the fallback ladder.
///
/// A tier appends unique candidates to `found` until the request is
/// satisfied or it runs out of material. Failures stay inside the tier.
#[async_trait::async_trait]
pub trait ResolutionTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// An exclusive tier ends the ladder for every request of the run.
    fn is_exclusive(&self) -> bool {
        false
    }

    async fn attempt_resolve(
        &self,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    );
}

/// Bounded retries over a list, drawn without replacement.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
}

impl RetryPolicy {
    pub fn select<'a, T, R: Rng + ?Sized>(&self, items: &'a [T], rng: &mut R) -> Vec<&'a T> {
        items.choose_multiple(rng, self.max_attempts).collect()
    }
}

pub(crate) async fn polite_pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Everything with I/O the ladder needs, injected so tests can swap in fakes.
pub struct ResolverDeps {
    pub providers: Vec<Arc<dyn StockProvider>>,
    pub long_form: Option<Arc<dyn StockProvider>>,
    pub extractor: Arc<dyn ClipExtractor>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub local_pool: Arc<LocalPool>,
}

pub struct AssetResolver {
    tiers: Vec<Box<dyn ResolutionTier>>,
    scorer: ClipScorer,
}

impl AssetResolver {
    pub fn new(tiers: Vec<Box<dyn ResolutionTier>>, scorer: ClipScorer) -> Self {
        AssetResolver { tiers, scorer }
    }

    /// Build the ladder in the order configuration lists it.
    pub fn build(config: &AppConfig, deps: ResolverDeps) -> Self {
        let resolver = &config.resolver;
        let source = Arc::new(SearchSource {
            providers: deps.providers,
            long_form: deps.long_form,
            fetcher: deps.fetcher,
            extractor: deps.extractor.clone(),
            min_source_duration: resolver.min_source_duration,
            per_page: resolver.per_page,
            long_form_results: resolver.long_form_results,
            clip_secs: config.extract.clip_secs,
            delay: Duration::from_millis(resolver.request_delay_ms),
        });

        let tiers = resolver
            .tiers
            .iter()
            .map(|kind| -> Box<dyn ResolutionTier> {
                match kind {
                    TierKind::Local => Box::new(LocalTier::new(deps.local_pool.clone())),
                    TierKind::Curated => Box::new(CuratedTier::new(
                        resolver.category_table.clone(),
                        resolver.default_category.clone(),
                        resolver.curated_links.clone(),
                        RetryPolicy {
                            max_attempts: resolver.max_link_attempts,
                        },
                        deps.extractor.clone(),
                        config.extract.clip_secs,
                        Duration::from_millis(resolver.request_delay_ms),
                    )),
                    TierKind::Search => Box::new(SearchTier::new(
                        source.clone(),
                        QueryFilter::from_config(resolver),
                    )),
                    TierKind::Mood => Box::new(KeywordTier::new(
                        TierKind::Mood,
                        source.clone(),
                        resolver.mood_fallbacks.clone(),
                    )),
                    TierKind::Generic => Box::new(KeywordTier::new(
                        TierKind::Generic,
                        source.clone(),
                        vec![resolver.generic_fallback.clone()],
                    )),
                }
            })
            .collect();
        AssetResolver {
            tiers,
            scorer: ClipScorer::from_config(resolver),
        }
    }

    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|t| t.kind()).collect()
    }

    /// Collect up to `request.wanted` unique candidates, best match for the
    /// segment text first. Never fails; an empty result means every tier
    /// came up dry.
    pub async fn resolve(
        &self,
        request: &ResolveRequest,
        ctx: &mut ResolutionContext,
    ) -> Vec<AssetCandidate> {
        let mut found = Vec::with_capacity(request.wanted);
        for tier in &self.tiers {
            if request.is_satisfied(&found) {
                break;
            }
            let before = found.len();
            tier.attempt_resolve(request, &mut found, ctx).await;
            tracing::info!(
                "[RESOLVER] segment {} tier {}: +{} ({}/{})",
                request.segment_index,
                tier.kind().as_str(),
                found.len() - before,
                found.len(),
                request.wanted
            );
            if tier.is_exclusive() {
                break;
            }
        }
        if found.is_empty() {
            tracing::warn!(
                "[RESOLVER] segment {} ('{}'): all sources exhausted",
                request.segment_index,
                request.query
            );
        }
        self.scorer.rank(&request.text, &request.query, &mut found);
        found
    }
}

/// Remove a candidate file that failed half way. Missing files are fine.
pub(crate) async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

/// Uniform draw in `[0, 1)` for clip placement.
pub(crate) fn start_fraction(ctx: &mut ResolutionContext) -> f64 {
    ctx.rng().gen::<f64>()
}
