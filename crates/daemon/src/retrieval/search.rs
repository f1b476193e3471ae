use std::sync::Arc;
use std::time::Duration;

use engine::SourceTier;
use rand::seq::SliceRandom;

use crate::context::ResolutionContext;
use crate::media::download::MediaFetcher;
use crate::media::extract::{ClipExtractor, ClipRequest};
use crate::retrieval::query::QueryFilter;
use crate::retrieval::{
    discard, polite_pause, start_fraction, AssetCandidate, ResolutionTier, ResolveRequest,
    TierKind,
};
use crate::stock::{HitSource, StockHit, StockProvider};

/// Federated search shared by the search, mood and generic tiers.
pub struct SearchSource {
    pub providers: Vec<Arc<dyn StockProvider>>,
    pub long_form: Option<Arc<dyn StockProvider>>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub extractor: Arc<dyn ClipExtractor>,
    pub min_source_duration: f64,
    pub per_page: usize,
    pub long_form_results: usize,
    pub clip_secs: f64,
    pub delay: Duration,
}

impl SearchSource {
    /// Query the stock providers in random order, then the long-form
    /// source, keeping unseen hits long enough to use.
    pub async fn fill(
        &self,
        query: &str,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    ) {
        let mut order: Vec<Arc<dyn StockProvider>> = self.providers.clone();
        order.shuffle(ctx.rng());

        for provider in order {
            if request.is_satisfied(found) {
                return;
            }
            self.search_provider(provider.as_ref(), self.per_page, query, request, found, ctx)
                .await;
        }
        if let Some(long_form) = &self.long_form {
            if !request.is_satisfied(found) {
                self.search_provider(long_form.as_ref(), self.long_form_results, query, request, found, ctx)
                    .await;
            }
        }
    }

    async fn search_provider(
        &self,
        provider: &dyn StockProvider,
        per_page: usize,
        query: &str,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    ) {
        let hits = match provider.search(query, per_page).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("[SEARCH] {} failed for '{}': {}", provider.name(), query, e);
                polite_pause(self.delay).await;
                return;
            }
        };
        polite_pause(self.delay).await;

        for hit in hits {
            if request.is_satisfied(found) {
                break;
            }
            if ctx.is_seen(&hit.uri) {
                continue;
            }
            if hit
                .duration_secs
                .is_some_and(|d| d < self.min_source_duration)
            {
                tracing::debug!("[SEARCH] {} too short, skipped", hit.uri);
                continue;
            }
            let dest = request.clip_path(found.len());
            match self.materialize(&hit, request, &dest, ctx).await {
                Ok(()) => {
                    ctx.mark_seen(&hit.uri);
                    found.push(AssetCandidate {
                        uri: hit.uri,
                        source_tier: SourceTier::Search,
                        category: None,
                        path: dest,
                        score: 0,
                    });
                }
                Err(e) => {
                    tracing::warn!("[SEARCH] {} from {} unusable: {}", hit.uri, provider.name(), e);
                    discard(&dest).await;
                }
            }
            polite_pause(self.delay).await;
        }
    }

    async fn materialize(
        &self,
        hit: &StockHit,
        request: &ResolveRequest,
        dest: &std::path::Path,
        ctx: &mut ResolutionContext,
    ) -> anyhow::Result<()> {
        match hit.source {
            HitSource::Direct => self.fetcher.fetch(&hit.download_url, dest).await,
            HitSource::LongForm => {
                let clip = ClipRequest {
                    target_secs: self.clip_secs.max(request.target_secs),
                    dest: dest.to_path_buf(),
                    start_fraction: start_fraction(ctx),
                };
                self.extractor
                    .extract(&hit.download_url, &clip)
                    .await
                    .map_err(anyhow::Error::from)
            }
        }
    }
}

/// Primary search over the segment's own query, cleaned and filtered.
pub struct SearchTier {
    source: Arc<SearchSource>,
    filter: QueryFilter,
}

impl SearchTier {
    pub fn new(source: Arc<SearchSource>, filter: QueryFilter) -> Self {
        SearchTier { source, filter }
    }
}

#[async_trait::async_trait]
impl ResolutionTier for SearchTier {
    fn kind(&self) -> TierKind {
        TierKind::Search
    }

    async fn attempt_resolve(
        &self,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    ) {
        let query = self.filter.prepare(&request.query);
        if query != request.query {
            tracing::debug!("[SEARCH] '{}' -> '{}'", request.query, query);
        }
        self.source.fill(&query, request, found, ctx).await;
    }
}

/// Fixed keyword list tried in order: the mood and generic fallbacks.
pub struct KeywordTier {
    kind: TierKind,
    source: Arc<SearchSource>,
    keywords: Vec<String>,
}

impl KeywordTier {
    pub fn new(kind: TierKind, source: Arc<SearchSource>, keywords: Vec<String>) -> Self {
        KeywordTier {
            kind,
            source,
            keywords,
        }
    }
}

#[async_trait::async_trait]
impl ResolutionTier for KeywordTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    async fn attempt_resolve(
        &self,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    ) {
        for keyword in &self.keywords {
            if request.is_satisfied(found) {
                break;
            }
            tracing::info!(
                "[SEARCH] segment {} falling back to '{}'",
                request.segment_index,
                keyword
            );
            self.source.fill(keyword, request, found, ctx).await;
        }
    }
}
