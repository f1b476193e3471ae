use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use engine::SourceTier;

use crate::config::CategoryRule;
use crate::context::ResolutionContext;
use crate::media::extract::{ClipExtractor, ClipRequest};
use crate::retrieval::query::classify_category;
use crate::retrieval::{
    discard, polite_pause, start_fraction, AssetCandidate, ResolutionTier, ResolveRequest,
    RetryPolicy, TierKind,
};

/// Hand-maintained long-form links per category, cut down by the extractor.
pub struct CuratedTier {
    table: Vec<CategoryRule>,
    default_category: String,
    links: BTreeMap<String, Vec<String>>,
    retry: RetryPolicy,
    extractor: Arc<dyn ClipExtractor>,
    clip_secs: f64,
    delay: Duration,
}

impl CuratedTier {
    pub fn new(
        table: Vec<CategoryRule>,
        default_category: String,
        links: BTreeMap<String, Vec<String>>,
        retry: RetryPolicy,
        extractor: Arc<dyn ClipExtractor>,
        clip_secs: f64,
        delay: Duration,
    ) -> Self {
        CuratedTier {
            table,
            default_category,
            links,
            retry,
            extractor,
            clip_secs,
            delay,
        }
    }

    pub fn category_for(&self, query: &str) -> String {
        classify_category(query, &self.table)
            .unwrap_or(&self.default_category)
            .to_string()
    }
}

#[async_trait::async_trait]
impl ResolutionTier for CuratedTier {
    fn kind(&self) -> TierKind {
        TierKind::Curated
    }

    async fn attempt_resolve(
        &self,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    ) {
        let category = self.category_for(&request.query);
        let Some(links) = self.links.get(&category) else {
            tracing::debug!("[CURATED] no links for category {}", category);
            return;
        };
        let fresh: Vec<&String> = links.iter().filter(|link| !ctx.is_seen(link)).collect();
        let attempts: Vec<String> = self
            .retry
            .select(&fresh, ctx.rng())
            .into_iter()
            .map(|link| link.to_string())
            .collect();

        for link in attempts {
            if request.is_satisfied(found) {
                break;
            }
            let clip = ClipRequest {
                target_secs: self.clip_secs.max(request.target_secs),
                dest: request.clip_path(found.len()),
                start_fraction: start_fraction(ctx),
            };
            match self.extractor.extract(&link, &clip).await {
                Ok(()) => {
                    ctx.mark_seen(&link);
                    found.push(AssetCandidate {
                        uri: link,
                        source_tier: SourceTier::Curated,
                        category: Some(category.clone()),
                        path: clip.dest,
                        score: 0,
                    });
                }
                Err(e) => {
                    tracing::warn!("[CURATED] {} skipped: {}", link, e);
                    discard(&clip.dest).await;
                }
            }
            polite_pause(self.delay).await;
        }
    }
}
