use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine::timeline::secs_to_ticks;
use engine::{BindingState, Scene, SceneAssetBinding, SceneBuild, TimelinePlan};
use rand::Rng;

use crate::config::AssignConfig;
use crate::context::{CursorKey, ResolutionContext};
use crate::errors::PipelineError;
use crate::media::MediaProbe;
use crate::retrieval::rank::{breaks_variety, VARIETY_PENALTY};
use crate::retrieval::AssetCandidate;

/// Where a scene reads from inside its asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub in_ticks: i64,
    pub loops: u32,
    pub next_cursor: i64,
}

/// Pick the read window for a scene of `duration` ticks.
///
/// Consecutive scenes continue from `cursor`. When that would run past the
/// end, the window jumps forward by `jump` and wraps inside the valid range.
/// Assets shorter than the scene are looped from the start.
pub fn plan_window(length: i64, duration: i64, cursor: i64, jump: i64) -> Window {
    if length <= 0 || duration <= 0 {
        return Window {
            in_ticks: 0,
            loops: 0,
            next_cursor: 0,
        };
    }
    if duration > length {
        let passes = (duration + length - 1) / length;
        return Window {
            in_ticks: 0,
            loops: (passes - 1) as u32,
            next_cursor: 0,
        };
    }
    let latest = length - duration;
    let in_ticks = if cursor >= 0 && cursor <= latest {
        cursor
    } else {
        ((cursor.max(0) + jump.max(0)) % (latest + 1)).clamp(0, latest)
    };
    Window {
        in_ticks,
        loops: 0,
        next_cursor: in_ticks + duration,
    }
}

/// Random starting offset for the first read of an asset, leaving room for
/// `span` ticks after it.
pub fn first_cut<R: Rng + ?Sized>(length: i64, span: i64, rng: &mut R) -> i64 {
    if length <= span || span <= 0 {
        return 0;
    }
    rng.gen_range(0..=length - span)
}

#[derive(Debug, Clone)]
struct Source {
    candidate: AssetCandidate,
    length: i64,
    key: CursorKey,
}

/// Binds compiled scenes to resolved assets.
pub struct ClipAssigner {
    probe: Arc<dyn MediaProbe>,
    jump_ticks: i64,
    max_category_run: usize,
    durations: HashMap<PathBuf, Option<i64>>,
}

impl ClipAssigner {
    pub fn new(probe: Arc<dyn MediaProbe>, config: &AssignConfig) -> Self {
        ClipAssigner {
            probe,
            jump_ticks: secs_to_ticks(config.jump_cut_secs),
            max_category_run: config.max_consecutive_same_category,
            durations: HashMap::new(),
        }
    }

    async fn length_of(&mut self, path: &Path) -> Option<i64> {
        if let Some(cached) = self.durations.get(path) {
            return *cached;
        }
        let length = match self.probe.video_duration_ticks(path).await {
            Ok(ticks) if ticks > 0 => Some(ticks),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("[ASSIGN] probe failed for {}: {}", path.display(), e);
                None
            }
        };
        self.durations.insert(path.to_path_buf(), length);
        length
    }

    /// Highest-scoring probeable candidate. A pick that would repeat the
    /// category of the last few segments once too often is penalised;
    /// ties go to the earlier candidate.
    async fn best_usable(
        &mut self,
        candidates: &[AssetCandidate],
        recent: &[Option<String>],
    ) -> Option<(AssetCandidate, i64)> {
        let mut best: Option<(i64, &AssetCandidate, i64)> = None;
        for candidate in candidates {
            let Some(length) = self.length_of(&candidate.path).await else {
                continue;
            };
            let mut rank = i64::from(candidate.score);
            if breaks_variety(recent, candidate.category.as_deref(), self.max_category_run) {
                tracing::debug!(
                    "[ASSIGN] {} would repeat {:?} again, penalised",
                    candidate.uri,
                    candidate.category
                );
                rank -= VARIETY_PENALTY;
            }
            if best.map_or(true, |(top, _, _)| rank > top) {
                best = Some((rank, candidate, length));
            }
        }
        best.map(|(_, candidate, length)| (candidate.clone(), length))
    }

    async fn next_pooled(
        &mut self,
        pool: &[&AssetCandidate],
        rr: &mut usize,
        ctx: &mut ResolutionContext,
    ) -> Option<Source> {
        for _ in 0..pool.len() {
            if *rr > 0 && *rr % pool.len() == 0 {
                ctx.record_reshuffle();
                tracing::warn!("[ASSIGN] asset pool of {} exhausted, reusing", pool.len());
            }
            let candidate = pool[*rr % pool.len()];
            *rr += 1;
            if let Some(length) = self.length_of(&candidate.path).await {
                return Some(Source {
                    candidate: candidate.clone(),
                    length,
                    key: CursorKey::Asset(candidate.uri.clone()),
                });
            }
        }
        None
    }

    /// `span` is how much of the asset the source's cursor will read in
    /// total; a fresh cursor starts at a random point that leaves room for it.
    fn bind(
        &self,
        scene: &Scene,
        source: &Source,
        span: i64,
        state: BindingState,
        ctx: &mut ResolutionContext,
    ) -> SceneAssetBinding {
        let duration = scene.duration_ticks();
        let cursor = match ctx.cursor_of(&source.key) {
            Some(cursor) => cursor,
            None => first_cut(source.length, span.max(duration), ctx.rng()),
        };
        let window = plan_window(source.length, duration, cursor, self.jump_ticks);
        ctx.set_cursor(source.key.clone(), window.next_cursor);
        binding(scene, &source.candidate, window, state)
    }

    /// Build the plan. Scenes that cannot be bound reuse the previous
    /// binding's asset; only a run where nothing binds at all fails.
    pub async fn assign(
        &mut self,
        build: &SceneBuild,
        total_ticks: i64,
        resolved: &BTreeMap<usize, Vec<AssetCandidate>>,
        ctx: &mut ResolutionContext,
    ) -> Result<TimelinePlan, PipelineError> {
        let pool: Vec<&AssetCandidate> = resolved.values().flatten().collect();
        let mut rr = 0usize;
        let mut per_segment: HashMap<usize, Option<(AssetCandidate, i64)>> = HashMap::new();
        let mut slots: Vec<Option<SceneAssetBinding>> = Vec::with_capacity(build.scenes.len());
        let mut last: Option<Source> = None;
        let mut first: Option<Source> = None;
        let mut recent: Vec<Option<String>> = Vec::new();

        for scene in &build.scenes {
            let source = match scene.segment_index {
                Some(idx) => {
                    let candidates = resolved.get(&idx).map(Vec::as_slice).unwrap_or(&[]);
                    if !per_segment.contains_key(&idx) {
                        let chosen = self.best_usable(candidates, &recent).await;
                        if let Some((candidate, _)) = &chosen {
                            recent.push(candidate.category.clone());
                        }
                        per_segment.insert(idx, chosen);
                    }
                    match per_segment.get(&idx).cloned().flatten() {
                        Some((candidate, length)) => Ok(Source {
                            candidate,
                            length,
                            key: CursorKey::Segment(idx),
                        }),
                        None if candidates.is_empty() => {
                            Err(PipelineError::AllSourcesExhausted { segment_index: idx })
                        }
                        None => Err(PipelineError::AssetUnavailable(format!(
                            "no candidate of segment {idx} could be probed"
                        ))),
                    }
                }
                None => self
                    .next_pooled(&pool, &mut rr, ctx)
                    .await
                    .ok_or_else(|| PipelineError::AssetUnavailable("asset pool is empty".into())),
            };

            match source {
                Ok(source) => {
                    let span = match source.key {
                        CursorKey::Segment(idx) => build.segment_duration_ticks(idx).unwrap_or(0),
                        CursorKey::Asset(_) => scene.duration_ticks(),
                    };
                    slots.push(Some(self.bind(scene, &source, span, BindingState::Bound, ctx)));
                    first.get_or_insert_with(|| source.clone());
                    last = Some(source);
                }
                Err(e) => {
                    tracing::warn!(
                        "[ASSIGN] scene at {:.2}s degraded: {}",
                        scene.start_secs(),
                        e
                    );
                    match &last {
                        Some(previous) => slots.push(Some(self.bind(
                            scene,
                            previous,
                            scene.duration_ticks(),
                            BindingState::Degraded,
                            ctx,
                        ))),
                        None => slots.push(None),
                    }
                }
            }
        }

        let first = first.ok_or(PipelineError::NoScenesResolvable)?;

        // Leading scenes had nothing to reuse yet; they borrow the first bound asset.
        let mut cursor = 0;
        for (scene, slot) in build.scenes.iter().zip(slots.iter_mut()) {
            if slot.is_none() {
                let window = plan_window(first.length, scene.duration_ticks(), cursor, self.jump_ticks);
                cursor = window.next_cursor;
                *slot = Some(binding(scene, &first.candidate, window, BindingState::Degraded));
            }
        }

        let bindings: Vec<SceneAssetBinding> = slots.into_iter().flatten().collect();
        let mut plan = TimelinePlan::new(total_ticks, build.strategy, bindings, ctx.reshuffle_events());
        plan.hook_end_ticks = build.hook_end_ticks;
        tracing::info!(
            "[ASSIGN] {} bindings, {} degraded, {} reshuffles",
            plan.bindings.len(),
            plan.degraded_count(),
            plan.reshuffle_events
        );
        Ok(plan)
    }
}

fn binding(
    scene: &Scene,
    candidate: &AssetCandidate,
    window: Window,
    state: BindingState,
) -> SceneAssetBinding {
    SceneAssetBinding {
        scene: scene.clone(),
        asset_uri: candidate.uri.clone(),
        asset_path: candidate.path.clone(),
        source_tier: candidate.source_tier,
        in_ticks: window.in_ticks,
        out_ticks: window.in_ticks + scene.duration_ticks(),
        loops: window.loops,
        state,
    }
}
