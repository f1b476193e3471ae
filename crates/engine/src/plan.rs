use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compiler::SceneStrategy;
use crate::timeline::{check_partition, PartitionError, Scene, TICKS_PER_SECOND};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Local,
    Curated,
    Search,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Local => "local",
            SourceTier::Curated => "curated",
            SourceTier::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Bound,
    /// Resolution or probing failed; the asset was borrowed from a neighbour.
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneAssetBinding {
    pub scene: Scene,
    pub asset_uri: String,
    pub asset_path: PathBuf,
    pub source_tier: SourceTier,
    pub in_ticks: i64,
    pub out_ticks: i64,
    /// Extra passes over the asset when it is shorter than the scene.
    #[serde(default)]
    pub loops: u32,
    pub state: BindingState,
}

impl SceneAssetBinding {
    pub fn window_ticks(&self) -> i64 {
        self.out_ticks - self.in_ticks
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan has no bindings")]
    Empty,
    #[error("scenes do not cover the timeline: {0}")]
    Partition(#[from] PartitionError),
    #[error("binding {index} window is {window} ticks but its scene lasts {scene}")]
    WindowMismatch { index: usize, window: i64, scene: i64 },
    #[error("binding {0} starts before the asset does")]
    NegativeInPoint(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelinePlan {
    pub ticks_per_second: i64,
    pub total_ticks: i64,
    pub strategy: SceneStrategy,
    pub bindings: Vec<SceneAssetBinding>,
    #[serde(default)]
    pub reshuffle_events: u32,
    /// Where the spoken hook ends, when the voiceover opens with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_end_ticks: Option<i64>,
}

impl TimelinePlan {
    pub fn new(
        total_ticks: i64,
        strategy: SceneStrategy,
        bindings: Vec<SceneAssetBinding>,
        reshuffle_events: u32,
    ) -> Self {
        TimelinePlan {
            ticks_per_second: TICKS_PER_SECOND,
            total_ticks,
            strategy,
            bindings,
            reshuffle_events,
            hook_end_ticks: None,
        }
    }

    /// A plan is renderable only when its scenes tile the whole timeline and
    /// every binding supplies exactly its scene's duration.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.bindings.is_empty() {
            return Err(PlanError::Empty);
        }
        let scenes: Vec<Scene> = self.bindings.iter().map(|b| b.scene.clone()).collect();
        check_partition(&scenes, self.total_ticks)?;

        for (index, binding) in self.bindings.iter().enumerate() {
            if binding.in_ticks < 0 {
                return Err(PlanError::NegativeInPoint(index));
            }
            let scene = binding.scene.duration_ticks();
            if binding.window_ticks() != scene {
                return Err(PlanError::WindowMismatch {
                    index,
                    window: binding.window_ticks(),
                    scene,
                });
            }
        }
        Ok(())
    }

    pub fn degraded_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| b.state == BindingState::Degraded)
            .count()
    }

    /// URIs that more than one segment was freshly bound to. Sub-cuts of one
    /// segment and degraded reuse share an asset legitimately and are ignored.
    pub fn duplicate_assets(&self) -> Vec<String> {
        // Unowned scenes (fallback strategies) are keyed by their start.
        let mut owners: BTreeMap<&str, BTreeSet<(Option<usize>, i64)>> = BTreeMap::new();
        for binding in self.bindings.iter().filter(|b| b.state == BindingState::Bound) {
            let owner = match binding.scene.segment_index {
                Some(idx) => (Some(idx), 0),
                None => (None, binding.scene.start_ticks),
            };
            owners
                .entry(binding.asset_uri.as_str())
                .or_default()
                .insert(owner);
        }
        owners
            .into_iter()
            .filter(|(_, segments)| segments.len() > 1)
            .map(|(uri, _)| uri.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(start: i64, end: i64, uri: &str, segment: Option<usize>) -> SceneAssetBinding {
        let mut scene = Scene::new(start, end, "x");
        scene.segment_index = segment;
        SceneAssetBinding {
            scene,
            asset_uri: uri.to_string(),
            asset_path: PathBuf::from(format!("/tmp/{uri}.mp4")),
            source_tier: SourceTier::Search,
            in_ticks: 0,
            out_ticks: end - start,
            loops: 0,
            state: BindingState::Bound,
        }
    }

    #[test]
    fn validates_contiguous_plan() {
        let plan = TimelinePlan::new(
            300,
            SceneStrategy::Aligned,
            vec![binding(0, 100, "a", Some(0)), binding(100, 300, "b", Some(1))],
            0,
        );
        assert!(plan.validate().is_ok());
        assert!(plan.duplicate_assets().is_empty());
    }

    #[test]
    fn rejects_short_coverage() {
        let plan = TimelinePlan::new(
            400,
            SceneStrategy::Aligned,
            vec![binding(0, 100, "a", Some(0)), binding(100, 300, "b", Some(1))],
            0,
        );
        assert!(matches!(
            plan.validate(),
            Err(PlanError::Partition(PartitionError::Coverage { .. }))
        ));
    }

    #[test]
    fn rejects_window_that_differs_from_scene() {
        let mut b = binding(0, 100, "a", Some(0));
        b.out_ticks = 90;
        let plan = TimelinePlan::new(100, SceneStrategy::Aligned, vec![b], 0);
        assert_eq!(
            plan.validate(),
            Err(PlanError::WindowMismatch {
                index: 0,
                window: 90,
                scene: 100
            })
        );
    }

    #[test]
    fn empty_plan_is_invalid() {
        let plan = TimelinePlan::new(100, SceneStrategy::FixedInterval, Vec::new(), 0);
        assert_eq!(plan.validate(), Err(PlanError::Empty));
    }

    #[test]
    fn subcuts_of_one_segment_are_not_duplicates() {
        let plan = TimelinePlan::new(
            200,
            SceneStrategy::Aligned,
            vec![binding(0, 100, "a", Some(0)), binding(100, 200, "a", Some(0))],
            0,
        );
        assert!(plan.duplicate_assets().is_empty());
    }

    #[test]
    fn asset_shared_across_segments_is_a_duplicate() {
        let plan = TimelinePlan::new(
            300,
            SceneStrategy::Aligned,
            vec![
                binding(0, 100, "a", Some(0)),
                binding(100, 200, "a", Some(0)),
                binding(200, 300, "a", Some(1)),
            ],
            0,
        );
        assert_eq!(plan.duplicate_assets(), vec!["a".to_string()]);
    }
}
