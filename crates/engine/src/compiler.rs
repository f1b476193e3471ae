use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::align_segments;
use crate::fallback::{fixed_interval_scenes, rhythmic_scenes, PacingCurve};
use crate::split::split_scenes;
use crate::timeline::{close_gaps, secs_to_ticks, Scene, Script, WordTiming};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("min_alignment_ratio must be within 0..=1, got {0}")]
    AlignmentRatio(f64),
    #[error("timeline has no duration")]
    EmptyTimeline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneSettings {
    pub max_scene_duration: f64,
    pub min_scene_duration: f64,
    pub fixed_window: f64,
    pub pacing: PacingCurve,
    /// Below this share of matched segments, alignment counts as failed.
    pub min_alignment_ratio: f64,
}

impl Default for SceneSettings {
    fn default() -> Self {
        SceneSettings {
            max_scene_duration: 3.0,
            min_scene_duration: 0.25,
            fixed_window: 2.0,
            pacing: PacingCurve::default(),
            min_alignment_ratio: 0.8,
        }
    }
}

impl SceneSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let positive = [
            ("max_scene_duration", self.max_scene_duration),
            ("min_scene_duration", self.min_scene_duration),
            ("fixed_window", self.fixed_window),
            ("pacing.max_secs", self.pacing.max_secs),
            ("pacing.opening_max_secs", self.pacing.opening_max_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SettingsError::NotPositive { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.min_alignment_ratio) {
            return Err(SettingsError::AlignmentRatio(self.min_alignment_ratio));
        }
        Ok(())
    }

    pub fn max_scene_ticks(&self) -> i64 {
        secs_to_ticks(self.max_scene_duration)
    }

    pub fn min_scene_ticks(&self) -> i64 {
        secs_to_ticks(self.min_scene_duration)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SceneStrategy {
    Aligned,
    Rhythmic,
    FixedInterval,
}

impl SceneStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStrategy::Aligned => "aligned",
            SceneStrategy::Rhythmic => "rhythmic",
            SceneStrategy::FixedInterval => "fixed_interval",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBuild {
    pub scenes: Vec<Scene>,
    pub strategy: SceneStrategy,
    pub unmatched_segments: Vec<usize>,
    pub hook_end_ticks: Option<i64>,
}

impl SceneBuild {
    /// Sum of scene durations per segment, for segments that own scenes.
    pub fn segment_duration_ticks(&self, segment_index: usize) -> Option<i64> {
        let total: i64 = self
            .scenes
            .iter()
            .filter(|s| s.segment_index == Some(segment_index))
            .map(|s| s.duration_ticks())
            .sum();
        (total > 0).then_some(total)
    }
}

/// Turn a script and its (possibly missing) word timings into final scenes.
///
/// Aligned scenes are preferred; a failed or materially incomplete alignment
/// falls back to rhythmic cutting, and missing timings to fixed windows.
/// Every path returns scenes that tile `[0, total_ticks]`.
pub fn compile_scenes(
    script: &Script,
    timings: &[WordTiming],
    total_ticks: i64,
    settings: &SceneSettings,
) -> Result<SceneBuild, SettingsError> {
    settings.validate()?;
    if total_ticks <= 0 {
        return Err(SettingsError::EmptyTimeline);
    }
    let max_ticks = settings.max_scene_ticks();
    let min_ticks = settings.min_scene_ticks();

    if !timings.is_empty() {
        match align_segments(&script.hook, &script.segments, timings) {
            Ok(report) if report.matched_ratio() >= settings.min_alignment_ratio => {
                if !report.is_complete() {
                    tracing::warn!(
                        "[COMPILER] {} of {} segments unmatched, their time goes to neighbours",
                        report.unmatched.len(),
                        report.segment_count
                    );
                }
                let closed = close_gaps(report.scenes, total_ticks, min_ticks);
                return Ok(SceneBuild {
                    scenes: split_scenes(&closed, max_ticks),
                    strategy: SceneStrategy::Aligned,
                    unmatched_segments: report.unmatched,
                    hook_end_ticks: report.hook_end_ticks,
                });
            }
            Ok(report) => {
                tracing::warn!(
                    "[COMPILER] alignment too incomplete ({:.0}% matched), using rhythmic cuts",
                    report.matched_ratio() * 100.0
                );
            }
            Err(mismatch) => {
                tracing::warn!("[COMPILER] {}, using rhythmic cuts", mismatch);
            }
        }

        if let Some(scenes) = rhythmic_scenes(timings, total_ticks, &settings.pacing, min_ticks) {
            return Ok(SceneBuild {
                scenes: split_scenes(&scenes, max_ticks),
                strategy: SceneStrategy::Rhythmic,
                unmatched_segments: (0..script.segments.len()).collect(),
                hook_end_ticks: None,
            });
        }
    }

    tracing::warn!("[COMPILER] no word timings, slicing fixed windows");
    Ok(SceneBuild {
        scenes: fixed_interval_scenes(total_ticks, secs_to_ticks(settings.fixed_window)),
        strategy: SceneStrategy::FixedInterval,
        unmatched_segments: (0..script.segments.len()).collect(),
        hook_end_ticks: None,
    })
}
