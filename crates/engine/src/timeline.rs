use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TICKS_PER_SECOND: i64 = 48000;

pub fn secs_to_ticks(secs: f64) -> i64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * TICKS_PER_SECOND as f64).round() as i64
}

pub fn ticks_to_secs(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// One author-defined unit of script text plus the footage query for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptSegment {
    #[serde(default)]
    pub order_index: usize,
    pub text: String,
    pub visual_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    #[serde(default)]
    pub hook: String,
    pub segments: Vec<ScriptSegment>,
}

impl Script {
    pub fn from_parts<T, Q>(hook: &str, segments: impl IntoIterator<Item = (T, Q)>) -> Self
    where
        T: Into<String>,
        Q: Into<String>,
    {
        let segments = segments
            .into_iter()
            .enumerate()
            .map(|(order_index, (text, visual_query))| ScriptSegment {
                order_index,
                text: text.into(),
                visual_query: visual_query.into(),
            })
            .collect();
        Script {
            hook: hook.to_string(),
            segments,
        }
    }

    /// Wire scripts carry no indices; position in the list is the order.
    pub fn reindexed(mut self) -> Self {
        for (idx, segment) in self.segments.iter_mut().enumerate() {
            segment.order_index = idx;
        }
        self
    }
}

/// Word timing as reported by the TTS collaborator, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordTiming {
    pub fn new(word: &str, start: f64, end: f64) -> Self {
        WordTiming {
            word: word.to_string(),
            start,
            end,
        }
    }

    pub fn start_ticks(&self) -> i64 {
        secs_to_ticks(self.start)
    }

    pub fn end_ticks(&self) -> i64 {
        secs_to_ticks(self.end).max(self.start_ticks())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub start_ticks: i64,
    pub end_ticks: i64,
    pub text: String,
    pub segment_index: Option<usize>,
    #[serde(default)]
    pub is_subcut: bool,
    pub subcut_index: Option<usize>,
    pub total_subcuts: Option<usize>,
}

impl Scene {
    pub fn new(start_ticks: i64, end_ticks: i64, text: impl Into<String>) -> Self {
        Scene {
            start_ticks,
            end_ticks,
            text: text.into(),
            segment_index: None,
            is_subcut: false,
            subcut_index: None,
            total_subcuts: None,
        }
    }

    pub fn for_segment(
        start_ticks: i64,
        end_ticks: i64,
        text: impl Into<String>,
        segment_index: usize,
    ) -> Self {
        Scene {
            segment_index: Some(segment_index),
            ..Scene::new(start_ticks, end_ticks, text)
        }
    }

    pub fn duration_ticks(&self) -> i64 {
        self.end_ticks - self.start_ticks
    }

    pub fn start_secs(&self) -> f64 {
        ticks_to_secs(self.start_ticks)
    }

    pub fn end_secs(&self) -> f64 {
        ticks_to_secs(self.end_ticks)
    }

    pub fn duration_secs(&self) -> f64 {
        ticks_to_secs(self.duration_ticks())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("scene list is empty")]
    Empty,
    #[error("first scene starts at {0} ticks instead of 0")]
    LateStart(i64),
    #[error("gap or overlap between scene {index} and the next ({end} != {next_start})")]
    Discontinuity {
        index: usize,
        end: i64,
        next_start: i64,
    },
    #[error("scene {0} has no duration")]
    Degenerate(usize),
    #[error("timeline ends at {end} ticks, expected {total}")]
    Coverage { end: i64, total: i64 },
}

/// Check that `scenes` partition `[0, total_ticks]` with no gaps or overlaps.
pub fn check_partition(scenes: &[Scene], total_ticks: i64) -> Result<(), PartitionError> {
    let first = scenes.first().ok_or(PartitionError::Empty)?;
    if first.start_ticks != 0 {
        return Err(PartitionError::LateStart(first.start_ticks));
    }
    for (index, scene) in scenes.iter().enumerate() {
        if scene.duration_ticks() <= 0 {
            return Err(PartitionError::Degenerate(index));
        }
        if let Some(next) = scenes.get(index + 1) {
            if scene.end_ticks != next.start_ticks {
                return Err(PartitionError::Discontinuity {
                    index,
                    end: scene.end_ticks,
                    next_start: next.start_ticks,
                });
            }
        }
    }
    let end = scenes.last().map(|s| s.end_ticks).unwrap_or(0);
    if end != total_ticks {
        return Err(PartitionError::Coverage {
            end,
            total: total_ticks,
        });
    }
    Ok(())
}

/// Stretch speech-bounded scenes so they tile `[0, total_ticks]`.
///
/// Leading silence goes to the first scene and every pause goes to the scene
/// before it. Scenes shorter than `min_ticks` are folded into their
/// predecessor, or into their successor when they open the timeline.
pub fn close_gaps(mut scenes: Vec<Scene>, total_ticks: i64, min_ticks: i64) -> Vec<Scene> {
    if total_ticks <= 0 {
        return Vec::new();
    }
    if scenes.is_empty() {
        return vec![Scene::new(0, total_ticks, "")];
    }

    scenes.sort_by_key(|s| s.start_ticks);
    for scene in scenes.iter_mut() {
        scene.start_ticks = scene.start_ticks.clamp(0, total_ticks);
    }
    scenes[0].start_ticks = 0;
    let count = scenes.len();
    for idx in 0..count {
        scenes[idx].end_ticks = if idx + 1 < count {
            scenes[idx + 1].start_ticks
        } else {
            total_ticks
        };
    }

    let mut merged: Vec<Scene> = Vec::with_capacity(count);
    let mut pending: Option<Scene> = None;
    for mut scene in scenes {
        if let Some(short) = pending.take() {
            scene.start_ticks = short.start_ticks;
        }
        if scene.duration_ticks() < min_ticks {
            if let Some(prev) = merged.last_mut() {
                prev.end_ticks = scene.end_ticks;
            } else {
                pending = Some(scene);
            }
            continue;
        }
        merged.push(scene);
    }
    // Everything was shorter than the minimum; keep one scene over the whole span.
    if let Some(short) = pending {
        merged.push(short);
    }
    merged
}
