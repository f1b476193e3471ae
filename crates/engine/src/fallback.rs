//! Scene generation when segment alignment is not possible.

use serde::{Deserialize, Serialize};

use crate::timeline::{close_gaps, secs_to_ticks, Scene, WordTiming};

/// Cut cap that depends on where the scene starts: tighter in the opening
/// seconds, where retention is decided.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PacingCurve {
    pub opening_window_secs: f64,
    pub opening_max_secs: f64,
    pub max_secs: f64,
}

impl Default for PacingCurve {
    fn default() -> Self {
        PacingCurve {
            opening_window_secs: 5.0,
            opening_max_secs: 1.5,
            max_secs: 2.0,
        }
    }
}

impl PacingCurve {
    pub fn flat(max_secs: f64) -> Self {
        PacingCurve {
            opening_window_secs: 0.0,
            opening_max_secs: max_secs,
            max_secs,
        }
    }

    pub fn max_ticks_at(&self, scene_start_ticks: i64) -> i64 {
        if scene_start_ticks < secs_to_ticks(self.opening_window_secs) {
            secs_to_ticks(self.opening_max_secs)
        } else {
            secs_to_ticks(self.max_secs)
        }
    }
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end()
        .trim_end_matches(['"', '\'', ')'])
        .ends_with(['.', '?', '!'])
}

/// Rhythmic cutting over raw word timings.
///
/// A scene is closed when it reaches the pacing cap, at a sentence-ending
/// word, or at the final word. Returns `None` when there are no timings.
pub fn rhythmic_scenes(
    timings: &[WordTiming],
    total_ticks: i64,
    pacing: &PacingCurve,
    min_ticks: i64,
) -> Option<Vec<Scene>> {
    let first = timings.first()?;

    let mut scenes = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    let mut scene_start = first.start_ticks();
    let mut hard_cuts = 0;

    for (i, timing) in timings.iter().enumerate() {
        words.push(timing.word.trim());
        let elapsed = timing.end_ticks() - scene_start;

        let over_cap = elapsed >= pacing.max_ticks_at(scene_start);
        let is_last = i + 1 == timings.len();
        if over_cap || ends_sentence(&timing.word) || is_last {
            if over_cap {
                hard_cuts += 1;
            }
            scenes.push(Scene::new(scene_start, timing.end_ticks(), words.join(" ")));
            words.clear();
            if let Some(next) = timings.get(i + 1) {
                scene_start = next.start_ticks();
            }
        }
    }

    tracing::debug!(
        "[FALLBACK] rhythmic: {} scenes from {} words ({} hard cuts)",
        scenes.len(),
        timings.len(),
        hard_cuts
    );
    Some(close_gaps(scenes, total_ticks, min_ticks))
}

/// Equal windows over `[0, total]`; only the last window may be shorter.
pub fn fixed_interval_scenes(total_ticks: i64, window_ticks: i64) -> Vec<Scene> {
    if total_ticks <= 0 {
        return Vec::new();
    }
    if window_ticks <= 0 {
        return vec![Scene::new(0, total_ticks, "Scene 1")];
    }

    let mut scenes = Vec::new();
    let mut current = 0;
    while current < total_ticks {
        let end = (current + window_ticks).min(total_ticks);
        scenes.push(Scene::new(current, end, format!("Scene {}", scenes.len() + 1)));
        current = end;
    }
    scenes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::check_partition;

    #[test]
    fn fixed_interval_count_and_last_window() {
        let total = secs_to_ticks(10.5);
        let window = secs_to_ticks(2.0);
        let scenes = fixed_interval_scenes(total, window);

        assert_eq!(scenes.len(), 6);
        for scene in &scenes[..5] {
            assert_eq!(scene.duration_ticks(), window);
        }
        assert_eq!(scenes[5].duration_ticks(), secs_to_ticks(0.5));
        assert!(scenes.iter().all(|s| s.segment_index.is_none()));
        assert!(check_partition(&scenes, total).is_ok());
    }

    #[test]
    fn fixed_interval_exact_multiple() {
        let scenes = fixed_interval_scenes(secs_to_ticks(6.0), secs_to_ticks(2.0));
        assert_eq!(scenes.len(), 3);
    }

    #[test]
    fn rhythmic_cuts_at_sentence_end_and_cap() {
        let timings = vec![
            WordTiming::new("Wake", 0.2, 0.5),
            WordTiming::new("up.", 0.5, 0.9),
            WordTiming::new("Nobody", 1.0, 1.6),
            WordTiming::new("is", 1.6, 1.8),
            WordTiming::new("coming", 1.8, 2.6),
            WordTiming::new("to", 2.6, 2.8),
            WordTiming::new("save", 2.8, 3.3),
            WordTiming::new("you", 3.3, 3.6),
        ];
        let total = secs_to_ticks(4.0);
        let scenes =
            rhythmic_scenes(&timings, total, &PacingCurve::flat(1.5), secs_to_ticks(0.1)).unwrap();

        assert_eq!(scenes[0].text, "Wake up.");
        assert_eq!(scenes[1].text, "Nobody is coming");
        assert!(check_partition(&scenes, total).is_ok());
        assert!(scenes.iter().all(|s| s.segment_index.is_none()));
    }

    #[test]
    fn opening_window_uses_tighter_cap() {
        let pacing = PacingCurve::default();
        assert_eq!(pacing.max_ticks_at(0), secs_to_ticks(1.5));
        assert_eq!(pacing.max_ticks_at(secs_to_ticks(6.0)), secs_to_ticks(2.0));
    }

    #[test]
    fn rhythmic_without_timings_is_none() {
        assert!(rhythmic_scenes(&[], 100, &PacingCurve::default(), 0).is_none());
    }
}
