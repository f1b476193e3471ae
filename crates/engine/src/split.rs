use crate::timeline::Scene;

/// Split one scene into `ceil(duration / max_ticks)` equal sub-scenes.
///
/// Remainder ticks go to the leading sub-scenes one at a time, so the parts
/// sum to the parent duration exactly and share its `[start, end]`.
pub fn split_scene(scene: &Scene, max_ticks: i64) -> Vec<Scene> {
    let duration = scene.duration_ticks();
    if max_ticks <= 0 || duration <= max_ticks {
        return vec![scene.clone()];
    }

    let parts = (duration + max_ticks - 1) / max_ticks;
    let base = duration / parts;
    let remainder = duration % parts;

    let mut start = scene.start_ticks;
    (0..parts)
        .map(|i| {
            let len = base + if i < remainder { 1 } else { 0 };
            let sub = Scene {
                start_ticks: start,
                end_ticks: start + len,
                text: scene.text.clone(),
                segment_index: scene.segment_index,
                is_subcut: true,
                subcut_index: Some(i as usize),
                total_subcuts: Some(parts as usize),
            };
            start += len;
            sub
        })
        .collect()
}

pub fn split_scenes(scenes: &[Scene], max_ticks: i64) -> Vec<Scene> {
    scenes
        .iter()
        .flat_map(|scene| split_scene(scene, max_ticks))
        .collect()
}
