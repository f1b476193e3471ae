use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CursorKey {
    Segment(usize),
    Asset(String),
}

/// Mutable state of one generation run.
///
/// Holds the URIs already handed out, the offset cursors used by the
/// assigner, and the local pool pass. A context is created per run and
/// dropped with it.
pub struct ResolutionContext {
    seen: HashSet<String>,
    cursors: HashMap<CursorKey, i64>,
    rng: StdRng,
    local_pass: Vec<usize>,
    local_passes: u32,
    reshuffles: u32,
}

impl ResolutionContext {
    pub fn new(seed: u64) -> Self {
        ResolutionContext {
            seen: HashSet::new(),
            cursors: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            local_pass: Vec::new(),
            local_passes: 0,
            reshuffles: 0,
        }
    }

    pub fn is_seen(&self, uri: &str) -> bool {
        self.seen.contains(uri)
    }

    /// Returns false when the URI had already been handed out in this run.
    pub fn mark_seen(&mut self, uri: &str) -> bool {
        self.seen.insert(uri.to_string())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn cursor(&self, key: &CursorKey) -> i64 {
        self.cursor_of(key).unwrap_or(0)
    }

    /// `None` until the key has been read from once in this run.
    pub fn cursor_of(&self, key: &CursorKey) -> Option<i64> {
        self.cursors.get(key).copied()
    }

    pub fn set_cursor(&mut self, key: CursorKey, ticks: i64) {
        self.cursors.insert(key, ticks);
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn record_reshuffle(&mut self) {
        self.reshuffles += 1;
    }

    pub fn reshuffle_events(&self) -> u32 {
        self.reshuffles
    }

    /// Draw the next local pool index without replacement.
    ///
    /// Indices for which `prefer` holds are taken first; otherwise the pass
    /// order is random. When the pass runs dry it is refilled, which after
    /// the first pass counts as a reshuffle.
    pub fn next_local(&mut self, pool_len: usize, prefer: impl Fn(usize) -> bool) -> Option<usize> {
        if pool_len == 0 {
            return None;
        }
        if self.local_pass.is_empty() {
            if self.local_passes > 0 {
                self.record_reshuffle();
                tracing::warn!(
                    "[CONTEXT] local pool of {} exhausted, reshuffling (event {})",
                    pool_len,
                    self.reshuffles
                );
            }
            self.local_passes += 1;
            let mut pass: Vec<usize> = (0..pool_len).collect();
            pass.shuffle(&mut self.rng);
            self.local_pass = pass;
        }
        let position = self
            .local_pass
            .iter()
            .position(|&idx| prefer(idx))
            .unwrap_or(0);
        Some(self.local_pass.remove(position))
    }

    pub fn local_pass_remaining(&self) -> usize {
        self.local_pass.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_set_rejects_repeats() {
        let mut ctx = ResolutionContext::new(1);
        assert!(ctx.mark_seen("https://example.com/a.mp4"));
        assert!(!ctx.mark_seen("https://example.com/a.mp4"));
        assert!(ctx.is_seen("https://example.com/a.mp4"));
    }

    #[test]
    fn fresh_context_forgets_previous_run() {
        let mut first = ResolutionContext::new(1);
        first.mark_seen("uri");
        let second = ResolutionContext::new(1);
        assert!(!second.is_seen("uri"));
    }

    #[test]
    fn cursors_are_keyed_per_segment_and_asset() {
        let mut ctx = ResolutionContext::new(1);
        ctx.set_cursor(CursorKey::Segment(2), 480);
        ctx.set_cursor(CursorKey::Asset("a".into()), 96);
        assert_eq!(ctx.cursor(&CursorKey::Segment(2)), 480);
        assert_eq!(ctx.cursor(&CursorKey::Segment(3)), 0);
        assert_eq!(ctx.cursor(&CursorKey::Asset("a".into())), 96);
        assert_eq!(ctx.cursor_of(&CursorKey::Segment(3)), None);
    }

    #[test]
    fn local_pass_is_without_replacement_then_reshuffles() {
        let mut ctx = ResolutionContext::new(42);
        let mut drawn: Vec<usize> = (0..3).filter_map(|_| ctx.next_local(3, |_| false)).collect();
        drawn.sort();
        assert_eq!(drawn, vec![0, 1, 2]);
        assert_eq!(ctx.reshuffle_events(), 0);

        assert!(ctx.next_local(3, |_| false).is_some());
        assert_eq!(ctx.reshuffle_events(), 1);
    }

    #[test]
    fn local_pass_prefers_matching_index() {
        let mut ctx = ResolutionContext::new(7);
        assert_eq!(ctx.next_local(5, |idx| idx == 3), Some(3));
        assert_eq!(ctx.local_pass_remaining(), 4);
    }

    #[test]
    fn same_seed_same_order() {
        let mut a = ResolutionContext::new(9);
        let mut b = ResolutionContext::new(9);
        let first: Vec<_> = (0..4).filter_map(|_| a.next_local(4, |_| false)).collect();
        let second: Vec<_> = (0..4).filter_map(|_| b.next_local(4, |_| false)).collect();
        assert_eq!(first, second);
    }
}
