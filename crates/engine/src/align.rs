//! Matching script segments against TTS word timings.
//!
//! The walk is forward-only. A timing word that does not match the next
//! expected script word is absorbed (TTS pronunciation drift, numbers read out,
//! stray punctuation tokens) instead of triggering a backtrack.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timeline::{Scene, ScriptSegment, WordTiming};

/// How many timing tokens may be skipped between two words of the same
/// segment before the segment is considered lost.
pub const MAX_DRIFT_TOKENS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("none of {segments} segments matched {words} timed words")]
pub struct AlignmentMismatch {
    pub segments: usize,
    pub words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentReport {
    pub scenes: Vec<Scene>,
    pub unmatched: Vec<usize>,
    pub segment_count: usize,
    /// End of the spoken hook, when the hook preceded the first segment.
    pub hook_end_ticks: Option<i64>,
}

impl AlignmentReport {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }

    pub fn matched_ratio(&self) -> f64 {
        if self.segment_count == 0 {
            return 0.0;
        }
        self.scenes.len() as f64 / self.segment_count as f64
    }
}

/// Lowercase and drop punctuation; apostrophes vanish ("don't" -> "dont").
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Split text into normalised tokens. Hyphens, slashes and the like separate
/// tokens so "well-known" and the TTS pair "well" "known" line up.
pub fn normalize_text(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == '-' || c == '/' || c == '—')
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

struct Token {
    text: String,
    timing: usize,
}

fn tokenize_timings(timings: &[WordTiming]) -> Vec<Token> {
    timings
        .iter()
        .enumerate()
        .flat_map(|(timing, w)| {
            normalize_text(&w.word)
                .into_iter()
                .map(move |text| Token { text, timing })
        })
        .collect()
}

struct Matched {
    first: usize,
    last: usize,
    next_cursor: usize,
}

/// Find `words` in order starting at or after `cursor`.
///
/// Every occurrence of the lead word is a possible anchor. An attempt that
/// drifts too far or runs out of input is retried from the next occurrence,
/// so a common lead word inside an earlier, unmatched segment's speech cannot
/// shadow the real one. With `bounded_lead` the anchor itself must sit within
/// the drift limit of `cursor`.
fn match_words(tokens: &[Token], words: &[String], cursor: usize, bounded_lead: bool) -> Option<Matched> {
    let lead = words.first()?;
    let mut from = cursor;
    loop {
        let anchor = from + tokens.get(from..)?.iter().position(|t| &t.text == lead)?;
        if bounded_lead && anchor - cursor > MAX_DRIFT_TOKENS {
            return None;
        }
        if let Some(m) = match_from(tokens, words, anchor, cursor, bounded_lead) {
            return Some(m);
        }
        from = anchor + 1;
    }
}

fn match_from(
    tokens: &[Token],
    words: &[String],
    anchor: usize,
    cursor: usize,
    bounded_lead: bool,
) -> Option<Matched> {
    let mut first = tokens[anchor].timing;
    let mut last = first;
    let mut matched = 1;
    let mut skipped = 0;
    let mut pos = anchor + 1;

    while pos < tokens.len() && matched < words.len() {
        let text = &tokens[pos].text;
        if *text == words[matched] {
            last = tokens[pos].timing;
            matched += 1;
            skipped = 0;
        } else if matched == 1 && *text == words[0] && !(bounded_lead && pos - cursor > MAX_DRIFT_TOKENS) {
            // A repeated lead word before the second word moves the anchor.
            first = tokens[pos].timing;
            last = first;
            skipped = 0;
        } else {
            skipped += 1;
            if skipped > MAX_DRIFT_TOKENS {
                return None;
            }
        }
        pos += 1;
    }

    (matched == words.len()).then_some(Matched {
        first,
        last,
        next_cursor: pos,
    })
}

/// Produce one scene per matched segment, spanning its first matched word's
/// start to its last matched word's end.
///
/// A segment that cannot be completed anywhere ahead of the cursor is dropped
/// and the cursor stays where it was, so the following segments can still
/// match.
pub fn align_segments(
    hook: &str,
    segments: &[ScriptSegment],
    timings: &[WordTiming],
) -> Result<AlignmentReport, AlignmentMismatch> {
    let tokens = tokenize_timings(timings);
    let mut cursor = 0;
    let mut hook_end_ticks = None;

    let hook_words = normalize_text(hook);
    if !hook_words.is_empty() {
        if let Some(m) = match_words(&tokens, &hook_words, 0, true) {
            hook_end_ticks = Some(timings[m.last].end_ticks());
            cursor = m.next_cursor;
        }
    }

    let mut scenes = Vec::new();
    let mut unmatched = Vec::new();
    for (position, segment) in segments.iter().enumerate() {
        let words = normalize_text(&segment.text);
        if words.is_empty() {
            unmatched.push(position);
            continue;
        }
        match match_words(&tokens, &words, cursor, false) {
            Some(m) => {
                scenes.push(Scene::for_segment(
                    timings[m.first].start_ticks(),
                    timings[m.last].end_ticks(),
                    segment.text.trim(),
                    segment.order_index,
                ));
                cursor = m.next_cursor;
            }
            None => {
                tracing::debug!(
                    "[ALIGN] segment {} did not match, cursor stays at {}",
                    segment.order_index,
                    cursor
                );
                unmatched.push(position);
            }
        }
    }

    if scenes.is_empty() {
        return Err(AlignmentMismatch {
            segments: segments.len(),
            words: timings.len(),
        });
    }

    Ok(AlignmentReport {
        scenes,
        unmatched,
        segment_count: segments.len(),
        hook_end_ticks,
    })
}
