//! Similarity scoring over normalized titles.
//!
//! The engine consumes scores through the [`Similarity`] trait so tests can
//! substitute deterministic fakes; [`FuzzScorer`] is the production
//! implementation built on `strsim` edit-distance primitives.

use strsim::normalized_levenshtein;

/// Two named scoring operations over a pair of normalized strings.
///
/// Both return integers in [0, 100], are pure and deterministic for
/// identical inputs. The primary measure is the main Stage 1 filter; the
/// secondary measure is the tie-breaker and the extra Stage 3 filter.
pub trait Similarity {
    fn primary(&self, a: &str, b: &str) -> u32;
    fn secondary(&self, a: &str, b: &str) -> u32;
}

/// Weighted-ratio scorer in the fuzzywuzzy style: the primary measure blends
/// a plain edit ratio with token-sort and best-substring ratios, the
/// secondary measure is the token-sort ratio alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct FuzzScorer;

impl Similarity for FuzzScorer {
    fn primary(&self, a: &str, b: &str) -> u32 {
        to_percent(weighted_ratio(a, b))
    }

    fn secondary(&self, a: &str, b: &str) -> u32 {
        to_percent(token_sort_ratio(a, b))
    }
}

fn to_percent(x: f64) -> u32 {
    (x * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Plain normalized edit ratio; empty-vs-empty counts as a perfect match.
fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    normalized_levenshtein(a, b)
}

/// Edit ratio over whitespace tokens sorted into a canonical order, so word
/// reordering ("zelda ii adventure of link" vs "adventure of link zelda ii")
/// does not tank the score.
fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let mut ta: Vec<&str> = a.split_whitespace().collect();
    let mut tb: Vec<&str> = b.split_whitespace().collect();
    ta.sort_unstable();
    tb.sort_unstable();
    ratio(&ta.join(" "), &tb.join(" "))
}

/// Best edit ratio of the shorter string against every same-length character
/// window of the longer one. Rewards "super metroid" inside
/// "super metroid special edition".
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    if short_len == 0 {
        return if long.is_empty() { 1.0 } else { 0.0 };
    }

    let long_chars: Vec<char> = long.chars().collect();
    let mut best: f64 = 0.0;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 1.0 {
            break;
        }
    }
    best
}

/// Blend of the three ratios. Substring and token-sort matches are
/// discounted so an exact full-string match always wins outright.
fn weighted_ratio(a: &str, b: &str) -> f64 {
    let base = ratio(a, b);
    let token = 0.95 * token_sort_ratio(a, b);
    let partial = 0.90 * partial_ratio(a, b);
    base.max(token).max(partial)
}
