//! Title normalization for catalog/recommendation comparison.
//!
//! Both catalog names and scraped titles go through [`clean_title`] before any
//! scoring; two raw titles with the same cleaned form are textually
//! equivalent. Cleaning is pure and idempotent.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Bracketed qualifier text: "[!]", "[b1]", "[T+Eng]" and wiki reference
/// markers like "[1]".
static BRACKET_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]*\]").unwrap());

/// Parenthesized qualifier text: "(USA)", "(En,Fr,De)", "(Rev 1)".
static PAREN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());

/// Multi-part release indicator, e.g. "(Disc 2)". Matched anywhere in the raw
/// name since region and language tags often follow it.
static PART_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\((?:Disc|Disk|Side|Tape)\s+(\d+)\)").unwrap());

/// Regex to collapse any whitespace run (including tabs and newlines) into a
/// single space
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII by applying NFKD decomposition,
/// removing combining marks and transliterating what remains.
/// e.g. "Pokémon" → "pokemon".
fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a raw title for comparison.
///
/// Strips bracketed and parenthesized qualifiers, folds to lowercase ASCII,
/// drops punctuation (hyphens become spaces) and collapses whitespace.
/// Total over all inputs; the empty string normalizes to itself.
pub fn clean_title(raw: &str) -> String {
    let result = BRACKET_TAG.replace_all(raw, "");
    let result = PAREN_TAG.replace_all(&result, "");
    let folded = fold_to_ascii(&result);

    let mut stripped = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c == '-' {
            stripped.push(' ');
        } else if !c.is_ascii_punctuation() {
            stripped.push(c);
        }
    }

    MULTI_SPACE.replace_all(stripped.trim(), " ").trim().to_string()
}

/// Normalized name with any disc/part indicator removed.
///
/// Used only for grouping sibling parts of a multi-part release; the main
/// scoring never sees it. Two entries belong to the same release iff their
/// base names are exactly equal.
pub fn base_name(raw: &str) -> String {
    clean_title(&PART_TAG.replace_all(raw, ""))
}

/// Part number of a multi-part release indicator in the raw name, if any.
pub fn part_number(raw: &str) -> Option<u32> {
    PART_TAG
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether the raw name marks the first part of a multi-part release.
pub fn is_first_part(raw: &str) -> bool {
    part_number(raw) == Some(1)
}
