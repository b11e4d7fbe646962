//! Core data models for the catalog reconciliation pipeline.
//!
//! This module contains the struct definitions and enums shared by the
//! matching stages, the interactive review and the report builder.

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;
use serde::Serialize;

// ============================================================================
// Catalog Models
// ============================================================================

/// One `<game>` element from the input DAT.
///
/// `index` is the position in the input catalog and doubles as the entry's
/// identifier for the run; the kept-set and all tie-breaking rules are
/// expressed in input order. `xml` is the serialized original element,
/// spliced back verbatim into the filtered output.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub index: usize,
    pub name: String,
    pub norm: String,
    pub xml: String,
}

// ============================================================================
// Recommendation Models
// ============================================================================

/// Titles extracted from one recommendation page, in page order,
/// de-duplicated, already normalized.
#[derive(Clone, Debug)]
pub struct SourceList {
    pub label: String,
    pub url: String,
    pub titles: Vec<String>,
}

/// A single recommended title (normalized form).
#[derive(Clone, Debug)]
pub struct Recommendation {
    pub title: String,
}

/// Global ordered set of unique recommendations plus a title lookup.
///
/// Order is first-seen across source lists; the review stage processes
/// recommendations in exactly this order.
#[derive(Clone, Debug, Default)]
pub struct RecommendationSet {
    pub recs: Vec<Recommendation>,
    index: FxHashMap<String, usize>,
}

impl RecommendationSet {
    pub fn from_sources(sources: &[SourceList]) -> Self {
        let mut set = RecommendationSet::default();
        for source in sources {
            for title in &source.titles {
                if !set.index.contains_key(title) {
                    set.index.insert(title.clone(), set.recs.len());
                    set.recs.push(Recommendation {
                        title: title.clone(),
                    });
                }
            }
        }
        set
    }

    pub fn lookup(&self, title: &str) -> Option<usize> {
        self.index.get(title).copied()
    }

    pub fn len(&self) -> usize {
        self.recs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recs.is_empty()
    }
}

// ============================================================================
// Matching Models
// ============================================================================

/// Scores produced by the similarity provider for one (recommendation,
/// catalog entry) pair. Both values are integers in [0, 100].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateScore {
    pub primary: u32,
    pub secondary: u32,
}

/// A catalog entry that passed the threshold check for some recommendation.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub entry: usize,
    pub score: CandidateScore,
}

/// Final per-recommendation outcome. Created once, never revised.
///
/// A declined interactive review leaves the decision absent rather than
/// recording `Unmatched`; the report builder treats both the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    AutoMatched(Vec<usize>),
    ManuallyMatched(Vec<usize>),
    Unmatched,
}

impl Decision {
    /// Catalog entry indices kept by this decision.
    pub fn entries(&self) -> &[usize] {
        match self {
            Decision::AutoMatched(e) | Decision::ManuallyMatched(e) => e,
            Decision::Unmatched => &[],
        }
    }

    pub fn is_matched(&self) -> bool {
        !self.entries().is_empty()
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_THRESHOLD: u32 = 90;
pub const DEFAULT_LOW_THRESHOLD: u32 = 51;

/// Matching configuration consumed by the engine.
#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    /// Stage 1 acceptance threshold on the primary score.
    pub threshold: u32,
    /// Whether the interactive review stage runs at all.
    pub interactive: bool,
    /// Stage 3 acceptance bar, applied to both scores.
    pub low_threshold: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            interactive: false,
            low_threshold: DEFAULT_LOW_THRESHOLD,
        }
    }
}

impl MatchConfig {
    /// Rejects out-of-range thresholds before any matching runs.
    pub fn validate(&self) -> Result<()> {
        if self.threshold > 100 {
            bail!(
                "similarity threshold must be within 0-100, got {}",
                self.threshold
            );
        }
        if self.low_threshold > 100 {
            bail!(
                "interactive low threshold must be within 0-100, got {}",
                self.low_threshold
            );
        }
        Ok(())
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Run statistics for the final summary and the optional stats JSON file.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    pub catalog_entries: usize,
    pub catalog_kept: usize,
    pub catalog_removed: usize,

    pub sources_fetched: usize,
    pub recommendations: usize,

    pub auto_matched: usize,
    pub manually_matched: usize,
    pub reviewed: usize,
    pub unresolved: usize,

    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Matched recommendations as a percentage of all recommendations.
    pub fn match_rate(&self) -> f64 {
        if self.recommendations == 0 {
            0.0
        } else {
            100.0 * (self.auto_matched + self.manually_matched) as f64
                / self.recommendations as f64
        }
    }

    /// Write stats to a JSON file.
    pub fn write_to_file(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
