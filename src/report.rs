//! Final run report: the kept catalog subset and per-source unmatched lists.
//!
//! The kept set is the union of every decision's entries, in catalog input
//! order. Unresolved titles stay attached to the source page they came from,
//! so a title recommended by two pages appears in both lists when unmatched.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::engine::MatchContext;
use crate::models::{RecommendationSet, SourceList};
use crate::safety::write_atomic;

/// Titles from one source page that ended the run without a match.
#[derive(Clone, Debug)]
pub struct UnresolvedSource {
    pub label: String,
    pub url: String,
    pub titles: Vec<String>,
}

/// Everything the output stage needs: which catalog entries survive and what
/// could not be resolved.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// Kept catalog entry indices, ascending, no duplicates.
    pub kept: Vec<usize>,
    /// Sources with at least one unresolved title, in source order.
    pub unresolved: Vec<UnresolvedSource>,
}

/// Assemble the report from the finished decision state.
pub fn build_report(
    ctx: &MatchContext,
    sources: &[SourceList],
    recs: &RecommendationSet,
) -> Report {
    let mut kept: Vec<usize> = ctx.decided_entries().into_iter().collect();
    kept.sort_unstable();
    kept.dedup();

    let mut unresolved = Vec::new();
    for source in sources {
        let titles: Vec<String> = source
            .titles
            .iter()
            .filter(|title| {
                recs.lookup(title)
                    .and_then(|rec| ctx.decisions.get(&rec))
                    .map_or(true, |d| !d.is_matched())
            })
            .cloned()
            .collect();
        if !titles.is_empty() {
            unresolved.push(UnresolvedSource {
                label: source.label.clone(),
                url: source.url.clone(),
                titles,
            });
        }
    }

    Report { kept, unresolved }
}

/// Quote a CSV field only when it needs it.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Write one `{label}_unmatched.csv` per source with unresolved titles.
/// Sources with nothing unresolved produce no file at all.
pub fn write_unresolved_csvs(report: &Report, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for source in &report.unresolved {
        let path = dir.join(format!("{}_unmatched.csv", source.label));

        let mut out = String::new();
        out.push_str(&csv_field(&format!(
            "Unmatched Recommended Title from {}",
            source.url
        )));
        out.push('\n');
        for title in &source.titles {
            out.push_str(&csv_field(title));
            out.push('\n');
        }

        write_atomic(&path, &out)?;
        log::info!(
            "wrote {} unresolved titles to {}",
            source.titles.len(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}
