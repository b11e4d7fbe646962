//! Interactive review of recommendations left unmatched by the automatic
//! stages.
//!
//! Each still-unmatched recommendation is re-scored against the discarded
//! pool (catalog entries no decision references) at a lower acceptance bar,
//! requiring both measures to pass. Surviving candidates go to the operator,
//! one recommendation at a time; a selection or decline is final. Aborting
//! mid-review keeps every decision already made.

use anyhow::Result;
use std::io::{self, BufRead, Write};

use crate::engine::{disc_siblings, MatchContext};
use crate::models::{Candidate, CandidateScore, CatalogEntry, Decision, MatchConfig, Recommendation};
use crate::normalize::is_first_part;
use crate::similarity::Similarity;

/// Operator response to one review prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptChoice {
    /// Index into the presented candidate list.
    Selected(usize),
    /// Keep the recommendation unmatched.
    Declined,
    /// Stop reviewing; remaining recommendations stay unmatched.
    Abort,
}

/// Presents candidates for one recommendation and returns the operator's
/// choice. Injectable so tests can script the whole review.
pub trait OperatorPrompt {
    fn choose(&mut self, title: &str, candidates: &[(&str, CandidateScore)])
        -> Result<PromptChoice>;
}

/// Blocking prompt on stdin/stdout.
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn choose(
        &mut self,
        title: &str,
        candidates: &[(&str, CandidateScore)],
    ) -> Result<PromptChoice> {
        let mut out = io::stdout().lock();
        writeln!(out, "{:-<70}", "")?;
        writeln!(out, "Reviewing recommended title: {title}")?;
        writeln!(out, "(no automatic match was selected)")?;
        for (i, (name, score)) in candidates.iter().enumerate() {
            writeln!(
                out,
                "  [{}] {} (primary {}%, secondary {}%)",
                i + 1,
                name,
                score.primary,
                score.secondary
            )?;
        }
        writeln!(out, "  [0/N] None of these - leave '{title}' unmatched")?;

        loop {
            write!(out, "Select a candidate number, or 0/N to skip: ")?;
            out.flush()?;
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line)? == 0 {
                log::warn!("EOF on stdin, stopping interactive review");
                return Ok(PromptChoice::Abort);
            }
            let choice = line.trim().to_lowercase();
            if choice.is_empty() || choice == "n" || choice == "0" {
                return Ok(PromptChoice::Declined);
            }
            match choice.parse::<usize>() {
                Ok(i) if (1..=candidates.len()).contains(&i) => {
                    return Ok(PromptChoice::Selected(i - 1))
                }
                _ => writeln!(
                    out,
                    "  Invalid choice. Enter a number between 1 and {}, or 0/N.",
                    candidates.len()
                )?,
            }
        }
    }
}

/// Counters reported back to the summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewOutcome {
    pub reviewed: usize,
    pub manually_matched: usize,
    pub aborted: bool,
}

/// Stage 3: walk still-unmatched recommendations in load order and let the
/// operator pick from re-scored discarded entries.
pub fn review_unmatched<S: Similarity, P: OperatorPrompt>(
    ctx: &mut MatchContext,
    catalog: &[CatalogEntry],
    recs: &[Recommendation],
    scorer: &S,
    config: &MatchConfig,
    prompt: &mut P,
) -> Result<ReviewOutcome> {
    let mut outcome = ReviewOutcome::default();
    let low = config.low_threshold;

    for (rec_idx, rec) in recs.iter().enumerate() {
        if ctx.decisions.contains_key(&rec_idx) {
            continue;
        }

        // The discarded pool shrinks as manual selections land, so entries
        // already claimed by an earlier review are not offered again.
        let decided = ctx.decided_entries();
        let mut candidates: Vec<Candidate> = Vec::new();
        for entry in catalog {
            if entry.norm.is_empty() || decided.contains(&entry.index) {
                continue;
            }
            let primary = scorer.primary(&entry.norm, &rec.title);
            if primary < low {
                continue;
            }
            let secondary = scorer.secondary(&entry.norm, &rec.title);
            if secondary < low {
                continue;
            }
            candidates.push(Candidate {
                entry: entry.index,
                score: CandidateScore { primary, secondary },
            });
        }

        if candidates.is_empty() {
            log::debug!("no review candidates for '{}'", rec.title);
            continue;
        }

        candidates.sort_by(|a, b| {
            b.score
                .primary
                .cmp(&a.score.primary)
                .then(b.score.secondary.cmp(&a.score.secondary))
                .then(a.entry.cmp(&b.entry))
        });

        outcome.reviewed += 1;
        let labels: Vec<(&str, CandidateScore)> = candidates
            .iter()
            .map(|c| (catalog[c.entry].name.as_str(), c.score))
            .collect();

        match prompt.choose(&rec.title, &labels)? {
            PromptChoice::Declined => {
                log::info!("operator skipped '{}'", rec.title);
            }
            PromptChoice::Abort => {
                outcome.aborted = true;
                break;
            }
            PromptChoice::Selected(i) => {
                let Some(chosen) = candidates.get(i).map(|c| c.entry) else {
                    log::warn!("selection {i} out of range, skipping '{}'", rec.title);
                    continue;
                };
                let mut kept = vec![chosen];
                if is_first_part(&catalog[chosen].name) {
                    // Sibling search is limited to the list the operator saw.
                    let pool: Vec<usize> = candidates.iter().map(|c| c.entry).collect();
                    kept.extend(disc_siblings(chosen, &pool, catalog));
                }
                log::info!(
                    "operator selected '{}' for '{}'",
                    catalog[chosen].name,
                    rec.title
                );
                ctx.record(rec_idx, Decision::ManuallyMatched(kept));
                outcome.manually_matched += 1;
            }
        }
    }

    Ok(outcome)
}
