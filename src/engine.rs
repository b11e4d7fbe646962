//! Automatic matching stages.
//!
//! Stage 1 collects, for every recommendation, the catalog entries whose
//! primary similarity clears the acceptance threshold. Stage 2 picks a single
//! best entry per recommendation and pulls in sibling discs of a multi-part
//! release. Both stages are deterministic: candidate vectors are in catalog
//! input order and all remaining ties break on that order.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::{Candidate, CandidateScore, CatalogEntry, Decision, Recommendation};
use crate::normalize::{base_name, is_first_part, part_number};
use crate::progress::create_progress_bar;
use crate::similarity::Similarity;

/// Mutable run state threaded through the stages.
///
/// `candidates` is indexed by recommendation; `decisions` is append-only per
/// recommendation key. A decision, once recorded, is never revised.
#[derive(Debug, Default)]
pub struct MatchContext {
    pub candidates: Vec<Vec<Candidate>>,
    pub decisions: FxHashMap<usize, Decision>,
}

impl MatchContext {
    pub fn new(rec_count: usize) -> Self {
        Self {
            candidates: vec![Vec::new(); rec_count],
            decisions: FxHashMap::default(),
        }
    }

    /// Record the final decision for a recommendation. First write wins.
    pub fn record(&mut self, rec: usize, decision: Decision) {
        debug_assert!(
            !self.decisions.contains_key(&rec),
            "decision for recommendation {rec} recorded twice"
        );
        self.decisions.entry(rec).or_insert(decision);
    }

    /// Catalog entry indices referenced by any decision so far.
    pub fn decided_entries(&self) -> FxHashSet<usize> {
        self.decisions
            .values()
            .flat_map(|d| d.entries().iter().copied())
            .collect()
    }
}

/// Stage 1: score every (recommendation, catalog entry) pair and keep those
/// at or above `threshold` on the primary measure. The secondary score is
/// only computed for pairs that pass.
///
/// Pairs share no mutable state, so the outer loop runs on the rayon pool.
pub fn collect_candidates<S: Similarity + Sync>(
    catalog: &[CatalogEntry],
    recs: &[Recommendation],
    scorer: &S,
    threshold: u32,
) -> Vec<Vec<Candidate>> {
    let pb = create_progress_bar(recs.len() as u64, "Stage 1: Collecting candidates");

    let candidates: Vec<Vec<Candidate>> = recs
        .par_iter()
        .map(|rec| {
            let mut found = Vec::new();
            for entry in catalog {
                if entry.norm.is_empty() {
                    continue;
                }
                let primary = scorer.primary(&entry.norm, &rec.title);
                if primary >= threshold {
                    let secondary = scorer.secondary(&entry.norm, &rec.title);
                    found.push(Candidate {
                        entry: entry.index,
                        score: CandidateScore { primary, secondary },
                    });
                }
            }
            pb.inc(1);
            found
        })
        .collect();

    let with_candidates = candidates.iter().filter(|c| !c.is_empty()).count();
    pb.finish_with_message(format!(
        "Stage 1: Candidates found for {with_candidates}/{} titles",
        recs.len()
    ));
    candidates
}

/// Stage 2: choose one best candidate per recommendation.
///
/// Candidates sort by primary score descending, then secondary score
/// descending, then catalog input order. When the winner is the first part of
/// a multi-part release, sibling parts among this recommendation's other
/// candidates join the decision.
pub fn select_best(ctx: &mut MatchContext, catalog: &[CatalogEntry]) {
    let MatchContext {
        candidates,
        decisions,
    } = ctx;

    let pb = create_progress_bar(candidates.len() as u64, "Stage 2: Selecting best matches");
    for (rec, cands) in candidates.iter().enumerate() {
        pb.inc(1);
        if cands.is_empty() {
            continue;
        }

        let mut sorted = cands.clone();
        sorted.sort_by(|a, b| {
            b.score
                .primary
                .cmp(&a.score.primary)
                .then(b.score.secondary.cmp(&a.score.secondary))
                .then(a.entry.cmp(&b.entry))
        });

        let best = sorted[0].entry;
        let mut kept = vec![best];
        if is_first_part(&catalog[best].name) {
            let pool: Vec<usize> = sorted[1..].iter().map(|c| c.entry).collect();
            kept.extend(disc_siblings(best, &pool, catalog));
        }

        log::debug!(
            "auto match: '{}' -> {:?}",
            catalog[best].name,
            kept.iter().map(|&e| &catalog[e].name).collect::<Vec<_>>()
        );
        decisions.insert(rec, Decision::AutoMatched(kept));
    }
    pb.finish_with_message(format!(
        "Stage 2: Matched {} titles automatically",
        decisions.len()
    ));
}

/// Sibling parts of the multi-part release `chosen` belongs to, drawn from
/// `pool`. A sibling must carry a part number of 2 or greater and its base
/// name must exactly equal the chosen entry's base name; similarity scores
/// play no role here, so distinct games that merely score well against each
/// other never get grouped.
pub fn disc_siblings(chosen: usize, pool: &[usize], catalog: &[CatalogEntry]) -> Vec<usize> {
    let base = base_name(&catalog[chosen].name);
    pool.iter()
        .copied()
        .filter(|&e| {
            e != chosen
                && matches!(part_number(&catalog[e].name), Some(n) if n >= 2)
                && base_name(&catalog[e].name) == base
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;
    use crate::similarity::Similarity;

    /// Deterministic fake: exact string equality scores (100, 100); anything
    /// else looks up an explicit table, defaulting to (0, 0).
    pub struct TableScorer {
        scores: FxHashMap<(String, String), (u32, u32)>,
    }

    impl TableScorer {
        pub fn new(rows: &[(&str, &str, u32, u32)]) -> Self {
            let mut scores = FxHashMap::default();
            for &(a, b, p, s) in rows {
                scores.insert((a.to_string(), b.to_string()), (p, s));
                scores.insert((b.to_string(), a.to_string()), (p, s));
            }
            Self { scores }
        }

        fn get(&self, a: &str, b: &str) -> (u32, u32) {
            if a == b {
                return (100, 100);
            }
            self.scores
                .get(&(a.to_string(), b.to_string()))
                .copied()
                .unwrap_or((0, 0))
        }
    }

    impl Similarity for TableScorer {
        fn primary(&self, a: &str, b: &str) -> u32 {
            self.get(a, b).0
        }
        fn secondary(&self, a: &str, b: &str) -> u32 {
            self.get(a, b).1
        }
    }

    pub fn catalog_of(names: &[&str]) -> Vec<CatalogEntry> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| CatalogEntry {
                index,
                name: name.to_string(),
                norm: crate::normalize::clean_title(name),
                xml: format!("<game name=\"{name}\"/>"),
            })
            .collect()
    }

    pub fn recs_of(titles: &[&str]) -> Vec<Recommendation> {
        titles
            .iter()
            .map(|t| Recommendation {
                title: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn single_high_scorer_is_auto_matched() {
        // Scenario: one recommendation, one entry above threshold.
        let catalog = catalog_of(&["Chrono Trigger (USA)"]);
        let recs = recs_of(&["chrono trigger"]);
        let scorer = TableScorer::new(&[("chrono trigger", "chrono trigger", 96, 94)]);

        let mut ctx = MatchContext::new(recs.len());
        ctx.candidates = collect_candidates(&catalog, &recs, &scorer, 90);
        select_best(&mut ctx, &catalog);

        assert_eq!(ctx.decisions.get(&0), Some(&Decision::AutoMatched(vec![0])));
    }

    #[test]
    fn below_threshold_leaves_decision_absent() {
        let catalog = catalog_of(&["Obscure Game II (Japan)"]);
        let recs = recs_of(&["obscure game"]);
        let scorer = TableScorer::new(&[("obscure game ii", "obscure game", 85, 80)]);

        let mut ctx = MatchContext::new(recs.len());
        ctx.candidates = collect_candidates(&catalog, &recs, &scorer, 90);
        select_best(&mut ctx, &catalog);

        assert!(ctx.candidates[0].is_empty());
        assert!(ctx.decisions.is_empty());
    }

    #[test]
    fn secondary_only_computed_above_threshold() {
        // Candidate vectors carry the secondary score only for pairs that
        // passed; below-threshold pairs never appear at all.
        let catalog = catalog_of(&["Alpha (USA)", "Beta (USA)"]);
        let recs = recs_of(&["alpha"]);
        let scorer = TableScorer::new(&[("alpha", "alpha", 100, 100), ("beta", "alpha", 10, 99)]);

        let candidates = collect_candidates(&catalog, &recs, &scorer, 90);
        assert_eq!(candidates[0].len(), 1);
        assert_eq!(candidates[0][0].entry, 0);
    }

    #[test]
    fn raising_threshold_never_grows_candidate_sets() {
        let catalog = catalog_of(&["Alpha (USA)", "Alphaz (USA)", "Alphax (USA)"]);
        let recs = recs_of(&["alpha"]);
        let scorer = TableScorer::new(&[
            ("alphaz", "alpha", 92, 90),
            ("alphax", "alpha", 95, 91),
        ]);

        let loose = collect_candidates(&catalog, &recs, &scorer, 90);
        let strict = collect_candidates(&catalog, &recs, &scorer, 95);
        for (l, s) in loose.iter().zip(strict.iter()) {
            assert!(s.len() <= l.len());
        }
        assert_eq!(loose[0].len(), 3);
        assert_eq!(strict[0].len(), 2);
    }

    #[test]
    fn ties_break_by_secondary_then_catalog_order() {
        let catalog = catalog_of(&["Game (Europe)", "Game (Japan)", "Game (USA)"]);
        // All three score identically on primary; entry 1 wins on secondary.
        let mut ctx = MatchContext::new(1);
        ctx.candidates = vec![vec![
            Candidate {
                entry: 0,
                score: CandidateScore {
                    primary: 95,
                    secondary: 90,
                },
            },
            Candidate {
                entry: 1,
                score: CandidateScore {
                    primary: 95,
                    secondary: 93,
                },
            },
            Candidate {
                entry: 2,
                score: CandidateScore {
                    primary: 95,
                    secondary: 93,
                },
            },
        ]];
        select_best(&mut ctx, &catalog);
        assert_eq!(ctx.decisions.get(&0), Some(&Decision::AutoMatched(vec![1])));

        // Fully identical scores fall back to catalog input order.
        let mut ctx2 = MatchContext::new(1);
        ctx2.candidates = vec![vec![
            Candidate {
                entry: 2,
                score: CandidateScore {
                    primary: 95,
                    secondary: 93,
                },
            },
            Candidate {
                entry: 0,
                score: CandidateScore {
                    primary: 95,
                    secondary: 93,
                },
            },
        ]];
        select_best(&mut ctx2, &catalog);
        assert_eq!(ctx2.decisions.get(&0), Some(&Decision::AutoMatched(vec![0])));
    }

    #[test]
    fn disc_one_winner_pulls_in_sibling_discs() {
        // Scenario: both discs pass the threshold, disc 1 scores highest.
        let catalog = catalog_of(&[
            "Final Fantasy VII (Disc 1) (USA)",
            "Final Fantasy VII (Disc 2) (USA)",
        ]);
        let mut ctx = MatchContext::new(1);
        ctx.candidates = vec![vec![
            Candidate {
                entry: 0,
                score: CandidateScore {
                    primary: 97,
                    secondary: 95,
                },
            },
            Candidate {
                entry: 1,
                score: CandidateScore {
                    primary: 95,
                    secondary: 94,
                },
            },
        ]];
        select_best(&mut ctx, &catalog);
        assert_eq!(
            ctx.decisions.get(&0),
            Some(&Decision::AutoMatched(vec![0, 1]))
        );
    }

    #[test]
    fn grouping_requires_exact_base_name() {
        let catalog = catalog_of(&[
            "Final Fantasy VII (Disc 1) (USA)",
            "Final Fantasy VIII (Disc 2) (USA)",
        ]);
        let siblings = disc_siblings(0, &[1], &catalog);
        assert!(siblings.is_empty());
    }

    #[test]
    fn grouping_requires_part_two_or_greater() {
        let catalog = catalog_of(&[
            "Star Ocean (Disc 1) (Japan)",
            "Star Ocean (Disc 1) (Japan) (Alt)",
            "Star Ocean (Disc 2) (Japan)",
        ]);
        let siblings = disc_siblings(0, &[1, 2], &catalog);
        assert_eq!(siblings, vec![2]);
    }

    #[test]
    fn non_disc_winner_never_triggers_grouping() {
        let catalog = catalog_of(&["Xenogears (USA)", "Xenogears (Disc 2) (USA)"]);
        let mut ctx = MatchContext::new(1);
        ctx.candidates = vec![vec![
            Candidate {
                entry: 0,
                score: CandidateScore {
                    primary: 98,
                    secondary: 97,
                },
            },
            Candidate {
                entry: 1,
                score: CandidateScore {
                    primary: 96,
                    secondary: 95,
                },
            },
        ]];
        select_best(&mut ctx, &catalog);
        assert_eq!(ctx.decisions.get(&0), Some(&Decision::AutoMatched(vec![0])));
    }

    #[test]
    fn stages_are_deterministic_across_runs() {
        let catalog = catalog_of(&[
            "Final Fantasy VII (Disc 1) (USA)",
            "Final Fantasy VII (Disc 2) (USA)",
            "Chrono Trigger (USA)",
            "Chrono Cross (Disc 1) (USA)",
        ]);
        let recs = recs_of(&["final fantasy vii", "chrono trigger", "chrono cross"]);
        let scorer = TableScorer::new(&[
            ("final fantasy vii", "chrono trigger", 12, 10),
            ("chrono trigger", "chrono cross", 91, 88),
            ("chrono cross", "chrono trigger", 91, 88),
        ]);

        let run = |threshold| {
            let mut ctx = MatchContext::new(recs.len());
            ctx.candidates = collect_candidates(&catalog, &recs, &scorer, threshold);
            select_best(&mut ctx, &catalog);
            let mut decisions: Vec<(usize, Decision)> = ctx.decisions.into_iter().collect();
            decisions.sort_by_key(|(rec, _)| *rec);
            decisions
        };

        assert_eq!(run(90), run(90));
    }

    #[test]
    fn empty_inputs_complete_trivially() {
        let scorer = TableScorer::new(&[]);

        let no_recs = collect_candidates(&catalog_of(&["Game (USA)"]), &[], &scorer, 90);
        assert!(no_recs.is_empty());

        let no_catalog = collect_candidates(&[], &recs_of(&["game"]), &scorer, 90);
        assert_eq!(no_catalog.len(), 1);
        assert!(no_catalog[0].is_empty());

        let mut ctx = MatchContext::new(1);
        ctx.candidates = no_catalog;
        select_best(&mut ctx, &catalog_of(&[]));
        assert!(ctx.decisions.is_empty());
    }
}
