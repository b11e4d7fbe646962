use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;

use datsieve::dat;
use datsieve::engine::{self, MatchContext};
use datsieve::fetch;
use datsieve::models::{
    CatalogEntry, MatchConfig, RecommendationSet, RunStats, DEFAULT_LOW_THRESHOLD,
    DEFAULT_THRESHOLD,
};
use datsieve::normalize::clean_title;
use datsieve::progress;
use datsieve::report;
use datsieve::review::{review_unmatched, ReviewOutcome, StdinPrompt};
use datsieve::safety;
use datsieve::similarity::FuzzScorer;

#[derive(Parser)]
#[command(name = "datsieve")]
#[command(about = "Filter a ROM catalog DAT down to titles recommended by curated pages")]
struct Args {
    /// Input DAT file
    input: PathBuf,

    /// Output DAT file (defaults to "<input stem>_filtered.dat")
    output: Option<PathBuf>,

    /// Recommendation page URL (repeatable)
    #[arg(short = 'u', long = "url", num_args = 1.., required = true)]
    urls: Vec<String>,

    /// Minimum primary similarity for an automatic match (0-100)
    #[arg(short = 't', long, default_value_t = DEFAULT_THRESHOLD,
          value_parser = clap::value_parser!(u32).range(0..=100))]
    threshold: u32,

    /// Minimum for both scores during interactive review (0-100)
    #[arg(long, default_value_t = DEFAULT_LOW_THRESHOLD,
          value_parser = clap::value_parser!(u32).range(0..=100))]
    low_threshold: u32,

    /// Review unmatched titles interactively against the discarded pool
    #[arg(long = "interactive-review")]
    interactive: bool,

    /// Also fetch each page's /Homebrew sub-page
    #[arg(long)]
    check_homebrew: bool,

    /// Also fetch each page's /Japan sub-page
    #[arg(long)]
    check_japan: bool,

    /// Write run statistics as JSON
    #[arg(long)]
    stats_file: Option<PathBuf>,

    /// Suppress progress bars
    #[arg(long)]
    quiet: bool,

    /// Rayon thread count (0 = default)
    #[arg(long, default_value = "0")]
    workers: usize,
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("catalog");
    input.with_file_name(format!("{stem}_filtered.dat"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    progress::set_quiet(args.quiet);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let config = MatchConfig {
        threshold: args.threshold,
        interactive: args.interactive,
        low_threshold: args.low_threshold,
    };
    config.validate()?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    safety::validate_output_path(&output, &[&args.input])?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory '{}'", parent.display()))?;
    }

    let start = Instant::now();

    let urls = fetch::expand_variants(&args.urls, args.check_homebrew, args.check_japan);
    let sources = fetch::fetch_sources(&urls)?;
    let recs = RecommendationSet::from_sources(&sources);
    if recs.is_empty() {
        log::warn!("no recommendations extracted; the output will keep nothing");
    }

    let spinner = progress::create_spinner(&format!("Loading catalog {}", args.input.display()));
    let datafile = dat::load_datafile(&args.input)?;
    spinner.finish_with_message(format!("Loaded {} catalog entries", datafile.games.len()));
    let catalog: Vec<CatalogEntry> = datafile
        .games
        .iter()
        .enumerate()
        .map(|(index, game)| CatalogEntry {
            index,
            name: game.name.clone(),
            norm: clean_title(&game.name),
            xml: game.xml.clone(),
        })
        .collect();
    println!(
        "Catalog: {} entries; recommendations: {} unique titles from {} pages",
        catalog.len(),
        recs.len(),
        sources.len()
    );

    let scorer = FuzzScorer;
    let mut ctx = MatchContext::new(recs.len());
    ctx.candidates = engine::collect_candidates(&catalog, &recs.recs, &scorer, config.threshold);
    engine::select_best(&mut ctx, &catalog);
    let auto_matched = ctx.decisions.len();

    let mut review = ReviewOutcome::default();
    if config.interactive {
        let mut prompt = StdinPrompt;
        review = review_unmatched(&mut ctx, &catalog, &recs.recs, &scorer, &config, &mut prompt)?;
    }

    let report = report::build_report(&ctx, &sources, &recs);

    dat::write_filtered(&output, &datafile, &report.kept)?;
    let written = dat::count_games(&output)?;
    if written != report.kept.len() {
        bail!(
            "Output verification failed: '{}' holds {} games, expected {}",
            output.display(),
            written,
            report.kept.len()
        );
    }
    println!(
        "Wrote {} of {} entries to {}",
        written,
        catalog.len(),
        output.display()
    );

    let out_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let csvs = report::write_unresolved_csvs(&report, &out_dir)?;
    for path in &csvs {
        println!("Unmatched titles report: {}", path.display());
    }

    let matched = ctx.decisions.values().filter(|d| d.is_matched()).count();
    let stats = RunStats {
        catalog_entries: catalog.len(),
        catalog_kept: report.kept.len(),
        catalog_removed: catalog.len() - report.kept.len(),
        sources_fetched: sources.len(),
        recommendations: recs.len(),
        auto_matched,
        manually_matched: review.manually_matched,
        reviewed: review.reviewed,
        unresolved: recs.len() - matched,
        elapsed_seconds: start.elapsed().as_secs_f64(),
    };

    println!("\n{:=<60}", "");
    println!("Filtering complete!");
    println!("  Catalog entries: {}", stats.catalog_entries);
    println!(
        "  Kept: {} (removed {})",
        stats.catalog_kept, stats.catalog_removed
    );
    println!(
        "  Recommendations: {} ({} auto, {} manual, {} unresolved)",
        stats.recommendations, stats.auto_matched, stats.manually_matched, stats.unresolved
    );
    println!("  Match rate: {:.1}%", stats.match_rate());
    println!(
        "  Thresholds: {} (review: {})",
        config.threshold, config.low_threshold
    );
    println!(
        "  Elapsed: {}",
        progress::format_duration(start.elapsed())
    );
    println!("{:=<60}", "");

    if let Some(path) = &args.stats_file {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to '{}'", path.display()))?;
        println!("Stats written to {}", path.display());
    }

    Ok(())
}
