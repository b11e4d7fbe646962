//! Recommendation page fetching and table extraction.
//!
//! Each source URL is an HTML page carrying one or more `wikitable` tables
//! whose second column lists recommended titles. Titles are normalized and
//! de-duplicated per page at extraction time; a missing page (404) is skipped
//! with a warning rather than failing the run.

use anyhow::Result;
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use scraper::{Html, Selector};
use std::io::Read;
use std::time::Duration;

use crate::models::SourceList;
use crate::normalize::clean_title;
use crate::progress::create_progress_bar;

const USER_AGENT: &str = concat!("datsieve/", env!("CARGO_PKG_VERSION"));

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table.wikitable").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").unwrap());

pub fn build_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(15))
        .build()
}

/// Expand base URLs with the optional Homebrew/Japan sub-pages, preserving
/// order and dropping duplicates.
pub fn expand_variants(urls: &[String], homebrew: bool, japan: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for url in urls {
        let base = url.trim_end_matches('/').to_string();
        let mut push = |u: String| {
            if seen.insert(u.clone()) {
                out.push(u);
            }
        };
        push(base.clone());
        if homebrew {
            push(format!("{base}/Homebrew"));
        }
        if japan {
            push(format!("{base}/Japan"));
        }
    }
    out
}

/// Filesystem-safe label for a source, derived from the URL path. Falls back
/// to an ordinal when the URL has no usable path.
pub fn source_label(url: &str, ordinal: usize) -> String {
    let path = url.splitn(2, "://").nth(1).unwrap_or(url);
    let path = path.splitn(2, '/').nth(1).unwrap_or("");
    let label: String = path
        .trim_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let label = label.trim_matches('_');
    if label.is_empty() {
        format!("source{ordinal}")
    } else {
        label.to_string()
    }
}

/// Text lines of a cell: fragments joined across inline markup (links,
/// references), split only at `<br>` elements.
fn cell_lines(cell: scraper::ElementRef) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for node in cell.descendants() {
        if let Some(text) = node.value().as_text() {
            current.push_str(&text.text);
        } else if node.value().as_element().map_or(false, |el| el.name() == "br") {
            lines.push(std::mem::take(&mut current));
        }
    }
    lines.push(current);
    lines
}

/// Pull normalized titles out of every `wikitable` on the page.
///
/// The first row of each table is a header; the title sits in the second
/// column. Line breaks inside a cell separate distinct titles, and
/// `clean_title` already drops wiki reference markers like "[1]".
pub fn extract_titles(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut titles = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();

    for table in doc.select(&TABLE) {
        for row in table.select(&ROW).skip(1) {
            let cells: Vec<_> = row.select(&CELL).collect();
            if cells.len() < 2 {
                continue;
            }
            for line in cell_lines(cells[1]) {
                let title = clean_title(&line);
                if !title.is_empty() && seen.insert(title.clone()) {
                    titles.push(title);
                }
            }
        }
    }

    titles
}

/// GET one page. Every per-URL failure resolves to `None` with a warning so
/// one missing or unreachable page never aborts the run.
fn fetch_page(agent: &ureq::Agent, url: &str) -> Option<String> {
    match agent.get(url).set("User-Agent", USER_AGENT).call() {
        Ok(response) => {
            let mut body = String::new();
            match response.into_reader().read_to_string(&mut body) {
                Ok(_) => Some(body),
                Err(error) => {
                    log::warn!("failed to read response, skipping: {url} ({error})");
                    None
                }
            }
        }
        Err(ureq::Error::Status(404, _)) => {
            log::warn!("page not found, skipping: {url}");
            None
        }
        Err(ureq::Error::Status(code, _)) => {
            log::warn!("fetch returned HTTP {code}, skipping: {url}");
            None
        }
        Err(error) => {
            log::warn!("fetch failed, skipping: {url} ({error})");
            None
        }
    }
}

/// Fetch every source URL in order and extract its title list.
pub fn fetch_sources(urls: &[String]) -> Result<Vec<SourceList>> {
    let agent = build_agent();
    let pb = create_progress_bar(urls.len() as u64, "Fetching recommendation pages");

    let mut sources = Vec::new();
    for (i, url) in urls.iter().enumerate() {
        if let Some(body) = fetch_page(&agent, url) {
            let titles = extract_titles(&body);
            if titles.is_empty() {
                log::warn!("no recommendation tables found at {url}");
            }
            log::info!("{}: {} titles", url, titles.len());
            sources.push(SourceList {
                label: source_label(url, i),
                url: url.clone(),
                titles,
            });
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!("Fetched {} of {} pages", sources.len(), urls.len()));
    Ok(sources)
}
