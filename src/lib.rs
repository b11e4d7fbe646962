//! Filter a ROM catalog DAT down to the titles recommended by curated pages.
//!
//! The pipeline fetches recommendation pages, normalizes every title on both
//! sides, matches recommendations against catalog entries with fuzzy scoring,
//! optionally hands near-misses to an operator, and writes a filtered DAT
//! plus per-source lists of what could not be resolved.

pub mod dat;
pub mod engine;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod report;
pub mod review;
pub mod safety;
pub mod similarity;
