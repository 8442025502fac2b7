//! Text and JSON rendering of session results.

use crate::corpus::Article;
use crate::session::{InitReport, SearchHit};
use serde::Serialize;
use std::fmt::Write;
use vecquery_core::AppResult;
use vecquery_index::IndexStats;

/// Width of the `=` rules around the results table.
const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Results table printed by the batch shell.
pub fn results_table(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", rule());
    let _ = writeln!(out, "QUERY RESULTS");
    let _ = writeln!(out, "{}", rule());

    if hits.is_empty() {
        let _ = writeln!(out, "\nNo results found.");
    }

    for hit in hits {
        let _ = writeln!(out, "\n{}. Article ID: {}", hit.rank, hit.id);
        let _ = writeln!(out, "   Similarity Score: {:.4}", hit.score);
        let _ = writeln!(out, "   Text: {}", hit.text);
    }

    let _ = writeln!(out, "\n{}", rule());
    out
}

/// Compact result cards for the interactive shell.
pub fn result_cards(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for hit in hits {
        let _ = writeln!(out, "[{:.4}] {}", hit.score, hit.id);
        let _ = writeln!(out, "         {}", hit.text);
    }
    out
}

/// Numbered article list shown before the index is initialized.
pub fn article_list(articles: &[Article]) -> String {
    let mut out = String::from("Articles to be indexed:\n");
    for (i, article) in articles.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, article.text);
    }
    out
}

/// One-line summary of an initialization.
pub fn init_summary(report: &InitReport) -> String {
    if report.already_populated {
        format!(
            "Index '{}' ready (existing data reused).",
            report.handle.name
        )
    } else {
        format!(
            "Index '{}' ready ({} articles inserted).",
            report.handle.name, report.inserted
        )
    }
}

/// Human-readable index statistics.
pub fn stats_summary(name: &str, stats: &IndexStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Index: {}", name);
    let _ = writeln!(out, "  Vectors:   {}", stats.total_vector_count);
    let _ = writeln!(out, "  Dimension: {}", stats.dimension);
    let _ = writeln!(out, "  Fullness:  {:.2}%", stats.index_fullness * 100.0);
    for (namespace, count) in &stats.namespaces {
        let label = if namespace.is_empty() {
            "(default)"
        } else {
            namespace
        };
        let _ = writeln!(out, "  Namespace {}: {}", label, count);
    }
    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchOutput<'a> {
    query: &'a str,
    top_k: usize,
    results: &'a [SearchHit],
}

/// Search results as pretty-printed JSON.
pub fn search_json(query: &str, top_k: usize, hits: &[SearchHit]) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(&SearchOutput {
        query,
        top_k,
        results: hits,
    })?)
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    index: &'a str,
    #[serde(flatten)]
    stats: &'a IndexStats,
}

/// Index statistics as pretty-printed JSON.
pub fn stats_json(name: &str, stats: &IndexStats) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(&StatsOutput { index: name, stats })?)
}
