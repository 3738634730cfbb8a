//! Result files written next to the crops

use brickscan_core::BatchReport;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Counts for one image in a multi-image run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTally {
    pub pieces: usize,
    pub identified: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn from_report(report: &BatchReport) -> Self {
        Self {
            pieces: report.summary.total,
            identified: report.summary.succeeded,
            failed: report.summary.failed,
        }
    }
}

/// Human-readable summary of a report
pub fn render_text(report: &BatchReport) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "PIECE IDENTIFICATION SUMMARY");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Source: {}", report.source);
    let _ = writeln!(out, "Total pieces processed: {}", report.summary.total);
    let _ = writeln!(out, "Successfully identified: {}", report.summary.succeeded);
    let _ = writeln!(out, "Failed to identify: {}", report.summary.failed);
    if let Some(stats) = &report.enrichment {
        let _ = writeln!(
            out,
            "Catalog lookups: {} unique, {} resolved, {} without data, {} failed",
            stats.unique_items, stats.resolved, stats.no_data, stats.failed
        );
    }

    for piece in &report.pieces {
        let _ = writeln!(out, "\nResults for: {}", piece.crop.label);
        let _ = writeln!(out, "{}", "=".repeat(60));
        if let Some(reason) = &piece.error_reason {
            let _ = writeln!(out, "Error: {}", reason);
            continue;
        }
        if piece.predictions.is_empty() {
            let _ = writeln!(out, "No items found");
            continue;
        }
        for p in &piece.predictions {
            let _ = writeln!(out, "#{}:", p.rank);
            let _ = writeln!(out, "  ID: {}", p.item_id);
            let _ = writeln!(out, "  Type: {}", p.item_type.as_str());
            let _ = writeln!(out, "  Confidence: {:.2}%", p.score * 100.0);
            if let Some(name) = &p.name {
                let _ = writeln!(out, "  Name: {}", name);
            }
            if let Some(info) = p.catalog.as_ref().filter(|c| c.resolved) {
                let _ = writeln!(out, "  Catalog: {}", info.name);
                if let Some(url) = &info.part_url {
                    let _ = writeln!(out, "  URL: {}", url);
                }
                if !info.colors.is_empty() {
                    let colors: Vec<_> = info
                        .colors
                        .iter()
                        .take(5)
                        .map(|c| c.color_name.as_str())
                        .collect();
                    let _ = writeln!(out, "  Colors: {}", colors.join(", "));
                }
            }
        }
    }
    out
}

/// Write `<stem>_results.json` and `<stem>_results.txt` into `dir`
pub fn write_reports(
    report: &BatchReport,
    dir: &Path,
    stem: &str,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("{}_results.json", stem));
    let text_path = dir.join(format!("{}_results.txt", stem));
    std::fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
    std::fs::write(&text_path, render_text(report))?;
    Ok((json_path, text_path))
}
