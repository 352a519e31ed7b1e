use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PrioritizerError, Result};
use crate::models::{ImpactQuadrant, IssueAggregate, IssueDetail};
use crate::select::Selection;

/// Spreadsheet tools reject longer sheet names.
pub const SHEET_NAME_LIMIT: usize = 31;

const AGGREGATE_HEADERS: [&str; 15] = [
    "Issue Name",
    "Issue Type",
    "Issue Priority",
    "% of Total",
    "Issue Key",
    "Clicks",
    "Impressions",
    "CTR",
    "Position",
    "URLs",
    "pct_rank_clicks",
    "pct_rank_urls",
    "Impact Score",
    "Impact Quadrant",
    "pct_rank_impact",
];

const TRAFFIC_HEADERS: [&str; 5] = ["Address", "Clicks", "Impressions", "CTR", "Position"];

#[derive(Debug, Serialize)]
struct ExportManifest<'a> {
    generated_at: DateTime<Utc>,
    threshold_fraction: f64,
    threshold: f64,
    selected_count: usize,
    selected: Vec<&'a str>,
    issues: &'a [IssueAggregate],
}

#[derive(Debug)]
pub struct ExportSummary {
    pub out_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub issue_count: usize,
}

fn optional(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

/// Truncates to the sheet-name limit and disambiguates repeats with a suffix.
pub fn sheet_name(base: &str, taken: &mut HashSet<String>) -> String {
    let truncate = |text: &str, limit: usize| text.chars().take(limit).collect::<String>();

    let mut name = truncate(base, SHEET_NAME_LIMIT);
    let mut counter = 2;
    while !taken.insert(name.clone()) {
        let suffix = format!("_{counter}");
        name = format!(
            "{}{suffix}",
            truncate(base, SHEET_NAME_LIMIT - suffix.len())
        );
        counter += 1;
    }
    name
}

/// Checks `out_dir` without creating it. Returns the existing entries.
fn ensure_writable(out_dir: &Path, overwrite: bool) -> Result<Vec<String>> {
    if !out_dir.exists() {
        return Ok(Vec::new());
    }
    if !out_dir.is_dir() {
        return Err(PrioritizerError::Config(format!(
            "{} is not a directory",
            out_dir.display()
        )));
    }
    let mut existing = Vec::new();
    for entry in std::fs::read_dir(out_dir)? {
        existing.push(entry?.file_name().to_string_lossy().into_owned());
    }
    if !existing.is_empty() && !overwrite {
        return Err(PrioritizerError::Config(format!(
            "{} is not empty; confirm to overwrite",
            out_dir.display()
        )));
    }
    Ok(existing)
}

/// Closest existing ancestor of `out_dir`, so staging never creates directories.
fn staging_parent(out_dir: &Path) -> PathBuf {
    out_dir
        .ancestors()
        .skip(1)
        .find(|ancestor| !ancestor.as_os_str().is_empty() && ancestor.is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn write_quadrant_sheet(path: &Path, rows: &[&IssueAggregate]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(AGGREGATE_HEADERS)?;
    for row in rows {
        writer.write_record([
            row.issue_name.clone(),
            row.issue_category.as_str().to_string(),
            row.issue_priority.as_str().to_string(),
            optional(row.pct_of_total),
            row.issue_type_key.clone(),
            row.total_clicks.to_string(),
            row.total_impressions.to_string(),
            optional(row.mean_ctr),
            optional(row.mean_position),
            row.affected_url_count.to_string(),
            row.pct_rank_clicks.to_string(),
            row.pct_rank_urls.to_string(),
            row.impact_score.to_string(),
            row.impact_quadrant.to_string(),
            row.pct_rank_impact.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_detail_sheet(path: &Path, detail: &IssueDetail) -> Result<()> {
    let address_idx = detail.headers.iter().position(|header| header == "Address");
    let crawl_columns: Vec<(usize, String)> = detail
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != address_idx)
        .map(|(idx, header)| {
            let name = if TRAFFIC_HEADERS.contains(&header.as_str()) {
                format!("{header}_crawl")
            } else {
                header.clone()
            };
            (idx, name)
        })
        .collect();

    let mut writer = csv::Writer::from_path(path)?;
    let mut headers: Vec<String> = TRAFFIC_HEADERS.iter().map(|h| h.to_string()).collect();
    headers.extend(crawl_columns.iter().map(|(_, name)| name.clone()));
    writer.write_record(&headers)?;

    for row in &detail.rows {
        let mut record = vec![
            row.address.clone(),
            row.clicks.to_string(),
            row.impressions.to_string(),
            optional(row.ctr),
            optional(row.position),
        ];
        record.extend(
            crawl_columns
                .iter()
                .map(|(idx, _)| row.fields.get(*idx).cloned().unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the quadrant sheets, per-issue detail sheets and `summary.json`.
///
/// Files are written to a staging directory next to `out_dir` and moved into
/// place once all of them succeeded; `out_dir` is only created at that point
/// and the staging directory is removed on every path. An existing non-empty `out_dir` is only written to when `overwrite`
/// is set.
pub fn export_selection(
    out_dir: &Path,
    all_issues: &[IssueAggregate],
    selection: &Selection,
    generated_at: DateTime<Utc>,
    overwrite: bool,
) -> Result<ExportSummary> {
    let existing = ensure_writable(out_dir, overwrite)?;

    let staging = tempfile::Builder::new()
        .prefix(".audit-export-")
        .tempdir_in(staging_parent(out_dir))?;

    let mut staged = Vec::new();
    let mut taken = HashSet::new();

    for quadrant in ImpactQuadrant::ALL {
        let rows: Vec<&IssueAggregate> = selection
            .aggregates
            .iter()
            .filter(|row| row.impact_quadrant == quadrant)
            .collect();
        let name = sheet_name(&format!("{quadrant}_Priority"), &mut taken);
        let file_name = format!("{name}.csv");
        write_quadrant_sheet(&staging.path().join(&file_name), &rows)?;
        staged.push(file_name);
    }

    for detail in &selection.details {
        let name = sheet_name(
            &format!("{}_{}", detail.quadrant, detail.issue_type_key),
            &mut taken,
        );
        let file_name = format!("{name}.csv");
        write_detail_sheet(&staging.path().join(&file_name), detail)?;
        debug!(sheet = %name, rows = detail.rows.len(), "wrote detail sheet");
        staged.push(file_name);
    }

    let manifest = ExportManifest {
        generated_at,
        threshold_fraction: selection.threshold_fraction,
        threshold: selection.threshold,
        selected_count: selection.count(),
        selected: selection
            .aggregates
            .iter()
            .map(|row| row.issue_type_key.as_str())
            .collect(),
        issues: all_issues,
    };
    serde_json::to_writer_pretty(File::create(staging.path().join("summary.json"))?, &manifest)?;
    staged.push("summary.json".to_string());

    let stale: Vec<&String> = existing
        .iter()
        .filter(|name| name.ends_with(".csv") && !staged.contains(*name))
        .collect();
    if !stale.is_empty() {
        warn!(
            out_dir = %out_dir.display(),
            files = ?stale,
            "sheets from an earlier export are left in place"
        );
    }

    std::fs::create_dir_all(out_dir)?;
    let mut files = Vec::with_capacity(staged.len());
    for file_name in staged {
        let target = out_dir.join(&file_name);
        std::fs::rename(staging.path().join(&file_name), &target)?;
        files.push(target);
    }

    info!(out_dir = %out_dir.display(), files = files.len(), "export written");

    Ok(ExportSummary {
        out_dir: out_dir.to_path_buf(),
        files,
        issue_count: selection.count(),
    })
}
