use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::pipeline::Analysis;
use crate::select::Selection;

fn format_optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.precision$}"))
}

pub fn build_report(
    analysis: &Analysis,
    selection: &Selection,
    generated_at: DateTime<Utc>,
    limit: usize,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Technical SEO Issue Prioritization");
    let _ = writeln!(
        output,
        "Generated {} for {} scored issue types",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        analysis.aggregates.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Impact Mix");

    for summary in analysis.quadrants() {
        let _ = writeln!(
            output,
            "- {}: {} issues, {} clicks (avg impact {:.1})",
            summary.quadrant, summary.count, summary.total_clicks, summary.avg_impact
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Impact Issues");
    let _ = writeln!(
        output,
        "| Issue | Quadrant | Impact | Clicks | URLs | Avg CTR | Avg Position |"
    );
    let _ = writeln!(output, "|---|---|---:|---:|---:|---:|---:|");

    for row in analysis.aggregates.iter().take(limit) {
        let _ = writeln!(
            output,
            "| {} | {} | {:.2} | {} | {} | {} | {} |",
            row.issue_name,
            row.impact_quadrant,
            row.impact_score,
            row.total_clicks,
            row.affected_url_count,
            format_optional(row.mean_ctr, 4),
            format_optional(row.mean_position, 1)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Export Selection");
    let _ = writeln!(
        output,
        "Threshold at the {:.0}th percentile (impact >= {:.2}) selects {} issues ({}).",
        selection.threshold_fraction * 100.0,
        selection.threshold,
        selection.count(),
        selection.label()
    );

    for row in &selection.aggregates {
        let _ = writeln!(
            output,
            "- {} ({}, {} priority): {:.2}",
            row.issue_name,
            row.issue_category.as_str(),
            row.issue_priority.as_str(),
            row.impact_score
        );
    }

    let has_notes = !analysis.unmatched.is_empty()
        || !analysis.load_errors.is_empty()
        || analysis.skipped_files > 0
        || analysis.dropped_rows > 0;
    if has_notes {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Input Notes");
        if analysis.skipped_files > 0 {
            let _ = writeln!(
                output,
                "- {} non-data files skipped in the issues directory",
                analysis.skipped_files
            );
        }
        if analysis.dropped_rows > 0 {
            let _ = writeln!(
                output,
                "- {} rows without an address dropped",
                analysis.dropped_rows
            );
        }
        for key in &analysis.unmatched {
            let _ = writeln!(output, "- `{key}` has no overview entry and was not scored");
        }
        for err in &analysis.load_errors {
            let _ = writeln!(output, "- skipped: {err}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;
    use crate::pipeline::tests::write_fixture;
    use chrono::TimeZone;

    #[test]
    fn report_lists_sections() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixture(dir.path());
        let analysis = pipeline::run(&config).unwrap();
        let selection = analysis.select(config.threshold);
        let generated_at = Utc.with_ymd_and_hms(2026, 2, 2, 9, 30, 0).unwrap();

        let report = build_report(&analysis, &selection, generated_at, 10);

        assert!(report.starts_with("# Technical SEO Issue Prioritization\n"));
        assert!(report.contains("Generated 2026-02-02 09:30 UTC for 4 scored issue types"));
        assert!(report.contains("- High: 1 issues"));
        assert!(report.contains("| Page Titles: Missing | High |"));
        assert!(report.contains("| H1: Multiple | Backlog |"));
        assert!(report.contains("selects 1 issues (top 25.0%)"));
        assert!(report.contains("`orphan_pages` has no overview entry"));
        assert!(report.contains("- 1 non-data files skipped in the issues directory"));
        assert!(report.contains("- 1 rows without an address dropped"));
    }

    #[test]
    fn missing_traffic_means_render_as_na() {
        assert_eq!(format_optional(None, 2), "n/a");
        assert_eq!(format_optional(Some(0.04567), 3), "0.046");
    }
}
