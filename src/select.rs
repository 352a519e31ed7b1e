use std::collections::HashMap;

use crate::aggregate::index_traffic;
use crate::models::{DetailRow, IssueAggregate, IssueDetail, IssueTable, TrafficRecord};
use crate::rank::quantile;

/// Issues at or above a percentile threshold of impact, with their detail rows.
#[derive(Debug, Clone)]
pub struct Selection {
    pub threshold_fraction: f64,
    pub threshold: f64,
    pub aggregates: Vec<IssueAggregate>,
    pub details: Vec<IssueDetail>,
}

impl Selection {
    pub fn count(&self) -> usize {
        self.aggregates.len()
    }

    /// Share of issues kept, e.g. "top 25.0%".
    pub fn label(&self) -> String {
        format!("top {:.1}%", (1.0 - self.threshold_fraction) * 100.0)
    }
}

/// Impact score at the given quantile of the current aggregate set.
pub fn impact_threshold(aggregates: &[IssueAggregate], threshold_fraction: f64) -> f64 {
    let scores: Vec<f64> = aggregates.iter().map(|row| row.impact_score).collect();
    quantile(&scores, threshold_fraction).unwrap_or(0.0)
}

/// Aggregates with `impact_score >= threshold`, in their existing order.
pub fn filter_by_threshold(
    aggregates: &[IssueAggregate],
    threshold_fraction: f64,
) -> (f64, Vec<IssueAggregate>) {
    let threshold = impact_threshold(aggregates, threshold_fraction);
    let kept = aggregates
        .iter()
        .filter(|row| row.impact_score >= threshold)
        .cloned()
        .collect();
    (threshold, kept)
}

/// Joins one table's occurrences to traffic, most clicked first.
pub fn detail_rows(table: &IssueTable, traffic: &HashMap<&str, &TrafficRecord>) -> Vec<DetailRow> {
    let mut rows: Vec<DetailRow> = table
        .rows
        .iter()
        .map(|occurrence| {
            let matched = traffic.get(occurrence.address.as_str());
            DetailRow {
                address: occurrence.address.clone(),
                clicks: matched.map_or(0, |record| record.clicks),
                impressions: matched.map_or(0, |record| record.impressions),
                ctr: matched.and_then(|record| record.ctr),
                position: matched.and_then(|record| record.position),
                fields: occurrence.fields.clone(),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    rows
}

pub fn select(
    aggregates: &[IssueAggregate],
    tables: &[IssueTable],
    traffic: &[TrafficRecord],
    threshold_fraction: f64,
) -> Selection {
    let (threshold, selected) = filter_by_threshold(aggregates, threshold_fraction);
    let traffic_index = index_traffic(traffic);

    let mut details = Vec::new();
    for row in &selected {
        for table in tables
            .iter()
            .filter(|table| table.issue_type_key == row.issue_type_key)
        {
            details.push(IssueDetail {
                issue_type_key: table.issue_type_key.clone(),
                quadrant: row.impact_quadrant,
                headers: table.headers.clone(),
                rows: detail_rows(table, &traffic_index),
            });
        }
    }

    Selection {
        threshold_fraction,
        threshold,
        aggregates: selected,
        details,
    }
}
