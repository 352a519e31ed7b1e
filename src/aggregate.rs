use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::models::{
    ImpactQuadrant, IssueAggregate, IssueMetadata, IssueTable, TrafficRecord,
};

/// Turns an overview issue name into the key used by detail file names:
/// lowercased, non-word characters removed, whitespace runs collapsed to `_`.
pub fn normalize_issue_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_space = false;

    for ch in name.to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_space {
                slug.push('_');
                in_space = true;
            }
        } else if ch.is_alphanumeric() || ch == '_' {
            slug.push(ch);
            in_space = false;
        }
    }

    slug
}

/// Traffic rows keyed by address. The first row wins on duplicates.
pub fn index_traffic(records: &[TrafficRecord]) -> HashMap<&str, &TrafficRecord> {
    let mut index = HashMap::with_capacity(records.len());
    let mut duplicates = 0usize;
    for record in records {
        match index.entry(record.address.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(_) => duplicates += 1,
        }
    }
    if duplicates > 0 {
        warn!(duplicates, "duplicate traffic addresses, keeping the first row");
    }
    index
}

#[derive(Debug, Default)]
struct Totals {
    clicks: u64,
    impressions: u64,
    ctr_sum: f64,
    ctr_count: usize,
    position_sum: f64,
    position_count: usize,
    urls: usize,
}

impl Totals {
    fn add(&mut self, traffic: Option<&TrafficRecord>) {
        self.urls += 1;
        let Some(traffic) = traffic else {
            return;
        };
        self.clicks += traffic.clicks;
        self.impressions += traffic.impressions;
        if let Some(ctr) = traffic.ctr {
            self.ctr_sum += ctr;
            self.ctr_count += 1;
        }
        if let Some(position) = traffic.position {
            self.position_sum += position;
            self.position_count += 1;
        }
    }

    fn mean(sum: f64, count: usize) -> Option<f64> {
        (count > 0).then(|| sum / count as f64)
    }
}

#[derive(Debug, Default)]
pub struct Aggregation {
    pub aggregates: Vec<IssueAggregate>,
    /// Issue type keys with occurrences but no overview entry.
    pub unmatched: Vec<String>,
}

/// Joins occurrences to traffic, groups them per issue type and attaches
/// overview metadata. Issue types without metadata are dropped.
///
/// Occurrences with no traffic row count towards `affected_url_count` and add
/// zero clicks and impressions, but are left out of the CTR and position means.
pub fn aggregate(
    tables: &[IssueTable],
    traffic: &[TrafficRecord],
    metadata: &[IssueMetadata],
) -> Aggregation {
    let traffic_index = index_traffic(traffic);
    let mut grouped: BTreeMap<&str, Totals> = BTreeMap::new();

    for table in tables {
        for occurrence in &table.rows {
            grouped
                .entry(occurrence.issue_type_key.as_str())
                .or_default()
                .add(traffic_index.get(occurrence.address.as_str()).copied());
        }
    }

    let metadata_index: HashMap<&str, &IssueMetadata> = metadata
        .iter()
        .map(|meta| (meta.issue_type_normalized.as_str(), meta))
        .collect();

    let mut aggregation = Aggregation::default();

    for (key, totals) in grouped {
        let Some(meta) = metadata_index.get(key) else {
            warn!(issue_type = key, "no overview entry for issue type, dropping it");
            aggregation.unmatched.push(key.to_string());
            continue;
        };

        debug!(issue_type = key, urls = totals.urls, clicks = totals.clicks, "aggregated");
        aggregation.aggregates.push(IssueAggregate {
            issue_name: meta.issue_name.clone(),
            issue_type_key: key.to_string(),
            issue_category: meta.issue_category,
            issue_priority: meta.issue_priority,
            pct_of_total: meta.pct_of_total,
            total_clicks: totals.clicks,
            total_impressions: totals.impressions,
            mean_ctr: Totals::mean(totals.ctr_sum, totals.ctr_count),
            mean_position: Totals::mean(totals.position_sum, totals.position_count),
            affected_url_count: totals.urls,
            pct_rank_clicks: 0.0,
            pct_rank_urls: 0.0,
            priority_score: meta.issue_priority.score(),
            type_score: meta.issue_category.score(),
            impact_score: 0.0,
            impact_quadrant: ImpactQuadrant::Backlog,
            pct_rank_impact: 0.0,
        });
    }

    aggregation
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{IssueCategory, IssueOccurrence, IssuePriority};
    use pretty_assertions::assert_eq;

    pub(crate) fn table(key: &str, addresses: &[&str]) -> IssueTable {
        IssueTable {
            issue_type_key: key.to_string(),
            headers: vec!["Address".to_string()],
            rows: addresses
                .iter()
                .map(|address| IssueOccurrence {
                    address: address.to_string(),
                    issue_type_key: key.to_string(),
                    fields: vec![address.to_string()],
                })
                .collect(),
        }
    }

    pub(crate) fn traffic(address: &str, clicks: u64, ctr: f64, position: f64) -> TrafficRecord {
        TrafficRecord {
            address: address.to_string(),
            clicks,
            impressions: clicks * 10,
            ctr: Some(ctr),
            position: Some(position),
        }
    }

    pub(crate) fn meta(
        name: &str,
        category: IssueCategory,
        priority: IssuePriority,
    ) -> IssueMetadata {
        IssueMetadata {
            issue_name: name.to_string(),
            issue_type_normalized: normalize_issue_name(name),
            issue_category: category,
            issue_priority: priority,
            pct_of_total: None,
        }
    }

    #[test]
    fn normalizes_names_like_file_stems() {
        assert_eq!(
            normalize_issue_name("Security: Missing HSTS Header"),
            "security_missing_hsts_header"
        );
        assert_eq!(
            normalize_issue_name("Page Titles: Over 60 Characters"),
            "page_titles_over_60_characters"
        );
        assert_eq!(normalize_issue_name("H1:  Duplicate"), "h1_duplicate");
        assert_eq!(normalize_issue_name("Images: Over 100 KB (>100kb)"), "images_over_100_kb_100kb");
    }

    #[test]
    fn sums_and_averages_per_issue_type() {
        let tables = vec![table("missing_title", &["/a", "/b", "/c"])];
        let traffic = vec![traffic("/a", 100, 0.1, 2.0), traffic("/b", 50, 0.3, 4.0)];
        let metadata = vec![meta("Missing Title", IssueCategory::Issue, IssuePriority::High)];

        let aggregation = aggregate(&tables, &traffic, &metadata);
        assert_eq!(aggregation.aggregates.len(), 1);
        let row = &aggregation.aggregates[0];
        assert_eq!(row.issue_name, "Missing Title");
        assert_eq!(row.total_clicks, 150);
        assert_eq!(row.total_impressions, 1500);
        assert_eq!(row.affected_url_count, 3);
        assert!((row.mean_ctr.unwrap() - 0.2).abs() < 1e-12);
        assert!((row.mean_position.unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(row.priority_score, 5);
        assert_eq!(row.type_score, 5);
    }

    #[test]
    fn issue_without_traffic_has_no_means() {
        let tables = vec![table("missing_title", &["/a"])];
        let metadata = vec![meta("Missing Title", IssueCategory::Warning, IssuePriority::Low)];

        let aggregation = aggregate(&tables, &[], &metadata);
        let row = &aggregation.aggregates[0];
        assert_eq!(row.total_clicks, 0);
        assert_eq!(row.mean_ctr, None);
        assert_eq!(row.mean_position, None);
    }

    #[test]
    fn drops_issue_types_missing_from_overview() {
        let tables = vec![
            table("missing_title", &["/a"]),
            table("orphan_issue", &["/a", "/b"]),
        ];
        let metadata = vec![meta("Missing Title", IssueCategory::Issue, IssuePriority::High)];

        let aggregation = aggregate(&tables, &[], &metadata);
        let keys: Vec<&str> = aggregation
            .aggregates
            .iter()
            .map(|row| row.issue_type_key.as_str())
            .collect();
        assert_eq!(keys, vec!["missing_title"]);
        assert_eq!(aggregation.unmatched, vec!["orphan_issue".to_string()]);
    }

    #[test]
    fn duplicate_traffic_keeps_first_row() {
        let records = vec![traffic("/a", 10, 0.1, 1.0), traffic("/a", 99, 0.9, 9.0)];
        let index = index_traffic(&records);
        assert_eq!(index.len(), 1);
        assert_eq!(index["/a"].clicks, 10);
    }
}
