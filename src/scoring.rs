use std::cmp::Ordering;

use crate::models::IssueAggregate;

pub const CLICK_WEIGHT: f64 = 0.3;
pub const SECURITY_CLICK_WEIGHT: f64 = 0.001;
pub const SCOPE_WEIGHT: f64 = 0.25;
pub const PRIORITY_WEIGHT: f64 = 0.25;
pub const TYPE_WEIGHT: f64 = 0.20;

/// Weighted evidence signals that sum to an impact score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactComponents {
    pub click: f64,
    pub scope: f64,
    pub priority: f64,
    pub type_: f64,
}

impl ImpactComponents {
    /// Composite score on a 0-100 scale. Not clamped.
    pub fn score(&self) -> f64 {
        (self.click + self.scope + self.priority + self.type_) * 100.0
    }
}

/// Security issues matter regardless of traffic, so clicks barely move them.
pub fn click_multiplier(issue_name: &str) -> f64 {
    if issue_name.contains("Security") {
        SECURITY_CLICK_WEIGHT
    } else {
        CLICK_WEIGHT
    }
}

/// Scores one aggregate. Rank fields must already be filled in, and
/// `max_clicks` is the largest `total_clicks` across the whole set.
pub fn impact_components(row: &IssueAggregate, max_clicks: u64) -> ImpactComponents {
    let click = if max_clicks == 0 {
        0.0
    } else {
        (row.total_clicks as f64).ln_1p() / (max_clicks as f64).ln_1p()
            * click_multiplier(&row.issue_name)
    };

    ImpactComponents {
        click,
        scope: row.pct_rank_urls * row.pct_rank_clicks * SCOPE_WEIGHT,
        priority: f64::from(row.priority_score) / 5.0 * PRIORITY_WEIGHT,
        type_: f64::from(row.type_score) / 5.0 * TYPE_WEIGHT,
    }
}

/// Fills `impact_score` for every row.
pub fn score_aggregates(aggregates: &mut [IssueAggregate]) {
    let max_clicks = aggregates
        .iter()
        .map(|row| row.total_clicks)
        .max()
        .unwrap_or(0);

    for row in aggregates.iter_mut() {
        row.impact_score = impact_components(row, max_clicks).score();
    }
}

/// Highest impact first; ties fall back to issue name so the order does not
/// depend on input order.
pub fn sort_by_impact(aggregates: &mut [IssueAggregate]) {
    aggregates.sort_by(|a, b| {
        b.impact_score
            .partial_cmp(&a.impact_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.issue_name.cmp(&b.issue_name))
    });
}
