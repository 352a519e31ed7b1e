use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// One URL instance of an issue type, taken from a crawl-detail export.
#[derive(Debug, Clone)]
pub struct IssueOccurrence {
    pub address: String,
    pub issue_type_key: String,
    /// Source row values, aligned with the owning table's `headers`.
    pub fields: Vec<String>,
}

/// All occurrences loaded from one per-issue-type export file.
#[derive(Debug, Clone)]
pub struct IssueTable {
    pub issue_type_key: String,
    pub headers: Vec<String>,
    pub rows: Vec<IssueOccurrence>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
    pub address: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: Option<f64>,
    pub position: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCategory {
    Warning,
    Opportunity,
    Issue,
}

impl IssueCategory {
    pub fn score(self) -> u8 {
        match self {
            IssueCategory::Warning => 1,
            IssueCategory::Opportunity => 3,
            IssueCategory::Issue => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Warning => "Warning",
            IssueCategory::Opportunity => "Opportunity",
            IssueCategory::Issue => "Issue",
        }
    }
}

impl FromStr for IssueCategory {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Warning" => Ok(IssueCategory::Warning),
            "Opportunity" => Ok(IssueCategory::Opportunity),
            "Issue" => Ok(IssueCategory::Issue),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssuePriority {
    Low,
    Medium,
    High,
}

impl IssuePriority {
    pub fn score(self) -> u8 {
        match self {
            IssuePriority::Low => 1,
            IssuePriority::Medium => 3,
            IssuePriority::High => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssuePriority::Low => "Low",
            IssuePriority::Medium => "Medium",
            IssuePriority::High => "High",
        }
    }
}

impl FromStr for IssuePriority {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Low" => Ok(IssuePriority::Low),
            "Medium" => Ok(IssuePriority::Medium),
            "High" => Ok(IssuePriority::High),
            _ => Err(()),
        }
    }
}

/// One row of the issues overview export.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueMetadata {
    pub issue_name: String,
    pub issue_type_normalized: String,
    pub issue_category: IssueCategory,
    pub issue_priority: IssuePriority,
    pub pct_of_total: Option<f64>,
}

/// Quartile bucket of an issue's impact score, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ImpactQuadrant {
    Backlog,
    Low,
    Medium,
    High,
}

impl ImpactQuadrant {
    /// Export order: most urgent first.
    pub const ALL: [ImpactQuadrant; 4] = [
        ImpactQuadrant::High,
        ImpactQuadrant::Medium,
        ImpactQuadrant::Low,
        ImpactQuadrant::Backlog,
    ];

    /// Label for a 1-based quartile; `None` outside `1..=4`.
    pub fn from_quartile(quartile: usize) -> Option<Self> {
        match quartile {
            1 => Some(ImpactQuadrant::Backlog),
            2 => Some(ImpactQuadrant::Low),
            3 => Some(ImpactQuadrant::Medium),
            4 => Some(ImpactQuadrant::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImpactQuadrant::Backlog => "Backlog",
            ImpactQuadrant::Low => "Low",
            ImpactQuadrant::Medium => "Medium",
            ImpactQuadrant::High => "High",
        }
    }
}

impl fmt::Display for ImpactQuadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per issue type: the unit the engine scores and ranks.
///
/// Built by the aggregator, then enriched by the rank normalizer, the impact
/// scorer and the quadrant classifier. Derived fields stay at their zero
/// values until the stage that owns them has run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueAggregate {
    pub issue_name: String,
    pub issue_type_key: String,
    pub issue_category: IssueCategory,
    pub issue_priority: IssuePriority,
    pub pct_of_total: Option<f64>,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub mean_ctr: Option<f64>,
    pub mean_position: Option<f64>,
    pub affected_url_count: usize,
    pub pct_rank_clicks: f64,
    pub pct_rank_urls: f64,
    pub priority_score: u8,
    pub type_score: u8,
    pub impact_score: f64,
    pub impact_quadrant: ImpactQuadrant,
    pub pct_rank_impact: f64,
}

/// An occurrence joined with its traffic row, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub address: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: Option<f64>,
    pub position: Option<f64>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IssueDetail {
    pub issue_type_key: String,
    pub quadrant: ImpactQuadrant,
    pub headers: Vec<String>,
    pub rows: Vec<DetailRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuadrantSummary {
    pub quadrant: ImpactQuadrant,
    pub count: usize,
    pub total_clicks: u64,
    pub avg_impact: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_and_priority_scores_follow_fixed_maps() {
        assert_eq!(IssueCategory::Warning.score(), 1);
        assert_eq!(IssueCategory::Opportunity.score(), 3);
        assert_eq!(IssueCategory::Issue.score(), 5);
        assert_eq!(IssuePriority::Low.score(), 1);
        assert_eq!(IssuePriority::Medium.score(), 3);
        assert_eq!(IssuePriority::High.score(), 5);
    }

    #[test]
    fn parses_overview_labels() {
        assert_eq!(" Opportunity".parse(), Ok(IssueCategory::Opportunity));
        assert_eq!("High".parse(), Ok(IssuePriority::High));
        assert!("high".parse::<IssuePriority>().is_err());
        assert!("Notice".parse::<IssueCategory>().is_err());
    }

    #[test]
    fn quartiles_map_to_labels() {
        assert_eq!(ImpactQuadrant::from_quartile(1), Some(ImpactQuadrant::Backlog));
        assert_eq!(ImpactQuadrant::from_quartile(2), Some(ImpactQuadrant::Low));
        assert_eq!(ImpactQuadrant::from_quartile(3), Some(ImpactQuadrant::Medium));
        assert_eq!(ImpactQuadrant::from_quartile(4), Some(ImpactQuadrant::High));
        assert_eq!(ImpactQuadrant::from_quartile(0), None);
        assert_eq!(ImpactQuadrant::from_quartile(5), None);
        assert!(ImpactQuadrant::High > ImpactQuadrant::Backlog);
    }
}
