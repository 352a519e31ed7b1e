use tracing::info;

use crate::aggregate::aggregate;
use crate::config::AnalysisConfig;
use crate::error::{PrioritizerError, Result};
use crate::loader;
use crate::models::{IssueAggregate, IssueMetadata, IssueTable, QuadrantSummary, TrafficRecord};
use crate::quadrant::{classify, summarize_quadrants};
use crate::rank::rank_aggregates;
use crate::scoring::{score_aggregates, sort_by_impact};
use crate::select::{select, Selection};

/// Everything one analysis run produced.
#[derive(Debug)]
pub struct Analysis {
    /// Scored issues, highest impact first.
    pub aggregates: Vec<IssueAggregate>,
    pub tables: Vec<IssueTable>,
    pub traffic: Vec<TrafficRecord>,
    pub load_errors: Vec<PrioritizerError>,
    pub skipped_files: usize,
    pub dropped_rows: usize,
    pub unmatched: Vec<String>,
}

impl Analysis {
    pub fn select(&self, threshold_fraction: f64) -> Selection {
        select(&self.aggregates, &self.tables, &self.traffic, threshold_fraction)
    }

    pub fn quadrants(&self) -> Vec<QuadrantSummary> {
        summarize_quadrants(&self.aggregates)
    }
}

/// Aggregates, ranks, scores and classifies loaded tables.
///
/// Returns the scored issues sorted by impact, plus the issue type keys
/// dropped for lacking overview metadata. Nothing is returned unless every
/// stage succeeds.
pub fn score_tables(
    tables: &[IssueTable],
    traffic: &[TrafficRecord],
    metadata: &[IssueMetadata],
) -> Result<(Vec<IssueAggregate>, Vec<String>)> {
    let aggregation = aggregate(tables, traffic, metadata);
    let mut aggregates = aggregation.aggregates;

    if aggregates.len() < 2 {
        return Err(PrioritizerError::DegenerateInput {
            found: aggregates.len(),
        });
    }

    rank_aggregates(&mut aggregates);
    score_aggregates(&mut aggregates);
    classify(&mut aggregates);
    sort_by_impact(&mut aggregates);

    Ok((aggregates, aggregation.unmatched))
}

pub fn run(config: &AnalysisConfig) -> Result<Analysis> {
    let load = loader::load_issue_tables(&config.issues_dir)?;
    let metadata = loader::load_overview(&config.overview)?;
    let traffic = loader::load_traffic(&config.traffic)?;
    info!(
        tables = load.tables.len(),
        occurrences = load.occurrence_count(),
        overview = metadata.len(),
        traffic = traffic.len(),
        "inputs loaded"
    );

    let (aggregates, unmatched) = score_tables(&load.tables, &traffic, &metadata)?;
    info!(issues = aggregates.len(), unmatched = unmatched.len(), "issues scored");

    Ok(Analysis {
        aggregates,
        tables: load.tables,
        traffic,
        load_errors: load.errors,
        skipped_files: load.skipped_files,
        dropped_rows: load.dropped_rows,
        unmatched,
    })
}
