use crate::models::{ImpactQuadrant, IssueAggregate, QuadrantSummary};
use crate::rank::{percentile_ranks, quantile};

/// Quartile edges of `scores` at 25%, 50% and 75%.
pub fn quartile_edges(scores: &[f64]) -> [f64; 3] {
    let edge = |q| quantile(scores, q).unwrap_or(0.0);
    [edge(0.25), edge(0.5), edge(0.75)]
}

/// Bins are right-closed: a score equal to an edge stays in the lower bin.
/// Equal edges collapse their bins, so tied scores never straddle a boundary.
pub fn quadrant_for(score: f64, edges: &[f64; 3]) -> ImpactQuadrant {
    let quartile = 1 + edges.iter().filter(|edge| score > **edge).count();
    // Three edges bound the quartile to 1..=4.
    ImpactQuadrant::from_quartile(quartile).unwrap_or(ImpactQuadrant::High)
}

/// Fills `impact_quadrant` and `pct_rank_impact` for every row.
pub fn classify(aggregates: &mut [IssueAggregate]) {
    let scores: Vec<f64> = aggregates.iter().map(|row| row.impact_score).collect();
    let edges = quartile_edges(&scores);
    let ranks = percentile_ranks(&scores);

    for (row, rank) in aggregates.iter_mut().zip(ranks) {
        row.impact_quadrant = quadrant_for(row.impact_score, &edges);
        row.pct_rank_impact = rank;
    }
}

/// Per-quadrant counts in export order; empty quadrants are included.
pub fn summarize_quadrants(aggregates: &[IssueAggregate]) -> Vec<QuadrantSummary> {
    ImpactQuadrant::ALL
        .iter()
        .map(|&quadrant| {
            let members: Vec<&IssueAggregate> = aggregates
                .iter()
                .filter(|row| row.impact_quadrant == quadrant)
                .collect();
            let count = members.len();
            QuadrantSummary {
                quadrant,
                count,
                total_clicks: members.iter().map(|row| row.total_clicks).sum(),
                avg_impact: if count == 0 {
                    0.0
                } else {
                    members.iter().map(|row| row.impact_score).sum::<f64>() / count as f64
                },
            }
        })
        .collect()
}
