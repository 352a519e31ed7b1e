//! Batch statistics over the full aggregate set.
//!
//! Every function here is a pure function of the values it is given. Callers
//! recompute them whenever the aggregate set changes.

use std::cmp::Ordering;

use crate::models::IssueAggregate;

/// Percentile rank of each value in `(0, 1]`, in input order.
///
/// Tied values share the mean of the ranks they occupy; the rank is divided by
/// the number of values. NaN compares equal to everything and should not occur.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1 ..= end share their mean.
        let shared = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = shared / n as f64;
        }
        start = end;
    }

    ranks
}

/// Quantile with linear interpolation between closest ranks.
///
/// `q` is clamped to `[0, 1]`. Returns `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Fills `pct_rank_clicks` and `pct_rank_urls` across the whole set.
pub fn rank_aggregates(aggregates: &mut [IssueAggregate]) {
    let clicks: Vec<f64> = aggregates.iter().map(|row| row.total_clicks as f64).collect();
    let urls: Vec<f64> = aggregates
        .iter()
        .map(|row| row.affected_url_count as f64)
        .collect();

    let click_ranks = percentile_ranks(&clicks);
    let url_ranks = percentile_ranks(&urls);

    for (row, (click_rank, url_rank)) in aggregates
        .iter_mut()
        .zip(click_ranks.into_iter().zip(url_ranks))
    {
        row.pct_rank_clicks = click_rank;
        row.pct_rank_urls = url_rank;
    }
}
