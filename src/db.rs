use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::IssueAggregate;

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub issues_dir: String,
    pub threshold: f64,
    pub issue_count: i32,
    pub selected_count: i32,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores one run and all its scored issues in a single transaction.
pub async fn save_run(
    pool: &PgPool,
    issues_dir: &str,
    threshold: f64,
    aggregates: &[IssueAggregate],
    selected_count: usize,
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO audit_prioritizer.analysis_runs
        (id, issues_dir, threshold, issue_count, selected_count)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(run_id)
    .bind(issues_dir)
    .bind(threshold)
    .bind(i32::try_from(aggregates.len())?)
    .bind(i32::try_from(selected_count)?)
    .execute(&mut *tx)
    .await?;

    for row in aggregates {
        sqlx::query(
            r#"
            INSERT INTO audit_prioritizer.issue_scores
            (run_id, issue_type_key, issue_name, category, priority, total_clicks,
             affected_url_count, impact_score, quadrant, pct_rank_impact)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(run_id)
        .bind(&row.issue_type_key)
        .bind(&row.issue_name)
        .bind(row.issue_category.as_str())
        .bind(row.issue_priority.as_str())
        .bind(i64::try_from(row.total_clicks)?)
        .bind(i32::try_from(row.affected_url_count)?)
        .bind(row.impact_score)
        .bind(row.impact_quadrant.as_str())
        .bind(row.pct_rank_impact)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(run_id)
}

pub async fn fetch_runs(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<RunRecord>> {
    let records = sqlx::query(
        "SELECT id, created_at, issues_dir, threshold, issue_count, selected_count \
         FROM audit_prioritizer.analysis_runs \
         ORDER BY created_at DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut runs = Vec::new();

    for row in records {
        runs.push(RunRecord {
            id: row.get("id"),
            created_at: row.get("created_at"),
            issues_dir: row.get("issues_dir"),
            threshold: row.get("threshold"),
            issue_count: row.get("issue_count"),
            selected_count: row.get("selected_count"),
        });
    }

    Ok(runs)
}
