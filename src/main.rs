use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod db;
mod error;
mod export;
mod loader;
mod models;
mod pipeline;
mod quadrant;
mod rank;
mod report;
mod scoring;
mod select;

use config::{AnalysisConfig, DEFAULT_THRESHOLD};

#[derive(Parser)]
#[command(name = "audit-prioritizer")]
#[command(about = "Prioritize technical SEO audit issues by traffic impact", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Directory of per-issue crawl exports, one CSV per issue type
    #[arg(long, env = "AUDIT_ISSUES_DIR")]
    issues_dir: PathBuf,
    /// Issues overview report CSV
    #[arg(long, env = "AUDIT_OVERVIEW")]
    overview: PathBuf,
    /// Search console traffic CSV
    #[arg(long, env = "AUDIT_TRAFFIC")]
    traffic: PathBuf,
    /// Impact percentile at or above which issues are selected
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
}

impl InputArgs {
    fn into_config(self) -> anyhow::Result<AnalysisConfig> {
        AnalysisConfig::new(self.issues_dir, self.overview, self.traffic, self.threshold)
            .context("invalid analysis inputs")
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Score issues and print the ranking
    Analyze {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Persist the scored run to Postgres
        #[arg(long)]
        save: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write CSV sheets for the issues above the threshold
    Export {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long)]
        out_dir: PathBuf,
        /// Overwrite a non-empty output directory
        #[arg(long)]
        yes: bool,
    },
    /// List persisted analysis runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("AUDIT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn report_load_problems(analysis: &pipeline::Analysis) {
    for err in &analysis.load_errors {
        eprintln!("Skipped: {err}");
    }
    if analysis.skipped_files > 0 {
        eprintln!("Skipped {} non-data files.", analysis.skipped_files);
    }
    if analysis.dropped_rows > 0 {
        eprintln!("Dropped {} rows without an address.", analysis.dropped_rows);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Analyze {
            inputs,
            limit,
            format,
            save,
        } => {
            let config = inputs.into_config()?;
            let analysis = pipeline::run(&config).context("analysis failed")?;
            report_load_problems(&analysis);
            let selection = analysis.select(config.threshold);

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&analysis.aggregates)?);
                }
                OutputFormat::Text => {
                    println!("Top issues by impact score:");
                    for row in analysis.aggregates.iter().take(limit) {
                        println!(
                            "- [{}] {} score {:.2} ({} clicks across {} URLs)",
                            row.impact_quadrant,
                            row.issue_name,
                            row.impact_score,
                            row.total_clicks,
                            row.affected_url_count
                        );
                    }
                    println!();
                    for summary in analysis.quadrants() {
                        println!("{}: {} issues", summary.quadrant, summary.count);
                    }
                    println!(
                        "Current threshold will export {} issues ({} by impact score).",
                        selection.count(),
                        selection.label()
                    );
                }
            }

            if save {
                let pool = connect().await?;
                let run_id = db::save_run(
                    &pool,
                    &config.issues_dir.display().to_string(),
                    config.threshold,
                    &analysis.aggregates,
                    selection.count(),
                )
                .await?;
                eprintln!("Saved run {run_id}.");
            }
        }
        Commands::Report { inputs, limit, out } => {
            let config = inputs.into_config()?;
            let analysis = pipeline::run(&config).context("analysis failed")?;
            report_load_problems(&analysis);
            let selection = analysis.select(config.threshold);
            let report = report::build_report(&analysis, &selection, chrono::Utc::now(), limit);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            inputs,
            out_dir,
            yes,
        } => {
            let config = inputs.into_config()?;
            let analysis = pipeline::run(&config).context("analysis failed")?;
            report_load_problems(&analysis);
            let selection = analysis.select(config.threshold);
            println!(
                "Current threshold will export {} issues ({} by impact score).",
                selection.count(),
                selection.label()
            );

            let summary = export::export_selection(
                &out_dir,
                &analysis.aggregates,
                &selection,
                chrono::Utc::now(),
                yes,
            )
            .with_context(|| format!("failed to export to {}", out_dir.display()))?;
            println!(
                "Exported {} issues to {} ({} files).",
                summary.issue_count,
                summary.out_dir.display(),
                summary.files.len()
            );
        }
        Commands::Runs { limit } => {
            let pool = connect().await?;
            let runs = db::fetch_runs(&pool, limit).await?;

            if runs.is_empty() {
                println!("No analysis runs saved yet.");
                return Ok(());
            }

            println!("Recent analysis runs:");
            for run in runs {
                println!(
                    "- {} at {}: {} issues, {} selected at {:.2} ({})",
                    run.id,
                    run.created_at.format("%Y-%m-%d %H:%M"),
                    run.issue_count,
                    run.selected_count,
                    run.threshold,
                    run.issues_dir
                );
            }
        }
    }

    Ok(())
}
