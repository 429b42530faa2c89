use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod db;
mod models;
mod report;
mod summary;

use models::{StudentRecord, Summary, SummarySource};

#[derive(Parser)]
#[command(name = "attendance-insights")]
#[command(about = "Per-student attendance analytics for Brookfield", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute the attendance summary for one student
    Summary {
        #[arg(long)]
        email: String,
        /// Reference day for the trailing window (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Emit the summary as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} events from {}.", csv.display());
        }
        Commands::Summary { email, as_of, json } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let Some(student) = db::fetch_student(&pool, &email).await? else {
                println!("No student found for {email}.");
                return Ok(());
            };
            let events = db::fetch_events(
                &pool,
                student.id,
                summary::window_start(as_of),
                as_of,
            )
            .await?;
            let result = summary::summarize(&student, &events, as_of);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&student, &result);
            }
        }
        Commands::Report { email, as_of, out } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let Some(student) = db::fetch_student(&pool, &email).await? else {
                println!("No student found for {email}.");
                return Ok(());
            };
            let events = db::fetch_events(
                &pool,
                student.id,
                summary::window_start(as_of),
                as_of,
            )
            .await?;
            let result = summary::summarize(&student, &events, as_of);
            let report = report::build_report(&student, &result, as_of);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_summary(student: &StudentRecord, summary: &Summary) {
    println!("Attendance for {} ({})", student.full_name, student.email);
    println!(
        "- overall {}% across {} classes ({} present, {} late, {} absent)",
        summary.overall_percentage,
        summary.total_classes,
        summary.present,
        summary.late,
        summary.absent
    );
    if summary.source == SummarySource::Estimated {
        println!("- estimated from lifetime counters; no events in the window");
    }
    if summary.skipped_records > 0 {
        println!("- skipped {} records with unrecognised status", summary.skipped_records);
    }
    for subject in summary.subjects.iter() {
        println!("- {}: {}%", subject.name, subject.percent);
    }
    for month in summary.monthly.iter() {
        println!("- {}: {}%", month.month, month.percent);
    }
}
