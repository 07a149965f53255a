use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod access;
mod clock;
mod config;
mod db;
mod error;
mod export;
mod models;
mod progress;
mod report;
mod service;
mod store;

use clock::Clock;
use config::Config;
use db::PgStore;
use models::{ExportParams, OverviewOrder, VerificationStatus};
use service::ProgressService;

#[derive(Parser)]
#[command(name = "intern-progress")]
#[command(about = "Procedure logging and progress tracking for medical interns", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "INTERN_PROGRESS_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Optional TOML file with a [reporting] section
    #[arg(long, env = "INTERN_PROGRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Evaluate time windows as of this RFC 3339 instant instead of now
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import log entries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Approve or reject a pending log entry
    Verify {
        #[arg(long)]
        log_entry: Uuid,
        #[arg(long)]
        as_user: Uuid,
        #[arg(long, value_enum)]
        decision: Decision,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show one intern's progress dashboard
    Dashboard {
        #[arg(long)]
        intern: Uuid,
        #[arg(long)]
        as_user: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Summarize progress across all interns
    Overview {
        #[arg(long)]
        as_user: Uuid,
        #[arg(long, value_enum, default_value_t = OverviewOrder::Id)]
        sort_by: OverviewOrder,
        #[arg(long)]
        json: bool,
    },
    /// Export an intern's log entries as CSV
    Export {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        as_user: Uuid,
        /// First calendar day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last calendar day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report for one intern, or the overview
    Report {
        #[arg(long)]
        intern: Option<Uuid>,
        #[arg(long)]
        as_user: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for VerificationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => VerificationStatus::Approved,
            Decision::Rejected => VerificationStatus::Rejected,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intern_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let clock = match cli.as_of {
        Some(instant) => Clock::fixed(instant, config.reporting.timezone()?),
        None => config.clock()?,
    };

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!(timezone = %clock.timezone(), "connected to database");

    let service = ProgressService::new(PgStore::new(pool), clock)
        .with_recent_activity_limit(config.reporting.recent_activity_limit);
    let pool = service.store().pool();

    match cli.command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(pool, &csv).await?;
            println!("Inserted {inserted} log entries from {}.", csv.display());
        }
        Commands::Verify {
            log_entry,
            as_user,
            decision,
            reason,
        } => {
            let requester = service.resolve_requester(as_user).await?;
            let mut conn = pool.acquire().await?;
            db::record_verification(
                &mut conn,
                log_entry,
                &requester,
                decision.into(),
                reason.as_deref(),
                clock.now(),
            )
            .await?;
            println!("Log entry {log_entry} marked {}.", VerificationStatus::from(decision));
        }
        Commands::Dashboard {
            intern,
            as_user,
            json,
        } => {
            let requester = service.resolve_requester(as_user).await?;
            let dashboard = service.compute_intern_dashboard(&requester, intern).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
                return Ok(());
            }

            let summary = &dashboard.summary;
            println!(
                "{}: {}% complete ({} of {} verified, {} pending)",
                dashboard.intern_name,
                summary.completion_percentage,
                summary.verified,
                summary.required,
                summary.pending
            );
            for rotation in &dashboard.rotations {
                println!(
                    "- {}: {}/{} verified, {} pending, {}% complete",
                    rotation.rotation_name,
                    rotation.verified,
                    rotation.required,
                    rotation.pending,
                    rotation.completion_percentage
                );
            }
        }
        Commands::Overview {
            as_user,
            sort_by,
            json,
        } => {
            let requester = service.resolve_requester(as_user).await?;
            let overview = service.compute_dashboard_overview(&requester, sort_by).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
                return Ok(());
            }

            println!(
                "{} interns, {} pending verifications, {} entries in the last 7 days",
                overview.total_interns,
                overview.pending_verifications,
                overview.recent_activity_count
            );
            for intern in &overview.interns {
                println!(
                    "- {} ({}): {}% complete, {} verified, {} pending",
                    intern.intern_name,
                    intern.intern_id,
                    intern.completion_percentage,
                    intern.verified,
                    intern.pending
                );
            }
        }
        Commands::Export {
            user,
            as_user,
            from,
            to,
            out,
        } => {
            let requester = service.resolve_requester(as_user).await?;
            let params = ExportParams::parse(user, from.as_deref(), to.as_deref())?;
            let rows = service.export_logs(&requester, &params).await?;

            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    export::write_csv(&rows, file)?;
                    eprintln!("Exported {} rows to {}.", rows.len(), path.display());
                }
                None => export::write_csv(&rows, std::io::stdout().lock())?,
            }
        }
        Commands::Report {
            intern,
            as_user,
            out,
        } => {
            let requester = service.resolve_requester(as_user).await?;
            let report = match intern {
                Some(intern_id) => {
                    let dashboard = service.compute_intern_dashboard(&requester, intern_id).await?;
                    report::build_dashboard_report(&dashboard, clock.today())
                }
                None => {
                    let overview = service
                        .compute_dashboard_overview(&requester, OverviewOrder::Name)
                        .await?;
                    report::build_overview_report(&overview, clock.today())
                }
            };
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
