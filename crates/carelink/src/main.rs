//! CareLink - admin and reporting CLI for the local clinical-referral store

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use carelink_core::{
    PatientFilter, PatientRepository, ReferralFilter, ReferralRepository, SystemClock,
};
use carelink_db::{Database, Filter, Patient, Referral, RowStore};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;

/// CareLink - admin and reporting CLI for the local referral store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Database file, overriding the configured path
    #[arg(long, env = "CARELINK_DATABASE")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database schema
    Migrate,

    /// List referrals, newest first
    Referrals {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        urgency: Option<String>,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Show one referral by tracking number
    Referral { tracking_number: String },

    /// List or search patients
    Patients {
        /// Match first name, last name or medical record number
        #[arg(long)]
        search: Option<String>,
    },

    /// Patients with scheduled appointments in the next N days
    Upcoming {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Print record counts and referral status totals as JSON
    Stats,
}

#[derive(Serialize)]
struct StoreStats {
    patients: i64,
    referrals: i64,
    referrals_by_status: std::collections::BTreeMap<String, i64>,
    urgent_pending: usize,
    providers: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;
    if let Some(path) = args.database {
        config.database.path = path;
    }

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format);

    info!("Starting CareLink v{}", env!("CARGO_PKG_VERSION"));

    // Create the data directory
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    // Initialize database
    let db = Arc::new(
        Database::new(&config.database_url())
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?,
    );

    let repo_config = config.cache.repository_config();
    let clock = Arc::new(SystemClock);
    let referrals = ReferralRepository::new(db.clone(), clock.clone(), repo_config.clone());
    let patients = PatientRepository::new(db.clone(), clock, repo_config);

    match args.command {
        Command::Migrate => {
            println!("Database ready at {}", config.database.path);
        }
        Command::Referrals {
            status,
            urgency,
            patient,
            limit,
        } => {
            let filter = ReferralFilter {
                status,
                urgency,
                patient_id: patient,
                limit: Some(limit),
                ..Default::default()
            };
            for referral in referrals.list(&filter).await? {
                print_referral(&referral);
            }
        }
        Command::Referral { tracking_number } => {
            let Some(referral) = referrals.get_by_tracking_number(&tracking_number).await? else {
                bail!("No referral with tracking number {}", tracking_number);
            };
            println!("{}", serde_json::to_string_pretty(&referral)?);
        }
        Command::Patients { search } => {
            let found = match search {
                Some(term) => patients.search(&term).await?,
                None => patients.list(&PatientFilter::default()).await?,
            };
            for patient in found {
                print_patient(&patient);
            }
        }
        Command::Upcoming { days } => {
            let horizon = chrono::Duration::try_days(days.max(0))
                .context("--days is out of range")?;
            for patient in patients.with_upcoming_appointments(horizon).await? {
                print_patient(&patient);
            }
        }
        Command::Stats => {
            let stats = StoreStats {
                patients: db.count("patients", &Filter::new()).await?,
                referrals: db.count("referrals", &Filter::new()).await?,
                referrals_by_status: referrals.count_by_status().await?,
                urgent_pending: referrals.urgent_pending().await?.len(),
                providers: db.count_providers().await?,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn print_referral(referral: &Referral) {
    println!(
        "{}  {:<9}  {:<6}  {:<16}  {}  {}",
        referral.tracking_number,
        referral.status,
        referral.urgency,
        referral.specialty,
        referral.patient_id,
        referral.reason
    );
}

fn print_patient(patient: &Patient) {
    println!(
        "{}  {:<11}  {}  {}",
        patient.id,
        patient.status,
        patient.full_name(),
        patient.medical_record_number.as_deref().unwrap_or("-")
    );
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so command output stays pipeable
    if format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}
