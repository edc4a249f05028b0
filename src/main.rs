mod classify;
mod config;
mod db;
mod engine;
mod import;
mod models;
mod telemetry;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use config::AppConfig;
use db::{Database, NewPosting};
use engine::features::RoleFilter;
use engine::{Engine, EngineError, NewQuery, ScoringStrategy, TopQuery};
use models::{Company, SignalKind};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "radar")]
#[command(about = "Hiring radar - rank companies by recent hiring activity")]
struct Cli {
    /// Log at debug level, ignoring RUST_LOG and RADAR_LOG_LEVEL
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file overriding scoring windows, weights and limits
    #[arg(long, global = true)]
    scoring_config: Option<PathBuf>,

    /// Database file (defaults to RADAR_DB_PATH or the user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage companies
    Company {
        #[command(subcommand)]
        command: CompanyCommands,
    },

    /// Manage job postings
    Posting {
        #[command(subcommand)]
        command: PostingCommands,
    },

    /// Import a JSON array of normalized postings for a company
    Import {
        /// Company name or ID
        company: String,

        /// Path to the postings file
        file: PathBuf,

        /// Keep only postings of this role family (and its synonyms)
        #[arg(long)]
        only_role: Option<String>,
    },

    /// Record market signals
    Signal {
        #[command(subcommand)]
        command: SignalCommands,
    },

    /// Show the top companies by hiring activity
    Top {
        /// Role family to count (synonyms included)
        #[arg(short, long, default_value = "software")]
        role_family: String,

        /// Number of companies to show
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Scoring strategy (live, legacy)
        #[arg(short, long, default_value = "live")]
        strategy: ScoringStrategy,

        /// Only companies with at least one open matching posting
        #[arg(long)]
        active_only: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show recently created companies ordered by new postings
    New {
        /// Role family to count (synonyms included)
        #[arg(short, long, default_value = "software")]
        role_family: String,

        /// Size of the "recent" window in days
        #[arg(short, long, default_value = "7")]
        days: u32,

        /// Number of companies to show
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Dump per-company feature vectors as JSON
    Features {
        /// Role family to count (synonyms included)
        #[arg(short, long, default_value = "software")]
        role_family: String,
    },
}

#[derive(Subcommand)]
enum CompanyCommands {
    /// Add a company (no-op if the name exists)
    Add {
        /// Company name
        name: String,

        /// Careers page URL
        #[arg(long)]
        careers_url: Option<String>,

        /// ATS kind (greenhouse, lever, ashby, smartrecruiters)
        #[arg(long)]
        ats: Option<String>,
    },

    /// List companies
    List,
}

#[derive(Subcommand)]
enum PostingCommands {
    /// Add or refresh a posting
    Add {
        /// Company name or ID
        company: String,

        /// Posting ID on the source board
        source_job_id: String,

        /// Posting title
        title: String,

        /// Role family (classified from the title when omitted)
        #[arg(short, long)]
        role_family: Option<String>,

        /// Creation time (RFC 3339, date, or epoch); defaults to now
        #[arg(long, value_parser = parse_timestamp_arg)]
        created_at: Option<DateTime<Utc>>,

        /// Last update time; defaults to the creation time
        #[arg(long, value_parser = parse_timestamp_arg)]
        updated_at: Option<DateTime<Utc>>,
    },

    /// Mark a posting as closed
    Close {
        /// Posting ID
        id: i64,
    },

    /// List a company's open postings
    List {
        /// Company name or ID
        company: String,

        /// Role family filter (synonyms included)
        #[arg(short, long)]
        role_family: Option<String>,

        /// Only postings touched in the last N days
        #[arg(long)]
        since_days: Option<u32>,

        /// Maximum number of postings
        #[arg(short, long, default_value = "500")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SignalCommands {
    /// Record a signal (community_hiring, layoff, funding, earnings)
    Add {
        /// Company name or ID
        company: String,

        /// Signal kind
        kind: SignalKind,

        /// When it happened; defaults to now
        #[arg(long, value_parser = parse_timestamp_arg)]
        at: Option<DateTime<Utc>>,

        /// Optional JSON payload
        #[arg(long)]
        payload: Option<String>,
    },
}

fn parse_timestamp_arg(value: &str) -> Result<DateTime<Utc>, String> {
    import::parse_timestamp(value).ok_or_else(|| format!("unrecognized timestamp '{}'", value))
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: String,
    kind: &'a str,
    detail: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.scoring_config.as_deref());
    if cli.verbose {
        telemetry::init("debug", true)?;
    } else {
        telemetry::init(&config.log_level, false)?;
    }

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let now = Utc::now();

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Company { command } => {
            db.ensure_initialized()?;
            match command {
                CompanyCommands::Add {
                    name,
                    careers_url,
                    ats,
                } => {
                    let (id, created) =
                        db.add_company(&name, careers_url.as_deref(), ats.as_deref())?;
                    if created {
                        println!("Added company '{}' (ID: {})", name.trim(), id);
                    } else {
                        println!("Company '{}' already exists (ID: {})", name.trim(), id);
                    }
                }

                CompanyCommands::List => {
                    let companies = db.list_companies()?;
                    if companies.is_empty() {
                        println!("No companies found.");
                    } else {
                        println!("{:<6} {:<30} {:<16} {:<20}", "ID", "NAME", "ATS", "CREATED");
                        println!("{}", "-".repeat(74));
                        for company in companies {
                            println!(
                                "{:<6} {:<30} {:<16} {:<20}",
                                company.id,
                                truncate(&company.display_name(), 28),
                                company.ats_kind.as_deref().unwrap_or("-"),
                                company.created_at.format("%Y-%m-%d %H:%M")
                            );
                        }
                    }
                }
            }
        }

        Commands::Posting { command } => {
            db.ensure_initialized()?;
            match command {
                PostingCommands::Add {
                    company,
                    source_job_id,
                    title,
                    role_family,
                    created_at,
                    updated_at,
                } => {
                    let company = resolve_company(&db, &company)?;
                    let role_family = role_family.or_else(|| {
                        classify::role_family_from_title(&title).map(str::to_string)
                    });
                    let posting = NewPosting {
                        source_job_id,
                        title,
                        department: None,
                        location: None,
                        apply_url: None,
                        role_family,
                        created_at: created_at.unwrap_or(now),
                        updated_at,
                    };
                    let id = db.upsert_posting(company.id, &posting)?;
                    println!(
                        "Stored posting #{} for {} (role family: {})",
                        id,
                        company.display_name(),
                        posting.role_family.as_deref().unwrap_or("-")
                    );
                }

                PostingCommands::Close { id } => {
                    if db.close_posting(id)? {
                        println!("Closed posting #{}.", id);
                    } else {
                        println!("No open posting #{}.", id);
                    }
                }

                PostingCommands::List {
                    company,
                    role_family,
                    since_days,
                    limit,
                } => {
                    let company = resolve_company(&db, &company)?;
                    let filter = match role_family.as_deref() {
                        Some(f) => Some(RoleFilter::new(f, &config.scoring()?.role_family_synonyms)),
                        None => None,
                    };
                    let since = since_days.map(|d| now - Duration::days(i64::from(d)));
                    let postings = db.list_company_postings(
                        company.id,
                        filter.as_ref().and_then(RoleFilter::accepted),
                        since,
                        limit,
                    )?;
                    if postings.is_empty() {
                        println!("No open postings found for {}.", company.display_name());
                    } else {
                        println!("{:<6} {:<36} {:<10} {:<20} {:<16}", "ID", "TITLE", "FAMILY", "LOCATION", "UPDATED");
                        println!("{}", "-".repeat(92));
                        for posting in postings {
                            println!(
                                "{:<6} {:<36} {:<10} {:<20} {:<16}",
                                posting.id,
                                truncate(&posting.title, 34),
                                posting.role_family.as_deref().unwrap_or("-"),
                                truncate(posting.location.as_deref().unwrap_or("-"), 18),
                                posting.effective_at().format("%Y-%m-%d %H:%M")
                            );
                        }
                    }
                }
            }
        }

        Commands::Import {
            company,
            file,
            only_role,
        } => {
            db.ensure_initialized()?;
            let company = resolve_company(&db, &company)?;
            let rows = import::load_rows(&file)?;
            let filter = match only_role.as_deref() {
                Some(f) => Some(RoleFilter::new(f, &config.scoring()?.role_family_synonyms)),
                None => None,
            };
            let stats = import::import_postings(&db, company.id, &rows, filter.as_ref(), now)?;

            println!("Imported postings for {}:", company.display_name());
            println!("  Rows read:        {}", stats.rows);
            println!("  Stored:           {}", stats.imported);
            if stats.skipped_no_id > 0 {
                println!("  Skipped (no id):  {}", stats.skipped_no_id);
            }
            if stats.skipped_role > 0 {
                println!("  Skipped (role):   {}", stats.skipped_role);
            }
        }

        Commands::Signal { command } => {
            db.ensure_initialized()?;
            match command {
                SignalCommands::Add {
                    company,
                    kind,
                    at,
                    payload,
                } => {
                    let company = resolve_company(&db, &company)?;
                    let payload = payload
                        .as_deref()
                        .map(serde_json::from_str::<serde_json::Value>)
                        .transpose()
                        .context("Signal payload is not valid JSON")?;
                    let id = db.add_signal(company.id, kind, at.unwrap_or(now), payload.as_ref())?;
                    println!("Recorded {} signal #{} for {}", kind, id, company.display_name());
                }
            }
        }

        Commands::Top {
            role_family,
            limit,
            strategy,
            active_only,
            json,
        } => {
            let query = TopQuery {
                role_family,
                limit,
                strategy,
                active_only,
            };
            let engine = build_engine(&config).map_err(|err| engine_failure("top", err, json))?;
            let records = match engine.top(&db, &query, now) {
                Ok(records) => records,
                Err(err) => return Err(engine_failure("top", err, json)),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No companies to rank.");
            } else {
                println!(
                    "{:<5} {:<6} {:<26} {:>6} {:>6} {:>6} {:>6} {:>5} {:>7}",
                    "RANK", "ID", "COMPANY", "SCORE", "OPEN", "FRESH", "MOM", "COMM", "LAYOFF"
                );
                println!("{}", "-".repeat(82));
                for (i, record) in records.iter().enumerate() {
                    let f = &record.features;
                    println!(
                        "{:<5} {:<6} {:<26} {:>6} {:>6} {:>6} {:>6} {:>5} {:>7.3}",
                        i + 1,
                        record.company_id,
                        truncate(&record.company_name, 24),
                        record.score,
                        f.open_count,
                        f.fresh_7d,
                        f.momentum_positive,
                        if f.community_presence { "yes" } else { "-" },
                        f.layoff_decay
                    );
                }
            }
        }

        Commands::New {
            role_family,
            days,
            limit,
            json,
        } => {
            let query = NewQuery {
                role_family,
                days,
                limit,
            };
            let engine = build_engine(&config).map_err(|err| engine_failure("new", err, json))?;
            let records = match engine.new_companies(&db, &query, now) {
                Ok(records) => records,
                Err(err) => return Err(engine_failure("new", err, json)),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No new companies with matching postings in the last {} days.", days);
            } else {
                println!(
                    "{:<5} {:<6} {:<30} {:>6} {:>8} {:>6}",
                    "RANK", "ID", "COMPANY", "NEW", "OPEN", "SCORE"
                );
                println!("{}", "-".repeat(66));
                for (i, record) in records.iter().enumerate() {
                    println!(
                        "{:<5} {:<6} {:<30} {:>6} {:>8} {:>6}",
                        i + 1,
                        record.company_id,
                        truncate(&record.company_name, 28),
                        record.sde_new,
                        record.sde_openings,
                        record.score
                    );
                }
            }
        }

        Commands::Features { role_family } => {
            let engine = build_engine(&config).map_err(|err| engine_failure("features", err, true))?;
            let records = match engine.features(&db, &role_family, now) {
                Ok(records) => records,
                Err(err) => return Err(engine_failure("features", err, true)),
            };
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// Scoring config problems only fail the commands that score.
fn build_engine(config: &AppConfig) -> Result<Engine, EngineError> {
    Engine::new(config.scoring()?)
}

/// Looks a company up by numeric ID first, then by name.
fn resolve_company(db: &Database, key: &str) -> Result<Company> {
    if let Ok(id) = key.trim().parse::<i64>() {
        if let Some(company) = db.get_company(id)? {
            return Ok(company);
        }
    }
    db.get_company_by_name(key)?
        .ok_or_else(|| anyhow!("Company '{}' not found. Add it with 'radar company add'.", key))
}

/// Boundary translation of an engine failure. With `json` the caller gets an
/// error payload on stdout; either way the process exits non-zero.
fn engine_failure(view: &str, err: EngineError, json: bool) -> anyhow::Error {
    if json {
        let payload = ErrorPayload {
            error: format!("{}_failed", view),
            kind: err.kind(),
            detail: error_chain(&err),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(body) => println!("{}", body),
            Err(e) => tracing::error!(error = %e, "failed to encode error payload"),
        }
    }
    anyhow::Error::new(err).context(format!("{} view failed", view))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
