//! mongo-sql-sync CLI - MongoDB to MySQL / SQL Server migration and sync.

use clap::{Parser, Subcommand};
use mongo_sql_sync::{
    AnalysisResult, CollectionOutcome, CollectionResult, Config, MigrationResult, Orchestrator, RunResult, SyncError,
    SyncResult, ValidationReport,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mongo-sql-sync")]
#[command(about = "MongoDB to MySQL / SQL Server schema inference, migration and sync")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer the schema of each collection and write its DDL file
    Analyze {
        /// Only process this collection
        #[arg(long)]
        collection: Option<String>,
    },

    /// Create the relational schema and load every document
    Migrate {
        /// Only process this collection
        #[arg(long)]
        collection: Option<String>,
    },

    /// Apply changes since the last run to each main table
    Sync {
        /// Only process this collection
        #[arg(long)]
        collection: Option<String>,

        /// Ignore saved state and rewrite every existing row
        #[arg(long)]
        force: bool,
    },

    /// Validate record counts and sampled documents against the destination
    Validate {
        /// Only process this collection
        #[arg(long)]
        collection: Option<String>,

        /// Documents to compare per collection (default: migration.validation_sample_size)
        #[arg(long)]
        sample_size: Option<usize>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Analyze { collection } => {
            let orchestrator = Orchestrator::source_only(config).await?;
            let result = orchestrator.analyze(collection.as_deref()).await;
            orchestrator.close().await;
            report(&result?, cli.output_json, print_analysis)
        }

        Commands::Migrate { collection } => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.migrate(collection.as_deref()).await;
            orchestrator.close().await;
            report(&result?, cli.output_json, print_migration)
        }

        Commands::Sync { collection, force } => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.sync(collection.as_deref(), force).await;
            orchestrator.close().await;
            report(&result?, cli.output_json, print_sync)
        }

        Commands::Validate {
            collection,
            sample_size,
        } => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator
                .validate(collection.as_deref(), sample_size)
                .await;
            orchestrator.close().await;
            report(&result?, cli.output_json, print_validation)
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MongoDB): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.target_type,
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(SyncError::connection(
                    "health check failed",
                    "connecting to the configured stores",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print a run result and map it to an exit code: 0 when every collection
/// succeeded, 1 otherwise.
fn report<T: CollectionOutcome + Serialize>(
    result: &RunResult<T>,
    json: bool,
    print: fn(&T),
) -> Result<ExitCode, SyncError> {
    if json {
        println!("{}", result.to_json()?);
    } else {
        println!("\n{} {}", result.command, result.status);
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!(
            "  Collections: {}/{}",
            result.collections_success, result.collections_total
        );
        for c in &result.collections {
            print_collection(c, print);
        }
        if !result.failed_collections.is_empty() {
            println!("  Failed collections: {:?}", result.failed_collections);
        }
    }

    Ok(if result.collections_failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_collection<T>(c: &CollectionResult<T>, print: fn(&T)) {
    println!("\n  {}:", c.collection);
    if let Some(ref err) = c.error {
        println!("    Error: {}", err);
    }
    if let Some(ref r) = c.result {
        print(r);
    }
}

fn print_warnings(warnings: &[String]) {
    for w in warnings {
        println!("    Warning: {}", w);
    }
}

fn print_analysis(r: &AnalysisResult) {
    println!(
        "    Sampled {} of {} documents, {} fields",
        r.documents_sampled,
        r.total_documents,
        r.schema.fields.len()
    );
    for table in &r.plan.tables {
        println!("    Table {} ({} columns)", table.name, table.columns.len());
    }
    println!("    DDL: {}", r.ddl_file);
    print_warnings(&r.warnings);
}

fn print_migration(r: &MigrationResult) {
    println!(
        "    Loaded {}/{} documents, {} child rows, {} failed",
        r.loaded, r.source_documents, r.child_rows, r.failed
    );
    println!("    Tables: {}", r.tables.join(", "));
    if !r.columns_added.is_empty() {
        println!("    Columns added: {}", r.columns_added.join(", "));
    }
    for e in &r.errors {
        println!("    {:?} {}: {}", e.operation, e.id, e.message);
    }
    print_warnings(&r.warnings);
}

fn print_sync(r: &SyncResult) {
    println!(
        "    {} new, {} updated, {} unchanged, {} deleted{}",
        r.new,
        r.updated,
        r.unchanged,
        r.deleted,
        if r.full_sync { " (full sync)" } else { "" }
    );
    if !r.columns_added.is_empty() {
        println!("    Columns added: {}", r.columns_added.join(", "));
    }
    for e in &r.errors {
        println!("    {:?} {}: {}", e.operation, e.id, e.message);
    }
    print_warnings(&r.warnings);
}

fn print_validation(r: &ValidationReport) {
    println!(
        "    {} (MongoDB: {}, SQL: {}, samples matched: {}/{}, fields compared: {})",
        r.overall_status,
        r.mongo_count,
        r.sql_count,
        r.samples_passed(),
        r.details.len(),
        r.fields_compared()
    );
    for issue in &r.issues {
        println!("    Issue: {}", issue);
    }
    print_warnings(&r.warnings);
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
