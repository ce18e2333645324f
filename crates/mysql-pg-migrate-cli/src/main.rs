//! mysql-pg-migrate CLI - MySQL to PostgreSQL migration.

use clap::{ArgAction, Parser, Subcommand};
use mysql_pg_migrate::{Config, MigrateError, Orchestrator, Verbosity};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "Migrate schema and data from MySQL to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, global = true, default_value = "config.yml")]
    file: PathBuf,

    /// Increase verbosity (-v progress, -vv statements, -vvv config dump)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate schema and data to the configured destination
    Migrate,

    /// Drop the destination tables a migration would write
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, &cli.log_format).map_err(MigrateError::Config)?;
    let verbosity = Verbosity::new(cli.verbose);

    let config = Config::load(&cli.file)?;
    info!("Loaded configuration from {:?}", cli.file);

    let orchestrator = Orchestrator::new(config, verbosity)?;

    match cli.command {
        Commands::Migrate => {
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json().map_err(std::io::Error::from)?);
            } else {
                println!("\nMigration completed!");
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables_total);
                println!("  Rows: {}", result.rows_transferred);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
                for table in &result.tables {
                    if table.source == table.destination {
                        println!("    {}: {} rows", table.source, table.rows);
                    } else {
                        println!(
                            "    {} -> {}: {} rows",
                            table.source, table.destination, table.rows
                        );
                    }
                }
            }
        }

        Commands::Clear => {
            let dropped = orchestrator.clear().await?;

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&dropped).map_err(std::io::Error::from)?
                );
            } else {
                println!("Dropped {} destination tables", dropped.len());
                for name in &dropped {
                    println!("  {}", name);
                }
            }
        }
    }

    Ok(())
}

fn setup_logging(verbose: u8, format: &str) -> Result<(), String> {
    let level = match verbose {
        0 | 1 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}', expected text or json", other)),
    }

    Ok(())
}
