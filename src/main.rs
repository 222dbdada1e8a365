use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dbsync::api::{WorkspaceClient, WorkspaceCredentials};
use dbsync::config::ExportConfig;
use dbsync::pipeline::files::ExportFiles;
use dbsync::pipeline::Pipeline;
use dbsync::report::MemoryReport;
use dbsync::source::registry::build_sources;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Export Databricks workspace objects as Terraform JSON
#[derive(Parser, Debug)]
#[command(name = "dbsync", version = dbsync::VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the objects listed in a configuration file
    Export {
        /// Export configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory receiving `exports/` and the variable files
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Workspace URL (defaults to DATABRICKS_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Personal access token (defaults to DATABRICKS_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("dbsync started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("dbsync").join("dbsync.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".dbsync").join("dbsync.log");
    }
    PathBuf::from("dbsync.log")
}

async fn export(
    config: PathBuf,
    output: PathBuf,
    host: Option<String>,
    token: Option<String>,
) -> Result<bool> {
    let config = ExportConfig::load(&config)?;
    let credentials = WorkspaceCredentials::resolve(host.as_deref(), token.as_deref())?;
    tracing::info!("Exporting {} from {}", config.name, credentials.workspace_url());

    let client = WorkspaceClient::new(credentials)?;
    let files = ExportFiles::new(output);
    let sources = build_sources(&config, &client, &files)?;
    let report = Arc::new(MemoryReport::new());

    let results = Pipeline::new(sources, files, config.pipeline.clone(), report.clone())
        .run()
        .await?;

    let summary = report.summary();
    println!("{summary}");
    for collision in &results.collisions {
        println!("warning: {collision}");
    }
    for error in &results.lane_errors {
        eprintln!("error: {error}");
    }
    tracing::info!(
        "Run {} finished: {} documents, {} succeeded, {} failed",
        report.run_id(),
        results.documents,
        results.succeeded,
        results.failed
    );
    Ok(summary.total_failed() == 0 && results.lane_errors.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let clean = match args.command {
        Command::Export {
            config,
            output,
            host,
            token,
        } => export(config, output, host, token).await?,
    };

    if !clean {
        std::process::exit(1);
    }
    Ok(())
}
