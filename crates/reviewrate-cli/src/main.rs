mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use reviewrate_ai::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiOracle, RatingOracle};
use reviewrate_core::{ConfigError, RunConfig};
use reviewrate_pipeline::{Pipeline, discover};
use reviewrate_store::DuckStore;

#[derive(Parser)]
#[command(name = "reviewrate", version, about = "Incremental LLM rating of review/property pairs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the oracle, then rate every partition's backlog.
    Run(RunArgs),
    /// Show sampled, done and backlog counts. No oracle calls.
    Status(RunSelection),
    /// Create or replace a sampled table from a Parquet or CSV file.
    Import {
        #[arg(long, env = "REVIEWRATE_DB")]
        db: PathBuf,
        #[arg(long)]
        table: String,
        file: PathBuf,
    },
    /// Write a ledger table to Parquet.
    Export {
        #[arg(long, env = "REVIEWRATE_DB")]
        db: PathBuf,
        #[arg(long)]
        table: String,
        file: PathBuf,
    },
}

/// Which database, partitions and tables a command works on.
#[derive(Args)]
struct RunSelection {
    #[arg(long, env = "REVIEWRATE_DB")]
    db: PathBuf,

    /// JSON run config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Partition to process, repeatable. Processed in the given order.
    #[arg(long = "partition", short = 'p')]
    partitions: Vec<String>,

    /// Sampled table name, `{partition}` is substituted.
    #[arg(long)]
    sampled_table: Option<String>,

    /// Ledger table name, `{partition}` is substituted.
    #[arg(long)]
    ledger_table: Option<String>,

    /// Column holding the review title.
    #[arg(long)]
    title_field: Option<String>,

    /// Column holding the review body.
    #[arg(long)]
    body_field: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    selection: RunSelection,

    #[arg(long)]
    chunk_size: Option<usize>,

    /// Requested workers, clamped to available parallelism minus one.
    #[arg(long)]
    workers: Option<usize>,

    /// Product line shown in prompts. Defaults to the partition name.
    #[arg(long)]
    product_line_name: Option<String>,

    /// Rate at most this many items in this run. The rest stay in the backlog.
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl RunSelection {
    fn load_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => RunConfig::default(),
        };
        if !self.partitions.is_empty() {
            config.partitions = self.partitions.clone();
        }
        if let Some(t) = &self.sampled_table {
            config.sampled_table = t.clone();
        }
        if let Some(t) = &self.ledger_table {
            config.ledger_table = t.clone();
        }
        if let Some(f) = &self.title_field {
            config.columns.title = f.clone();
        }
        if let Some(f) = &self.body_field {
            config.columns.body = f.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    tracing::info!("reviewrate v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Status(selection) => status(&selection),
        Command::Import { db, table, file } => {
            let store = open_store(&db)?;
            let rows = store
                .import_sampled(&table, &file)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("Imported {rows} rows into {table}");
            Ok(())
        }
        Command::Export { db, table, file } => {
            let store = open_store(&db)?;
            let rows = store
                .export_ledger(&table, &file)
                .with_context(|| format!("exporting {table}"))?;
            println!("Exported {rows} rows to {}", file.display());
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = args.selection.load_config()?;
    if let Some(n) = args.chunk_size {
        config.chunk_size = n;
    }
    if let Some(n) = args.workers {
        config.workers = n;
    }
    if args.product_line_name.is_some() {
        config.product_line_name = args.product_line_name;
    }
    if args.limit.is_some() {
        config.max_items = args.limit;
    }
    config.validate()?;

    // Fail on a missing credential before the store is opened.
    let api_key = args
        .api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))?;
    let oracle: Arc<dyn RatingOracle> =
        Arc::new(OpenAiOracle::new(&args.base_url, api_key, args.model)?);

    let store = open_store(&args.selection.db)?;
    let mut pipeline = Pipeline::new(&store, oracle, config)?;
    match pipeline.run().await {
        Ok(report) => {
            display::print_run_report(&report.partitions);
            Ok(())
        }
        Err(aborted) => {
            if !aborted.completed.is_empty() {
                eprintln!("Completed before the abort:");
                display::print_run_report(&aborted.completed);
            }
            Err(aborted.into())
        }
    }
}

fn status(selection: &RunSelection) -> anyhow::Result<()> {
    let config = selection.load_config()?;
    config.validate()?;
    let store = open_store(&selection.db)?;

    let mut rows = Vec::with_capacity(config.partitions.len());
    for partition in &config.partitions {
        let backlog = discover(&store, &config, partition)
            .with_context(|| format!("discovering partition {partition}"))?;
        rows.push(backlog);
    }
    display::print_backlogs(&rows);
    Ok(())
}

fn open_store(path: &Path) -> anyhow::Result<DuckStore> {
    DuckStore::open_persistent(path).with_context(|| format!("opening {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"partitions": ["001", "002"], "chunk_size": 50, "columns": {"title": "headline"}}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "reviewrate",
            "run",
            "--db",
            "ratings.duckdb",
            "--config",
            path.to_str().unwrap(),
            "-p",
            "003",
            "--body-field",
            "Body",
            "--chunk-size",
            "10",
            "--limit",
            "25",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.selection.load_config().unwrap();
        assert_eq!(config.partitions, vec!["003"]);
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.columns.title, "headline");
        assert_eq!(config.columns.body, "Body");
        assert_eq!(args.chunk_size, Some(10));
        assert_eq!(args.limit, Some(25));
        assert_eq!(args.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn run_without_api_key_fails_before_opening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("ratings.duckdb");
        let cli = Cli::try_parse_from([
            "reviewrate",
            "run",
            "--db",
            db.to_str().unwrap(),
            "-p",
            "001",
        ])
        .unwrap();
        let Command::Run(mut args) = cli.command else {
            panic!("expected run");
        };
        // OPENAI_API_KEY may be set in the test environment.
        args.api_key = None;

        let err = run(args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingCredential(_))
        ));
        assert!(!db.exists());
    }

    #[test]
    fn status_reports_backlog_without_an_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("ratings.duckdb");
        {
            let store = DuckStore::open_persistent(&db).unwrap();
            store
                .execute_batch(
                    "CREATE TABLE comment_property_sampled_001 (item_id VARCHAR, reviewer_id VARCHAR, review_body VARCHAR, property_name VARCHAR);
                     INSERT INTO comment_property_sampled_001 VALUES ('A', 'R1', 'fine', 'grip');",
                )
                .unwrap();
        }
        let selection = RunSelection {
            db,
            config: None,
            partitions: vec!["001".into()],
            sampled_table: None,
            ledger_table: None,
            title_field: None,
            body_field: None,
        };
        status(&selection).unwrap();
    }
}
