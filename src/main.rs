use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use painel_loader::config::{Config, DEFAULT_CONFIG_PATH};
use painel_loader::logging;
use painel_loader::pipeline::{run_flat, run_tree, Loader};
use painel_loader::report::LoadReport;
use painel_loader::store::{DocumentStore, FirestoreStore, InMemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "painel_loader")]
#[command(about = "Loads labor-market spreadsheets into Firestore")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write to an in-memory store instead of Firestore
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the nine dimension spreadsheets into the flat collection
    Flat {
        /// Use content-hash document ids so re-runs overwrite instead of duplicating
        #[arg(long)]
        idempotent: bool,
        /// Write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Walk the year/category tree and write one document per state
    Tree {
        /// Write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run the flat loader, then the tree loader
    Run {
        /// Directory for flat.json and tree.json run reports
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
}

async fn open_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if dry_run {
        info!("Dry run: documents go to an in-memory store");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let store = FirestoreStore::connect(&config.firestore)
        .await
        .context("connecting to Firestore")?;
    Ok(Arc::new(store))
}

fn finish(report: &LoadReport, path: Option<&Path>) -> anyhow::Result<()> {
    report.print_summary();
    if let Some(path) = path {
        report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        println!("   Report: {}", path.display());
    }
    if report.aborted {
        bail!("{} run aborted after {} error(s)", report.pipeline, report.errors.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging("logs");

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    let store = open_store(&config, cli.dry_run).await?;

    match cli.command {
        Commands::Flat { idempotent, report } => {
            println!("🔄 Running flat loader...");
            config.flat.idempotent |= idempotent;
            let loader = Loader::new(store, &config);
            let result = run_flat(&loader, &config.flat).await?;
            finish(&result, report.as_deref())?;
        }
        Commands::Tree { report } => {
            println!("🌳 Running tree loader...");
            let loader = Loader::new(store, &config);
            let result = run_tree(&loader, &config.tree).await?;
            finish(&result, report.as_deref())?;
        }
        Commands::Run { report_dir } => {
            println!("🚀 Running flat and tree loaders...");
            let loader = Loader::new(store, &config);

            println!("\n📥 Step 1: flat loader");
            let flat = run_flat(&loader, &config.flat).await?;
            let flat_path = report_dir.as_ref().map(|d| d.join("flat.json"));
            if let Err(e) = finish(&flat, flat_path.as_deref()) {
                error!("Flat loader failed: {}", e);
                return Err(e);
            }

            println!("\n🌳 Step 2: tree loader");
            let tree = run_tree(&loader, &config.tree).await?;
            let tree_path = report_dir.as_ref().map(|d| d.join("tree.json"));
            finish(&tree, tree_path.as_deref())?;
        }
    }

    println!("✅ Done");
    Ok(())
}
