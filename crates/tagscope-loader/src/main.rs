use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tagscope_loader::seed::read_seed;
use tagscope_loader::writer::SqliteWriter;

#[derive(Parser, Debug)]
#[command(
    name = "tagscope-loader",
    about = "Tagscope catalog loader - imports a tag seed file into the SQLite tag catalog"
)]
struct Cli {
    /// JSON seed file: an array of tags or an object with a `tags` array
    #[arg(short, long)]
    seed: String,

    /// Catalog database to create or update
    #[arg(short, long, default_value = "data/catalog.db")]
    db: String,

    /// Delete existing rows before importing
    #[arg(long)]
    replace: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let report = read_seed(std::path::Path::new(&cli.seed), &Utc::now().to_rfc3339())
        .with_context(|| format!("Failed to read seed: {}", cli.seed))?;

    let mut writer = SqliteWriter::open(&cli.db)
        .with_context(|| format!("Failed to open catalog DB: {}", cli.db))?;

    let cleared = if cli.replace {
        writer.clear().context("Failed to clear catalog")?
    } else {
        0
    };
    let imported = writer
        .upsert_batch(&report.rows)
        .context("Failed to import seed rows")?;
    let total = writer.count()?;

    tracing::info!(
        seed = %cli.seed,
        db = %cli.db,
        imported,
        skipped = report.skipped,
        cleared,
        total,
        "Catalog import complete"
    );
    println!(
        "{}",
        serde_json::json!({
            "imported": imported,
            "skipped": report.skipped,
            "cleared": cleared,
            "total": total,
        })
    );

    Ok(())
}
