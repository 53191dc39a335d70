use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tagscope::resolver::ResolveRequest;
use tagscope::ReadRequest;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagscope", about = "Natural-language tag lookup and reads against a process historian")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tagscope.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a description such as "kiln main drive speed last 24h" to tag paths
    Resolve {
        query: Vec<String>,
        /// Browse root to search under (repeatable)
        #[arg(long = "hint")]
        hints: Vec<String>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        bypass_cache: bool,
    },
    /// Read time-series data for one or more tag paths
    Read {
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
        #[arg(long, default_value = "last 1 hour")]
        start: String,
        #[arg(long, default_value = "now")]
        end: String,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long)]
        bypass_cache: bool,
    },
    /// Circuit, pool, client and cache counters
    Health,
    /// Remove cached responses matching a glob or key prefix
    Invalidate {
        #[arg(default_value = "*")]
        pattern: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = tagscope::load_config(&cli.config)?;
    let service = tagscope::build_service(&config).context("Failed to build service")?;

    match cli.command {
        Command::Resolve {
            query,
            hints,
            top_k,
            bypass_cache,
        } => {
            let mut request = ResolveRequest::new(query.join(" "))
                .with_hints(hints)
                .bypass_cache(bypass_cache);
            request.top_k = top_k;
            let result = service
                .resolve(&request)
                .await
                .map_err(|e| anyhow::anyhow!("Resolution failed: {e}"))?;
            emit(&result, cli.pretty)?;
        }
        Command::Read {
            tags,
            start,
            end,
            page_size,
            bypass_cache,
        } => {
            let request = ReadRequest {
                tag_names: tags,
                start,
                end,
                page_size,
                bypass_cache,
            };
            emit(&service.read(&request).await, cli.pretty)?;
        }
        Command::Health => emit(&service.health(), cli.pretty)?,
        Command::Invalidate { pattern } => {
            let removed = service
                .invalidate_cache(&pattern)
                .with_context(|| format!("Failed to invalidate '{pattern}'"))?;
            emit(&serde_json::json!({ "pattern": pattern, "removed": removed }), cli.pretty)?;
        }
    }

    Ok(())
}
