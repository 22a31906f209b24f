//! CLI entry point for graphwire.

use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use tracing_subscriber::{fmt, EnvFilter};

use graphwire_client::{statement, Session};
use graphwire_core::{ConnectionConfig, ConstraintKind, WrapLevel};

#[derive(Parser)]
#[command(name = "graphwire")]
#[command(about = "Run Cypher and schema queries against a graph database")]
struct Cli {
    /// Config file prefix (default: graphwire).
    #[arg(short, long, default_value = "graphwire")]
    config: String,

    /// Override the server URL (http://, https://, bolt:// or neo4j://).
    #[arg(long)]
    url: Option<String>,

    /// Print entity metadata as returned instead of wrapping it.
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single Cypher statement and print its rows.
    Query {
        cypher: String,

        /// Bind a parameter, e.g. --param name='"Alice"' or --param age=33.
        #[arg(short, long = "param", value_name = "NAME=JSON")]
        params: Vec<String>,
    },
    /// List schema indexes.
    Indexes {
        #[arg(short, long)]
        label: Option<String>,
    },
    /// List schema constraints.
    Constraints {
        #[arg(short, long)]
        label: Option<String>,

        /// Only uniqueness constraints.
        #[arg(long)]
        uniqueness: bool,
    },
    /// Print the server version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut config = ConnectionConfig::load(&cli.config)?;
    if let Some(url) = cli.url {
        config.url = url;
    }
    if cli.raw {
        config.wrap_level = WrapLevel::None;
    }

    let session = Session::connect(&config).await?;

    let output = match cli.command {
        Command::Query { cypher, params } => {
            let mut stmt = statement(cypher);
            for raw in &params {
                let (name, value) = parse_param(raw)?;
                stmt = stmt.param(&name, value);
            }
            let result = session.query(stmt).await?;
            tracing::info!(rows = result.len(), "Query complete");
            Json::Array(result.rows().iter().map(|row| row.to_json()).collect())
        }
        Command::Indexes { label } => {
            let listing = session.indexes(label.as_deref()).await?;
            serde_json::to_value(listing)?
        }
        Command::Constraints { label, uniqueness } => {
            let kind = uniqueness.then_some(ConstraintKind::Uniqueness);
            let listing = session.constraints(label.as_deref(), kind).await?;
            serde_json::to_value(listing)?
        }
        Command::Version => Json::String(session.version().await?),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Split `name=value`, reading the value as JSON and falling back to a plain string.
fn parse_param(raw: &str) -> anyhow::Result<(String, Json)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid parameter {raw:?}: expected NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid parameter {raw:?}: empty name");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Json::String(value.to_string()));
    Ok((name.to_string(), value))
}
