use anyhow::{bail, Context, Result};
use carbon_core::{Category, ProjectRecord};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "carbon-cli")]
#[command(about = "CLI client for a blue carbon chain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show chain height, tip hash and next difficulty
    Head,
    /// Audit the whole chain
    Validate,
    /// List registered projects
    Projects,
    /// Show one project
    Project { id: String },
    /// Register a project and mint its credits
    Register {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// mangrove, seagrass, coral or other
        #[arg(long)]
        category: Category,
        /// Tonnes of CO₂ absorbed
        #[arg(long)]
        tons: u64,
        /// Account credited with the issued BCT
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value_t = 0)]
        area_ha: u64,
        #[arg(long, default_value = "")]
        species: String,
        /// Project this record revises
        #[arg(long)]
        supersedes: Option<String>,
    },
    /// Move BCT between accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Show one account's balance
    Balance { account: String },
    /// Show every balance and the total supply
    Balances,
}

#[derive(Serialize)]
struct TransferOut {
    from_account: String,
    to_account: String,
    amount: u64,
}

impl Command {
    fn record(&self) -> Option<ProjectRecord> {
        let Command::Register {
            id,
            name,
            category,
            tons,
            owner,
            location,
            area_ha,
            species,
            supersedes,
        } = self
        else {
            return None;
        };
        let mut record = ProjectRecord::new(id.as_str(), name.as_str(), *category, *tons, owner.as_str())
            .with_location(location.as_str())
            .with_area_ha(*area_ha)
            .with_species(species.as_str());
        if let Some(old) = supersedes {
            record = record.superseding(old.as_str());
        }
        Some(record)
    }
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await.context("reading node response")?;
    debug!(%status, "node replied");
    let pretty = serde_json::from_str::<Value>(&body)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or(body);
    println!("{pretty}");
    if !status.is_success() {
        bail!("node returned {status}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = Client::new();

    let request = match &cli.cmd {
        Command::Head => client.get(format!("{node}/chain/head")),
        Command::Validate => client.get(format!("{node}/chain/validate")),
        Command::Projects => client.get(format!("{node}/projects")),
        Command::Project { id } => client.get(format!("{node}/projects/{id}")),
        Command::Register { .. } => {
            let record = cli.cmd.record().context("building project record")?;
            client.post(format!("{node}/projects")).json(&record)
        }
        Command::Transfer { from, to, amount } => client
            .post(format!("{node}/transfers"))
            .json(&TransferOut {
                from_account: from.clone(),
                to_account: to.clone(),
                amount: *amount,
            }),
        Command::Balance { account } => client.get(format!("{node}/balances/{account}")),
        Command::Balances => client.get(format!("{node}/balances")),
    };

    let res = request
        .send()
        .await
        .with_context(|| format!("contacting node at {node}"))?;
    print_response(res).await
}
