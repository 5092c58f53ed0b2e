use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bid_oracle::config::Config;
use bid_oracle::matching::scorer::RelevanceScorer;
use bid_oracle::matching::MatchScore;
use bid_oracle::opportunity::materializer::{materialize_notices, MaterializationReport, Materializer};
use bid_oracle::opportunity::refresh::{index_by_id, refresh_scores, RefreshReport};
use bid_oracle::opportunity::{Opportunity, OpportunityKey, OpportunityStatus, StatusUpdate};
use bid_oracle::output::csv::{materialize_to_csv, opportunities_to_csv, prices_to_csv};
use bid_oracle::output::json::render_json;
use bid_oracle::output::table::{
    render_materialize_table, render_opportunities_table, render_price_table,
    render_refresh_table, render_score_table,
};
use bid_oracle::pricing::{PricedItem, ProposalItem};
use bid_oracle::server::{run_server, ApiState};
use bid_oracle::sources::file::FileSource;
use bid_oracle::sources::http::HttpSource;
use bid_oracle::sources::retry::{retry_with_backoff, RetryPolicy};
use bid_oracle::sources::ProfileSource;
use bid_oracle::store::sqlite::SqliteStore;
use bid_oracle::store::OpportunityStore;
use bid_oracle::types::{NoticeProfile, OrganizationProfile};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "bid-oracle",
    about = "Procurement notice matching and bid pricing"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Price a proposal item (or a JSON array of items) under the three strategies
    Price {
        #[arg(long)]
        input: PathBuf,
    },
    /// Score one notice against one organization
    Score {
        #[arg(long)]
        notice: PathBuf,
        #[arg(long)]
        organization: PathBuf,
    },
    /// Create or update opportunities for every matching organization
    Materialize {
        #[arg(long)]
        notices: Option<PathBuf>,
        #[arg(long)]
        organizations: Option<PathBuf>,
        #[arg(long)]
        include_closed: bool,
    },
    /// Re-score opportunities still in new or reviewing
    Refresh {
        #[arg(long)]
        notices: Option<PathBuf>,
        #[arg(long)]
        organizations: Option<PathBuf>,
    },
    Opportunities {
        /// Comma-separated statuses, e.g. new,reviewing
        #[arg(long)]
        status: Option<String>,
    },
    /// Move an opportunity along its lifecycle
    Status {
        #[arg(long)]
        organization: String,
        #[arg(long)]
        notice: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        responsible: Option<String>,
        #[arg(long)]
        justification: Option<String>,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(Some(&config_path))?;

    match &cli.command {
        Commands::Price { input } => {
            let items: Vec<ProposalItem> = read_one_or_many(input)?;
            for item in &items {
                let priced = item
                    .price(config.pricing.default_markup_pct)
                    .with_context(|| format!("failed pricing item '{}'", item.description))?;
                print_prices(&priced, cli.output)?;
            }
        }
        Commands::Score {
            notice,
            organization,
        } => {
            let notice: NoticeProfile = read_json(notice)?;
            let organization: OrganizationProfile = read_json(organization)?;
            let result = RelevanceScorer::from_config(&config.matching).score(&notice, &organization)?;
            print_score(&notice, &organization, &result, cli.output)?;
        }
        Commands::Materialize {
            notices,
            organizations,
            include_closed,
        } => {
            let (notices, organizations) =
                load_profiles(&config, notices.as_deref(), organizations.as_deref()).await?;
            let today = Utc::now().date_naive();
            let (open, closed): (Vec<_>, Vec<_>) = notices
                .into_iter()
                .partition(|notice| *include_closed || notice.is_open(today));
            for notice in &closed {
                info!(notice_id = %notice.id, "skipping notice past its closing date");
            }
            let store = open_store(&config)?;
            let materializer = Arc::new(Materializer::from_config(&config.matching, store));
            let reports = materialize_notices(materializer, open, Arc::new(organizations)).await?;
            print_materialize(&reports, cli.output)?;
        }
        Commands::Refresh {
            notices,
            organizations,
        } => {
            let (notices, organizations) =
                load_profiles(&config, notices.as_deref(), organizations.as_deref()).await?;
            let store = open_store(&config)?;
            let scorer = RelevanceScorer::from_config(&config.matching);
            let report = refresh_scores(
                store.as_ref(),
                &scorer,
                &index_by_id(notices, |n| n.id.as_str()),
                &index_by_id(organizations, |o| o.id.as_str()),
            )?;
            print_refresh(&report, cli.output)?;
        }
        Commands::Opportunities { status } => {
            let statuses = status.as_deref().map(parse_status_list).transpose()?;
            let store = open_store(&config)?;
            let opportunities = store.list(statuses.as_deref())?;
            print_opportunities(&opportunities, cli.output)?;
        }
        Commands::Status {
            organization,
            notice,
            to,
            responsible,
            justification,
        } => {
            let update = StatusUpdate {
                status: OpportunityStatus::from_str(to)?,
                responsible: responsible.clone(),
                justification: justification.clone(),
            };
            let key = OpportunityKey::new(organization, notice);
            let store = open_store(&config)?;
            let updated = store.update_status(&key, &update, Utc::now())?;
            info!(opportunity = %key, status = %updated.status, "opportunity status changed");
            print_opportunities(&[updated], cli.output)?;
        }
        Commands::Serve { host, port } => {
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            let store = open_store(&config)?;
            return run_server(ApiState::new(config, store), addr).await;
        }
        Commands::Config { init, show } => {
            return handle_config_command(*init, *show, &config, &config_path);
        }
    }

    Ok(())
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn OpportunityStore>> {
    let db_path = config.resolved_db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed opening opportunity store: {}", db_path.display()))?;
    Ok(Arc::new(store))
}

async fn load_profiles(
    config: &Config,
    notices: Option<&Path>,
    organizations: Option<&Path>,
) -> Result<(Vec<NoticeProfile>, Vec<OrganizationProfile>)> {
    let source: Box<dyn ProfileSource> = match (notices, organizations) {
        (Some(n), Some(o)) => Box::new(FileSource::new(n, o)),
        (None, None) => Box::new(HttpSource::from_config(&config.sources)?),
        _ => bail!("--notices and --organizations must be given together"),
    };
    let policy = RetryPolicy::from_config(&config.sources);
    let notices = retry_with_backoff(&policy, "fetch notices", || source.fetch_notices())
        .await
        .with_context(|| format!("failed loading notices from {} source", source.name()))?;
    let organizations =
        retry_with_backoff(&policy, "fetch organizations", || source.fetch_organizations())
            .await
            .with_context(|| {
                format!("failed loading organizations from {} source", source.name())
            })?;
    info!(
        notices = notices.len(),
        organizations = organizations.len(),
        "profiles loaded"
    );
    Ok((notices, organizations))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn read_one_or_many<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match read_json::<Value>(path)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect(),
        single => Ok(vec![serde_json::from_value(single)
            .with_context(|| format!("invalid item in {}", path.display()))?]),
    }
}

fn parse_status_list(raw: &str) -> Result<Vec<OpportunityStatus>> {
    let mut parsed = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        parsed.push(OpportunityStatus::from_str(part)?);
    }
    if parsed.is_empty() {
        bail!("status filter cannot be empty");
    }
    parsed.sort();
    parsed.dedup();
    Ok(parsed)
}

fn print_prices(item: &PricedItem, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_price_table(item)),
        OutputFormat::Json => println!("{}", render_json(item)?),
        OutputFormat::Csv => print!("{}", prices_to_csv(item)?),
    }
    Ok(())
}

fn print_score(
    notice: &NoticeProfile,
    organization: &OrganizationProfile,
    result: &MatchScore,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => println!(
            "{}",
            render_score_table(&notice.id, &organization.id, result)
        ),
        OutputFormat::Json => println!("{}", render_json(result)?),
        OutputFormat::Csv => {
            warn!("CSV output for score not implemented, using JSON");
            println!("{}", render_json(result)?);
        }
    }
    Ok(())
}

fn print_materialize(reports: &[MaterializationReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_materialize_table(reports)),
        OutputFormat::Json => println!("{}", render_json(reports)?),
        OutputFormat::Csv => print!("{}", materialize_to_csv(reports)?),
    }
    Ok(())
}

fn print_refresh(report: &RefreshReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_refresh_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => {
            warn!("CSV output for refresh not implemented, using JSON");
            println!("{}", render_json(report)?);
        }
    }
    Ok(())
}

fn print_opportunities(opportunities: &[Opportunity], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_opportunities_table(opportunities)),
        OutputFormat::Json => println!("{}", render_json(opportunities)?),
        OutputFormat::Csv => print!("{}", opportunities_to_csv(opportunities)?),
    }
    Ok(())
}
