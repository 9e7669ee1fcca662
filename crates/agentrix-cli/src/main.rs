//! Agentrix ledger operator CLI
//!
//! Talks to the PostgreSQL database named by `DATABASE_URL` (a `.env` file in
//! the working directory is honoured).
//!
//! ```bash
//! agentrix-ledger migrate
//! agentrix-ledger reset-usage daily        # run from the scheduler at midnight
//! agentrix-ledger accounts --owner-id user-42 --owner-type user
//! agentrix-ledger balance ACC-USE-1767225600000-x1y2z3
//! agentrix-ledger history acct_6f1c... --stream funds --limit 20
//! ```

use agentrix_agent::{AgentId, AgentStore};
use agentrix_db::{Database, DatabaseConfig};
use agentrix_ledger::{Account, AccountId, HistoryQuery, HistoryStream, Ledger, LedgerConfig, Owner, OwnerType};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod display;

/// Agentrix ledger - unified accounts and agent spending controls
#[derive(Parser)]
#[command(name = "agentrix-ledger")]
#[command(author = "Agentrix Contributors")]
#[command(version)]
#[command(about = "Operate the Agentrix unified ledger", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Print results as JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum UsagePeriod {
    Daily,
    Monthly,
}

#[derive(Clone, Copy, ValueEnum)]
enum StreamArg {
    Funds,
    Freezes,
}

impl From<StreamArg> for HistoryStream {
    fn from(stream: StreamArg) -> Self {
        match stream {
            StreamArg::Funds => HistoryStream::Funds,
            StreamArg::Freezes => HistoryStream::Freezes,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Check database connectivity
    Health,

    /// Zero the rolling spend counter of every active agent
    ResetUsage {
        #[arg(value_enum)]
        period: UsagePeriod,
    },

    /// Show one account with its balances and lifetime stats
    Balance {
        /// Account id or ACC- code
        account: String,
    },

    /// List an owner's accounts, default first
    Accounts {
        #[arg(long)]
        owner_id: String,

        /// user, agent, merchant or platform
        #[arg(long)]
        owner_type: String,
    },

    /// Show an account's history trail, newest first
    History {
        /// Account id or ACC- code
        account: String,

        #[arg(long, value_enum)]
        stream: Option<StreamArg>,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show an agent's status, credit and usage counters
    Agent {
        /// Agent id or AGT- code
        agent: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    let db_config = DatabaseConfig::from_env().context("loading database configuration")?;
    let db = Database::connect(&db_config).await?;
    let ledger = db.ledger(LedgerConfig::from_env());

    match cli.command {
        Commands::Migrate => {
            db.migrate().await?;
            display::success("database schema is up to date");
        }
        Commands::Health => {
            let status = db.health_check().await?;
            if status.healthy {
                display::success("PostgreSQL reachable");
            } else {
                anyhow::bail!("PostgreSQL is not reachable");
            }
        }
        Commands::ResetUsage { period } => {
            let agents = db.agent_store();
            let (label, touched) = match period {
                UsagePeriod::Daily => ("daily", agents.reset_daily_usage().await?),
                UsagePeriod::Monthly => ("monthly", agents.reset_monthly_usage().await?),
            };
            tracing::info!(period = label, agents = touched, "usage counters reset");
            display::success(&format!("reset {} usage on {} active agents", label, touched));
        }
        Commands::Balance { account } => {
            let account = resolve_account(&ledger, &account).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                display::account_detail(&account);
            }
        }
        Commands::Accounts {
            owner_id,
            owner_type,
        } => {
            let owner_type: OwnerType = owner_type.parse().map_err(anyhow::Error::msg)?;
            let owner = Owner::new(owner_id, owner_type);
            let accounts = ledger.list_accounts(&owner).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else {
                display::section(&format!("Accounts of {}", owner));
                if accounts.is_empty() {
                    display::warning("no accounts");
                }
                for account in &accounts {
                    display::account_summary(account);
                }
            }
        }
        Commands::History {
            account,
            stream,
            limit,
            offset,
        } => {
            let account = resolve_account(&ledger, &account).await?;
            let query = HistoryQuery {
                stream: stream.map(HistoryStream::from),
                limit,
                offset,
            };
            let entries = ledger.history(&account.id, &query).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                display::section(&format!("History of {}", account.account_code));
                for entry in &entries {
                    display::history_line(entry);
                }
            }
        }
        Commands::Agent { agent } => {
            let agents = db.agent_store();
            let found = match AgentId::parse(&agent) {
                Ok(id) => agents.find(&id).await?,
                Err(_) => agents.find_by_unique_id(&agent).await?,
            };
            let agent = found.with_context(|| format!("agent {} not found", agent))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&agent)?);
            } else {
                display::agent_detail(&agent);
            }
        }
    }

    Ok(())
}

/// Look an account up by id, falling back to its ACC- code
async fn resolve_account(ledger: &Ledger, reference: &str) -> anyhow::Result<Account> {
    let account = match AccountId::parse(reference) {
        Ok(id) => ledger.get_account(&id).await?,
        Err(_) => ledger.get_account_by_code(reference).await?,
    };
    Ok(account)
}

/// Initialize tracing/logging
fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        LogFormat::Pretty => {
            subscriber
                .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
