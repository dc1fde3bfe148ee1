use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bankmatch::clock::{Clock, SystemClock};
use bankmatch::config::{default_config_path, ResolvedConfig};
use bankmatch::credentials::EnvCredentialStore;
use bankmatch::matching::AutoMatchEngine;
use bankmatch::models::{BankAccount, Id};
use bankmatch::notify::LoggingNotifier;
use bankmatch::providers::{ProviderRegistry, SUPPORTED_BANKS};
use bankmatch::receivables::StaticReceivables;
use bankmatch::reconcile::ReconciliationService;
use bankmatch::storage::{JsonFileStore, ReconciliationStore};
use bankmatch::sync::{SyncContext, SyncOrchestrator, SyncOutcome, SyncResult};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bankmatch")]
#[command(about = "Bank statement sync and resident due reconciliation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// List supported and configured banks
    Banks,

    /// Manage bank accounts
    Accounts {
        #[command(subcommand)]
        command: AccountCommand,
    },

    /// Fetch statements and run matching
    Sync {
        /// Account to sync; omit with --all
        account: Option<String>,
        #[arg(long, conflicts_with = "account")]
        all: bool,
        /// First statement date (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        /// Last statement date (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },

    /// Re-run matching over an account's open transactions
    Rematch { account: String },

    /// Current balance reported by the bank
    Balance { account: String },

    /// All transactions of an account
    Transactions { account: String },

    /// Transactions nobody has matched yet
    Unmatched {
        #[arg(long)]
        account: Option<String>,
    },

    /// Transactions waiting for operator review
    Pending {
        #[arg(long)]
        account: Option<String>,
    },

    /// Suggested dues for a pending transaction
    Suggestions { transaction: String },

    /// Match a transaction to a due by hand
    Confirm {
        transaction: String,
        due: String,
        #[arg(long)]
        operator: String,
    },

    /// Remove a match
    Unmatch {
        transaction: String,
        #[arg(long)]
        operator: String,
    },

    /// Mark a transaction as not a due payment
    Reject {
        transaction: String,
        #[arg(long)]
        operator: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Dashboard counters
    Stats {
        /// Day for the money totals (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum AccountCommand {
    /// List accounts
    List,
    /// Register a bank account for a property
    Add {
        #[arg(long)]
        property: String,
        #[arg(long)]
        bank: String,
        #[arg(long)]
        iban: String,
        #[arg(long, default_value = "TRY")]
        currency: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        account_number: Option<String>,
    },
    /// Include an account in syncs again
    Activate { account: String },
    /// Exclude an account from syncs
    Deactivate { account: String },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn outcome_json(account_id: &Id, outcome: SyncResult<SyncOutcome>) -> Value {
    match outcome {
        Ok(SyncOutcome::Completed(report)) => json!({
            "account_id": account_id,
            "success": true,
            "report": report,
        }),
        Ok(SyncOutcome::SkippedInactive { .. }) => json!({
            "account_id": account_id,
            "success": true,
            "skipped": "inactive",
        }),
        Ok(SyncOutcome::Failed { report, error }) => json!({
            "account_id": account_id,
            "success": false,
            "error": error.to_string(),
            "report": report,
        }),
        Err(error) => json!({
            "account_id": account_id,
            "success": false,
            "error": error.to_string(),
        }),
    }
}

struct App {
    config: ResolvedConfig,
    store: Arc<dyn ReconciliationStore>,
    receivables: Arc<StaticReceivables>,
}

impl App {
    async fn open(config: ResolvedConfig) -> Result<Self> {
        let store: Arc<dyn ReconciliationStore> = Arc::new(JsonFileStore::new(&config.data_dir));
        let receivables = Arc::new(
            StaticReceivables::load(&config.data_dir.join("dues.json"))
                .await
                .context("Failed to load outstanding dues")?,
        );
        Ok(Self {
            config,
            store,
            receivables,
        })
    }

    async fn orchestrator(&self) -> Result<SyncOrchestrator> {
        let providers =
            ProviderRegistry::from_config(&self.config.banks, &EnvCredentialStore::new()).await?;
        let engine = AutoMatchEngine::new(self.config.matching.clone())?;
        let context = SyncContext::new(
            self.store.clone(),
            Arc::new(providers),
            self.receivables.clone(),
            Arc::new(engine),
        )
        .with_notifier(Arc::new(LoggingNotifier))
        .with_config(self.config.sync.clone());
        Ok(SyncOrchestrator::new(context))
    }

    fn service(&self) -> ReconciliationService {
        ReconciliationService::new(self.store.clone(), self.receivables.clone())
            .with_notifier(Arc::new(LoggingNotifier))
    }

    async fn run(&self, command: Command, config_path: &Path) -> Result<()> {
        match command {
            Command::Config => print_json(&json!({
                "config_file": config_path.display().to_string(),
                "data_dir": self.config.data_dir.display().to_string(),
                "matching": self.config.matching,
                "sync": self.config.sync,
                "banks": self.config.banks,
            })),
            Command::Banks => {
                let configured: Vec<&str> =
                    self.config.banks.iter().map(|b| b.code.as_str()).collect();
                let banks: Vec<Value> = SUPPORTED_BANKS
                    .iter()
                    .map(|bank| {
                        json!({
                            "code": bank.code,
                            "name": bank.name,
                            "configured": configured.contains(&bank.code),
                        })
                    })
                    .collect();
                print_json(&banks)
            }
            Command::Accounts { command } => self.accounts(command).await,
            Command::Sync {
                account,
                all,
                from,
                to,
            } => {
                let range = from.zip(to);
                let orchestrator = self.orchestrator().await?;
                if all {
                    let results = orchestrator.sync_all(range).await?;
                    let out: Vec<Value> = results
                        .into_iter()
                        .map(|(id, outcome)| outcome_json(&id, outcome))
                        .collect();
                    return print_json(&out);
                }
                let account = account.context("Pass an account id or --all")?;
                let id = Id::from_string(account);
                let outcome = orchestrator.sync_account(&id, range).await;
                print_json(&outcome_json(&id, outcome))
            }
            Command::Rematch { account } => {
                let orchestrator = self.orchestrator().await?;
                let report = orchestrator
                    .rematch_account(&Id::from_string(account))
                    .await?;
                print_json(&report)
            }
            Command::Balance { account } => {
                let id = Id::from_string(account);
                let balance = self.orchestrator().await?.fetch_balance(&id).await?;
                print_json(&json!({ "account_id": id, "balance": balance }))
            }
            Command::Transactions { account } => print_json(
                &self
                    .service()
                    .list_transactions(&Id::from_string(account))
                    .await?,
            ),
            Command::Unmatched { account } => {
                let account = account.map(Id::from_string);
                print_json(&self.service().list_unmatched(account.as_ref()).await?)
            }
            Command::Pending { account } => {
                let account = account.map(Id::from_string);
                print_json(&self.service().list_pending(account.as_ref()).await?)
            }
            Command::Suggestions { transaction } => print_json(
                &self
                    .service()
                    .suggestions(&Id::from_string(transaction))
                    .await?,
            ),
            Command::Confirm {
                transaction,
                due,
                operator,
            } => print_json(
                &self
                    .service()
                    .confirm(&Id::from_string(transaction), &Id::from_string(due), &operator)
                    .await?,
            ),
            Command::Unmatch {
                transaction,
                operator,
            } => print_json(
                &self
                    .service()
                    .unmatch(&Id::from_string(transaction), &operator)
                    .await?,
            ),
            Command::Reject {
                transaction,
                operator,
                reason,
            } => print_json(
                &self
                    .service()
                    .reject(&Id::from_string(transaction), &operator, reason.as_deref())
                    .await?,
            ),
            Command::Stats { date } => {
                let day = date.unwrap_or_else(|| SystemClock.today());
                print_json(&self.service().stats(day).await?)
            }
        }
    }

    async fn accounts(&self, command: AccountCommand) -> Result<()> {
        match command {
            AccountCommand::List => print_json(&self.store.list_accounts().await?),
            AccountCommand::Add {
                property,
                bank,
                iban,
                currency,
                name,
                account_number,
            } => {
                let property_id = Id::from_string_checked(property)?;
                let mut account = BankAccount::new(property_id, bank, iban, currency);
                if let Some(name) = name {
                    account = account.with_name(name);
                }
                if let Some(number) = account_number {
                    account = account.with_account_number(number);
                }
                self.store.save_account(&account).await?;
                print_json(&account)
            }
            AccountCommand::Activate { account } => print_json(
                &self
                    .store
                    .set_account_active(&Id::from_string(account), true)
                    .await?,
            ),
            AccountCommand::Deactivate { account } => print_json(
                &self
                    .store
                    .set_account_active(&Id::from_string(account), false)
                    .await?,
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load bankmatch config: {}", cli.config.display()))?;

    let app = App::open(config).await?;
    app.run(cli.command, &cli.config).await
}
