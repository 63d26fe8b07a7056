//! ChainQuery CLI — run ledger read queries and print the results as JSON.
//!
//! # Commands
//! ```text
//! chainquery info
//! chainquery block        --height <N> [--merkle transaction|statement] | --hash <hex>
//! chainquery blocks-from  --height <N> --count <N>
//! chainquery transactions [--address <hex>] [--signer <hex>] [--state <s>] [--page <N>]
//! chainquery transaction  --hash <hex>... [--state <s>]
//! chainquery accounts     --address <hex>... --public-key <hex>...
//! chainquery public-key   --address <hex>
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use chainquery_core::{
    AccountRef, DbConfig, LedgerDb, MerkleTree, PageOptions, SortDirection, TransactionFilter,
    TransactionState,
};
use chainquery_storage::PostgresConnector;

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "chainquery",
    about = "Read-only ledger queries over a document store",
    long_about = "
ChainQuery CLI: look up blocks, transactions and accounts written by a
ledger node's ingestion pipeline. Results are printed as JSON on stdout.

ENVIRONMENT VARIABLES:
  CHAINQUERY_DATABASE_URL   Store URL (default postgresql://localhost:5432)
  CHAINQUERY_DATABASE       Database name (default catapult)
  CHAINQUERY_NETWORK_ID     Network id byte used for address derivation
  RUST_LOG                  Overrides --log-level when set
",
    version
)]
struct Cli {
    #[arg(long, global = true, env = "CHAINQUERY_DATABASE_URL", default_value = "postgresql://localhost:5432")]
    url: String,

    #[arg(long, global = true, env = "CHAINQUERY_DATABASE", default_value = "catapult")]
    database: String,

    #[arg(long, global = true, env = "CHAINQUERY_NETWORK_ID")]
    network_id: Option<u8>,

    /// Connect timeout in milliseconds
    #[arg(long, global = true, default_value_t = 10_000)]
    timeout_ms: u64,

    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit JSON structured logs on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    Confirmed,
    Unconfirmed,
    Partial,
}

impl From<StateArg> for TransactionState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Confirmed => Self::Confirmed,
            StateArg::Unconfirmed => Self::Unconfirmed,
            StateArg::Partial => Self::Partial,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MerkleArg {
    Transaction,
    Statement,
}

#[derive(Subcommand)]
enum Commands {
    /// Chain height and collection sizes
    Info,

    /// Fetch one block by height or hash
    Block {
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        height: Option<u64>,
        #[arg(long)]
        hash: Option<String>,
        /// Include this merkle tree (height lookups only)
        #[arg(long, requires = "height")]
        merkle: Option<MerkleArg>,
    },

    /// Up to COUNT blocks starting at HEIGHT (0 = most recent), newest first
    #[command(name = "blocks-from")]
    BlocksFrom {
        #[arg(long, default_value_t = 0)]
        height: u64,
        #[arg(long, default_value_t = 10)]
        count: u64,
    },

    /// Paged transaction listing
    Transactions {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        signer: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        height: Option<u64>,
        #[arg(long, value_enum, default_value = "confirmed")]
        state: StateArg,
        /// Include dependent transactions as rows of their own
        #[arg(long)]
        embedded: bool,
        #[arg(long = "type")]
        types: Vec<u64>,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        page_size: Option<u64>,
        /// Newest first
        #[arg(long)]
        desc: bool,
    },

    /// Transactions by hash
    Transaction {
        #[arg(long = "hash", required = true, num_args = 1..)]
        hashes: Vec<String>,
        #[arg(long, value_enum, default_value = "confirmed")]
        state: StateArg,
    },

    /// Accounts by address and/or public key
    Accounts {
        #[arg(long = "address")]
        addresses: Vec<String>,
        #[arg(long = "public-key")]
        public_keys: Vec<String>,
    },

    /// Public key recorded for an address
    #[command(name = "public-key")]
    PublicKey {
        #[arg(long)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log = LogConfig {
        level: std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        json: cli.log_json,
        ..LogConfig::default()
    };
    init_tracing(&log);

    let config = DbConfig {
        url: cli.url.clone(),
        database_name: cli.database.clone(),
        network_id: cli.network_id,
        connect_timeout_ms: cli.timeout_ms,
        ..DbConfig::default()
    };
    let db = LedgerDb::new(config, Arc::new(PostgresConnector::default()))
        .context("invalid configuration")?;
    db.connect()
        .await
        .with_context(|| format!("connecting to {} ({})", cli.url, cli.database))?;

    let outcome = run(&db, cli.command).await;
    db.close().await?;
    outcome
}

async fn run(db: &LedgerDb, command: Commands) -> Result<()> {
    match command {
        Commands::Info => cmd_info(db).await,

        Commands::Block { height, hash, merkle } => {
            let block = match (height, hash, merkle) {
                (Some(height), _, Some(tree)) => {
                    let tree = match tree {
                        MerkleArg::Transaction => MerkleTree::Transaction,
                        MerkleArg::Statement => MerkleTree::Statement,
                    };
                    db.block_with_merkle_tree_at_height(height, tree).await?
                }
                (Some(height), _, None) => db.block_at_height(height).await?,
                (None, Some(hash), _) => db.block_by_hash(&hash).await?,
                (None, None, _) => anyhow::bail!("either --height or --hash is required"),
            };
            print_json(&block)
        }

        Commands::BlocksFrom { height, count } => print_json(&db.blocks_from(height, count).await?),

        Commands::Transactions {
            address,
            signer,
            recipient,
            height,
            state,
            embedded,
            types,
            page,
            page_size,
            desc,
        } => {
            let filter = TransactionFilter {
                address,
                signer_public_key: signer,
                recipient_address: recipient,
                state: state.into(),
                height,
                embedded,
                transaction_types: types,
            };
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            let options = PageOptions {
                sort_direction: direction,
                page_size,
                page_number: page,
                ..PageOptions::default()
            };
            print_json(&db.transactions(&filter, &options).await?)
        }

        Commands::Transaction { hashes, state } => {
            print_json(&db.transactions_by_hashes(state.into(), &hashes).await?)
        }

        Commands::Accounts {
            addresses,
            public_keys,
        } => {
            let refs: Vec<AccountRef> = addresses
                .into_iter()
                .map(AccountRef::Address)
                .chain(public_keys.into_iter().map(AccountRef::PublicKey))
                .collect();
            print_json(&db.accounts_by_ids(&refs).await?)
        }

        Commands::PublicKey { address } => print_json(&db.address_to_public_key(&address).await?),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Info {
    network_id: u8,
    database: String,
    chain_height: u64,
    #[serde(flatten)]
    storage: chainquery_core::StorageInfo,
}

async fn cmd_info(db: &LedgerDb) -> Result<()> {
    let (chain_height, storage) = tokio::try_join!(db.chain_height(), db.storage_info())?;
    print_json(&Info {
        network_id: db.network_id(),
        database: db.config().database_name.clone(),
        chain_height,
        storage,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
