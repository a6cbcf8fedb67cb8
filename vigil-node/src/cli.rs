use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vigil_app::ModuleRegistry;
use vigil_crypto::privval;
use vigil_storage::lock::DataDirLock;

use crate::config::{default_home, Configuration, HomeDir, Overrides};
use crate::error::NodeError;
use crate::identity::{self, ValidatorIdentity};
use crate::node::Node;
use crate::shutdown::ShutdownReason;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Vigil validator node for a proof-of-stake sidechain",
    version
)]
pub struct Cli {
    /// Node home directory
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "vigil_node=trace")
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write default config, keys and a single-validator genesis
    Init {
        /// Chain id for the generated genesis (derived from the node id if omitted)
        #[arg(long)]
        chain_id: Option<String>,
    },
    /// Run the node
    Start(StartArgs),
    /// Print the validator address and public key as JSON
    ShowIdentity,
    /// Print the validator private key as JSON
    ShowPrivateKey,
    /// Print the node ID
    ShowNodeId,
    /// Check the application state in the genesis file
    VerifyGenesis,
    /// Delete all chain data and reset the validator sign state (keys and config are kept)
    UnsafeResetAll,
}

#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Run the consensus engine in-process (false: serve the application over a socket)
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub with_engine: Option<bool>,
    /// Application socket listen address for an external engine
    #[arg(long)]
    pub address: Option<String>,
    /// Pruning strategy: syncable, nothing or everything
    #[arg(long)]
    pub pruning: Option<String>,
    /// Refuse to commit blocks at or above this height (0 disables)
    #[arg(long)]
    pub halt_height: Option<u64>,
    /// Refuse to commit blocks at or after this unix time (0 disables)
    #[arg(long)]
    pub halt_time: Option<u64>,
    /// Write a CPU profile to this file on shutdown
    #[arg(long, value_name = "FILE")]
    pub cpu_profile: Option<PathBuf>,
    /// Enable or disable the query server
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub query_server: Option<bool>,
    /// Query server listen address
    #[arg(long)]
    pub query_addr: Option<String>,
    /// Start the relay sidecar
    #[arg(long)]
    pub relay: bool,
    /// Relay every target chain
    #[arg(long, conflicts_with = "relay_only")]
    pub relay_all: bool,
    /// Relay only these target chains (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "TARGETS")]
    pub relay_only: Vec<String>,
    /// Append every store write to this file
    #[arg(long, value_name = "FILE")]
    pub trace_store: Option<PathBuf>,
    /// Storage backend: sqlite or memory
    #[arg(long)]
    pub storage: Option<String>,
}

impl From<StartArgs> for Overrides {
    fn from(a: StartArgs) -> Self {
        Overrides {
            with_engine: a.with_engine,
            address: a.address,
            pruning: a.pruning,
            halt_height: a.halt_height,
            halt_time: a.halt_time,
            cpu_profile: a.cpu_profile,
            query_server: a.query_server,
            query_addr: a.query_addr,
            relay: a.relay,
            relay_all: a.relay_all,
            relay_only: a.relay_only,
            trace_store: a.trace_store,
            storage: a.storage,
        }
    }
}

impl Cli {
    pub fn home_dir(&self) -> HomeDir {
        HomeDir::new(self.home.clone().unwrap_or_else(default_home))
    }

    /// `--log-level`, else the config file's level, else `info`.
    pub fn log_filter(&self) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        Configuration::load_or_default(&self.home_dir())
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    }
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    let home = cli.home_dir();
    match cli.command {
        Command::Init { chain_id } => init(&home, chain_id),
        Command::Start(args) => {
            crate::banner::print_banner();
            let mut config = Configuration::load_or_default(&home)?;
            config.apply_overrides(args.into());
            config.validate()?;
            tracing::info!(
                home = %home.root().display(),
                embedded = config.engine.embedded,
                "starting node"
            );
            match Node::new(config, home).run().await? {
                ShutdownReason::Halt(reason) => {
                    tracing::warn!("node stopped at halt: {}", reason);
                }
                other => tracing::info!(reason = %other, "node stopped"),
            }
            Ok(())
        }
        Command::ShowIdentity => {
            let key = identity::load_validator_key(&home)?;
            let json = identity::identity_json(&key.public_key())?;
            println!("{}", json);
            Ok(())
        }
        Command::ShowPrivateKey => {
            let key = identity::load_validator_key(&home)?;
            let json = identity::private_key_json(&key)?;
            println!("{}", json);
            Ok(())
        }
        Command::ShowNodeId => {
            let node_id = identity::load_node_id(&home)?;
            println!("{}", node_id);
            Ok(())
        }
        Command::VerifyGenesis => {
            let registry = ModuleRegistry::with_default_modules();
            let doc = crate::genesis::verify_genesis_file(&home, &registry)?;
            println!(
                "genesis {} is valid (chain_id {}, {} modules checked)",
                home.genesis_file().display(),
                doc.chain_id,
                registry.names().len()
            );
            Ok(())
        }
        Command::UnsafeResetAll => {
            let config = Configuration::load_or_default(&home)?;
            unsafe_reset_all(&home, &config)
        }
    }
}

/// Delete the application database and reset the sign state to height 0.
///
/// Holds the data directory lock throughout, so a running node makes this fail.
pub fn unsafe_reset_all(home: &HomeDir, config: &Configuration) -> Result<(), NodeError> {
    let data_dir = config.store_dir(home);
    let _lock = DataDirLock::acquire(&data_dir)?;

    let mut removed = 0usize;
    for entry in std::fs::read_dir(&data_dir)? {
        let entry = entry?;
        if entry.file_name() == DataDirLock::FILE_NAME {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed += 1;
    }
    tracing::warn!(path = %data_dir.display(), removed, "removed all chain data");

    privval::reset_sign_state(&home.priv_validator_state_file())?;
    Ok(())
}

/// Create everything a fresh home needs. Existing files are left untouched.
pub fn init(home: &HomeDir, chain_id: Option<String>) -> Result<(), NodeError> {
    if Configuration::init(home)? {
        tracing::info!(path = %home.config_file().display(), "wrote default config");
    }
    let identity = ValidatorIdentity::load_or_generate(home)?;
    let chain_id =
        chain_id.unwrap_or_else(|| crate::genesis::default_chain_id(&identity.node_id()));
    let registry = ModuleRegistry::with_default_modules();
    let doc = crate::genesis::load_or_create(home, &chain_id, &identity.public_key(), &registry)?;

    let summary = serde_json::json!({
        "home": home.root().display().to_string(),
        "chain_id": doc.chain_id,
        "node_id": identity.node_id().to_string(),
        "address": identity.address().to_string(),
    });
    let text = serde_json::to_string_pretty(&summary).map_err(|e| NodeError::ConfigError {
        reason: e.to_string(),
    })?;
    println!("{}", text);
    Ok(())
}
