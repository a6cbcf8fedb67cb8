use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vigil_abci::parse_listen_addr;
use vigil_app::{MinGasPrices, PruningStrategy};
use vigil_storage::Backend;

use crate::error::NodeError;
use crate::relay::RelayTarget;

/// Name of the configuration file inside `<home>/config`.
pub const CONFIG_FILE: &str = "vigil.toml";

/// Default node home: `~/.vigil`.
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".vigil"))
        .unwrap_or_else(|| PathBuf::from(".vigil"))
}

/// File layout under the node home directory.
#[derive(Debug, Clone)]
pub struct HomeDir {
    root: PathBuf,
}

impl HomeDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    pub fn genesis_file(&self) -> PathBuf {
        self.config_dir().join("genesis.json")
    }

    pub fn node_key_file(&self) -> PathBuf {
        self.config_dir().join("node_key.json")
    }

    pub fn priv_validator_key_file(&self) -> PathBuf {
        self.config_dir().join("priv_validator_key.json")
    }

    pub fn priv_validator_state_file(&self) -> PathBuf {
        self.data_dir().join("priv_validator_state.json")
    }

    /// Create `config/` and `data/` if missing.
    pub fn ensure(&self) -> Result<(), NodeError> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        Ok(())
    }

    /// Resolve a configured path: absolute paths are kept, relative ones hang off the home.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// The single resolved node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub engine: EngineConfig,
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub query_server: QueryServerConfig,
    pub relay: RelayConfig,
    pub profiling: ProfilingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run the consensus engine in-process. When false the application is
    /// served over a socket to an external engine.
    pub embedded: bool,
    /// Listen address of the application socket in standalone mode.
    pub address: String,
    /// Block interval of the built-in engine.
    pub block_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedded: true,
            address: "tcp://127.0.0.1:26658".to_string(),
            block_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pruning: String,
    /// 0 disables the halt.
    pub halt_height: u64,
    /// Unix seconds; 0 disables the halt.
    pub halt_time: u64,
    /// `<amount><denom>[;...]`, empty for none.
    pub min_gas_prices: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pruning: PruningStrategy::default().to_string(),
            halt_height: 0,
            halt_time: 0,
            min_gas_prices: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// "sqlite" or "memory".
    pub backend: String,
    /// Defaults to `<home>/data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Append every store write to this file as JSON lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_store: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default().to_string(),
            data_dir: None,
            trace_store: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryServerConfig {
    pub enabled: bool,
    pub listen_addr: String,
    /// How long startup waits for the server to report ready.
    pub ready_timeout_secs: u64,
}

impl Default for QueryServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "tcp://127.0.0.1:1317".to_string(),
            ready_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub targets: Vec<String>,
    /// Root chain JSON-RPC endpoint.
    pub root_rpc_url: String,
    /// Sidechain JSON-RPC endpoint.
    pub side_rpc_url: String,
    pub poll_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            targets: RelayTarget::ALL.iter().map(|t| t.to_string()).collect(),
            root_rpc_url: "http://localhost:9545".to_string(),
            side_rpc_url: "http://localhost:8545".to_string(),
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Write a CPU profile here on shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_profile: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values given on the `start` command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub with_engine: Option<bool>,
    pub address: Option<String>,
    pub pruning: Option<String>,
    pub halt_height: Option<u64>,
    pub halt_time: Option<u64>,
    pub cpu_profile: Option<PathBuf>,
    pub query_server: Option<bool>,
    pub query_addr: Option<String>,
    pub relay: bool,
    pub relay_all: bool,
    pub relay_only: Vec<String>,
    pub trace_store: Option<PathBuf>,
    pub storage: Option<String>,
}

impl Configuration {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        let config: Configuration =
            toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
                reason: format!("failed to parse config file '{}': {}", path.display(), e),
            })?;
        Ok(config)
    }

    /// Load `<home>/config/vigil.toml`, or defaults when it does not exist.
    pub fn load_or_default(home: &HomeDir) -> Result<Self, NodeError> {
        let path = home.config_file();
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `<home>/config/vigil.toml` unless a
    /// file is already there. Returns whether a file was written.
    pub fn init(home: &HomeDir) -> Result<bool, NodeError> {
        home.ensure()?;
        let path = home.config_file();
        if path.exists() {
            return Ok(false);
        }
        let toml_str =
            toml::to_string_pretty(&Configuration::default()).map_err(|e| {
                NodeError::ConfigError {
                    reason: format!("failed to serialize default config: {}", e),
                }
            })?;
        std::fs::write(&path, toml_str)?;
        Ok(true)
    }

    pub fn apply_overrides(&mut self, o: Overrides) {
        if let Some(embedded) = o.with_engine {
            self.engine.embedded = embedded;
        }
        if let Some(address) = o.address {
            self.engine.address = address;
        }
        if let Some(pruning) = o.pruning {
            self.app.pruning = pruning;
        }
        if let Some(h) = o.halt_height {
            self.app.halt_height = h;
        }
        if let Some(t) = o.halt_time {
            self.app.halt_time = t;
        }
        if o.cpu_profile.is_some() {
            self.profiling.cpu_profile = o.cpu_profile;
        }
        if let Some(enabled) = o.query_server {
            self.query_server.enabled = enabled;
        }
        if let Some(addr) = o.query_addr {
            self.query_server.listen_addr = addr;
        }
        if o.relay || o.relay_all || !o.relay_only.is_empty() {
            self.relay.enabled = true;
        }
        if o.relay_all {
            self.relay.targets = RelayTarget::ALL.iter().map(|t| t.to_string()).collect();
        } else if !o.relay_only.is_empty() {
            self.relay.targets = o.relay_only;
        }
        if o.trace_store.is_some() {
            self.storage.trace_store = o.trace_store;
        }
        if let Some(backend) = o.storage {
            self.storage.backend = backend;
        }
    }

    /// Check every value that is parsed later, so bad input fails before
    /// anything starts.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.pruning()?;
        self.backend()?;
        self.min_gas_prices()?;
        if !self.engine.embedded {
            parse_listen_addr(&self.engine.address).map_err(config_error)?;
        }
        if self.engine.block_interval_ms == 0
            || self.engine.block_interval_ms > MAX_BLOCK_INTERVAL_MS
        {
            return Err(config_error(format!(
                "engine.block_interval_ms must be between 1 and {}",
                MAX_BLOCK_INTERVAL_MS
            )));
        }
        if self.query_server.enabled {
            self.query_listen_addr()?;
            if self.query_server.ready_timeout_secs == 0
                || self.query_server.ready_timeout_secs > MAX_WAIT_SECS
            {
                return Err(config_error(format!(
                    "query_server.ready_timeout_secs must be between 1 and {}",
                    MAX_WAIT_SECS
                )));
            }
        }
        if self.relay.enabled {
            if self.relay_targets()?.is_empty() {
                return Err(config_error("relay is enabled but no relay targets are set"));
            }
            if self.relay.poll_interval_secs == 0 || self.relay.poll_interval_secs > MAX_WAIT_SECS {
                return Err(config_error(format!(
                    "relay.poll_interval_secs must be between 1 and {}",
                    MAX_WAIT_SECS
                )));
            }
        }
        Ok(())
    }

    pub fn pruning(&self) -> Result<PruningStrategy, NodeError> {
        PruningStrategy::from_str(&self.app.pruning).map_err(config_error)
    }

    pub fn backend(&self) -> Result<Backend, NodeError> {
        Backend::from_str(&self.storage.backend).map_err(config_error)
    }

    pub fn min_gas_prices(&self) -> Result<MinGasPrices, NodeError> {
        MinGasPrices::from_str(&self.app.min_gas_prices).map_err(config_error)
    }

    /// Where the application database lives: `storage.data_dir`, else `<home>/data`.
    pub fn store_dir(&self, home: &HomeDir) -> PathBuf {
        self.storage
            .data_dir
            .as_deref()
            .map(|p| home.resolve(p))
            .unwrap_or_else(|| home.data_dir())
    }

    /// The query server address as `host:port`.
    pub fn query_listen_addr(&self) -> Result<String, NodeError> {
        parse_listen_addr(&self.query_server.listen_addr).map_err(config_error)
    }

    /// Deduplicated relay targets in configured order.
    pub fn relay_targets(&self) -> Result<Vec<RelayTarget>, NodeError> {
        let mut targets = Vec::new();
        for name in &self.relay.targets {
            let target = RelayTarget::from_str(name.trim()).map_err(config_error)?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(targets)
    }
}

/// One hour. Larger values overflow timer deadlines.
const MAX_BLOCK_INTERVAL_MS: u64 = 3_600_000;
/// One day.
const MAX_WAIT_SECS: u64 = 86_400;

fn config_error(err: impl std::fmt::Display) -> NodeError {
    NodeError::ConfigError {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Configuration::default();
        assert!(config.engine.embedded);
        assert_eq!(config.app.pruning, "syncable");
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.query_server.ready_timeout_secs, 10);
        assert!(!config.relay.enabled);
        assert!(!config.query_server.enabled);
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Configuration::default();
        config.storage.trace_store = Some(PathBuf::from("trace.jsonl"));
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: Configuration = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Configuration = toml::from_str("[app]\nhalt_height = 42\n").unwrap();
        assert_eq!(config.app.halt_height, 42);
        assert_eq!(config.app.pruning, "syncable");
        assert!(!config.query_server.enabled);

        let config: Configuration =
            toml::from_str("[query_server]\nenabled = true\n").unwrap();
        assert!(config.query_server.enabled);
        assert_eq!(config.query_server.listen_addr, "tcp://127.0.0.1:1317");
        config.validate().unwrap();
    }

    #[test]
    fn test_init_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let home = HomeDir::new(tmp.path());
        assert!(Configuration::init(&home).unwrap());
        std::fs::write(home.config_file(), "[app]\nhalt_height = 7\n").unwrap();
        assert!(!Configuration::init(&home).unwrap());
        let config = Configuration::load_or_default(&home).unwrap();
        assert_eq!(config.app.halt_height, 7);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Configuration::load(Path::new("/nonexistent/path/vigil.toml"));
        assert!(matches!(result, Err(NodeError::ConfigError { .. })));
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Configuration::default();
        config.apply_overrides(Overrides {
            with_engine: Some(false),
            address: Some("tcp://0.0.0.0:26658".to_string()),
            pruning: Some("nothing".to_string()),
            halt_height: Some(100),
            relay_only: vec!["rootchain".to_string()],
            storage: Some("memory".to_string()),
            ..Default::default()
        });
        assert!(!config.engine.embedded);
        assert_eq!(config.app.pruning, "nothing");
        assert_eq!(config.app.halt_height, 100);
        assert!(config.relay.enabled);
        assert_eq!(config.relay_targets().unwrap(), vec![RelayTarget::Rootchain]);
        assert_eq!(config.backend().unwrap(), Backend::Memory);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Configuration::default();
        config.app.pruning = "sometimes".to_string();
        assert!(matches!(config.validate(), Err(NodeError::ConfigError { .. })));

        let mut config = Configuration::default();
        config.engine.embedded = false;
        config.engine.address = "unix:///tmp/app.sock".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unix"));

        let mut config = Configuration::default();
        config.relay.enabled = true;
        config.relay.targets = vec!["moon".to_string()];
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.app.min_gas_prices = "cheap".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_intervals() {
        let mut config = Configuration::default();
        config.engine.block_interval_ms = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("block_interval_ms"));

        config.engine.block_interval_ms = MAX_BLOCK_INTERVAL_MS;
        config.validate().unwrap();
        config.engine.block_interval_ms = MAX_BLOCK_INTERVAL_MS + 1;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.relay.enabled = true;
        config.relay.poll_interval_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.query_server.enabled = true;
        config.query_server.ready_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_home_layout() {
        let home = HomeDir::new("/srv/vigil");
        assert_eq!(home.genesis_file(), PathBuf::from("/srv/vigil/config/genesis.json"));
        assert_eq!(
            home.priv_validator_state_file(),
            PathBuf::from("/srv/vigil/data/priv_validator_state.json")
        );
        assert_eq!(home.resolve(Path::new("trace.log")), PathBuf::from("/srv/vigil/trace.log"));
        assert_eq!(home.resolve(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
