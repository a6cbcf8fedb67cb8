//! End-to-end node lifecycle against a temporary home directory.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClientBuilder;
use jsonrpsee::rpc_params;
use tokio::sync::watch;

use vigil_app::ModuleRegistry;
use vigil_node::config::{Configuration, HomeDir};
use vigil_node::error::NodeError;
use vigil_node::node::{LifecycleState, Node};
use vigil_node::rpc::types::HealthInfo;
use vigil_node::shutdown::ShutdownReason;
use vigil_node::sidecar::{ReadySignal, Sidecar, SidecarError, StopToken};

fn test_config() -> Configuration {
    let mut config = Configuration::default();
    config.storage.backend = "memory".to_string();
    config.engine.block_interval_ms = 20;
    config.query_server.enabled = true;
    config.query_server.listen_addr = "tcp://127.0.0.1:0".to_string();
    config.query_server.ready_timeout_secs = 5;
    config
}

#[tokio::test]
async fn test_embedded_node_runs_and_stops() {
    let tmp = tempfile::tempdir().unwrap();
    let node = Node::new(test_config(), HomeDir::new(tmp.path()));
    let mut states = node.subscribe();
    let metrics = node.metrics();

    let running = node.start().await.unwrap();
    assert_eq!(running.state(), LifecycleState::Running);
    assert_eq!(metrics.sidecars_started.get(), 1);

    let addr = running.query_addr().expect("query server address");
    let client = HttpClientBuilder::default()
        .request_timeout(Duration::from_secs(5))
        .build(format!("http://{}", addr))
        .unwrap();
    let health: HealthInfo = client.request("vigil_health", rpc_params![]).await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.lifecycle, "running");

    // Blocks are being produced.
    let app = running.app();
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.lock().await.last_height() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    running.shutdown_trigger().request(ShutdownReason::Requested);
    assert_eq!(running.wait().await, ShutdownReason::Requested);
    assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);
    assert_eq!(metrics.lifecycle_state.get(), LifecycleState::Stopped.ordinal());

    // The query server is gone once the sequence has finished.
    let after: Result<HealthInfo, _> = client.request("vigil_health", rpc_params![]).await;
    assert!(after.is_err());

    let home = HomeDir::new(tmp.path());
    assert!(home.genesis_file().exists());
    assert!(home.priv_validator_key_file().exists());
}

/// Query sidecar that becomes ready late and records the state it observed.
struct SlowSidecar {
    lifecycle: watch::Receiver<LifecycleState>,
    seen: Arc<StdMutex<Vec<LifecycleState>>>,
}

#[async_trait]
impl Sidecar for SlowSidecar {
    fn name(&self) -> &'static str {
        "slow-query"
    }

    async fn start(
        self: Box<Self>,
        ready: ReadySignal,
        mut stop: StopToken,
    ) -> Result<(), SidecarError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.seen.lock().unwrap().push(*self.lifecycle.borrow());
        ready.signal();
        stop.stopped().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_running_is_published_after_query_server_is_ready() {
    let tmp = tempfile::tempdir().unwrap();
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let mut config = test_config();
    // The relay also starts before Running; nothing listens on its endpoints.
    config.relay.enabled = true;
    config.relay.root_rpc_url = "http://127.0.0.1:9".to_string();
    config.relay.side_rpc_url = "http://127.0.0.1:9".to_string();
    config.relay.poll_interval_secs = 1;
    let node = Node::new(config, HomeDir::new(tmp.path()));
    let metrics = node.metrics();
    let sidecar = SlowSidecar {
        lifecycle: node.subscribe(),
        seen: seen.clone(),
    };
    let node = node.with_query_sidecar(Box::new(sidecar));

    let running = node.start().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![LifecycleState::Initializing]);
    assert_eq!(running.state(), LifecycleState::Running);
    assert_eq!(metrics.sidecars_started.get(), 2);

    running.shutdown_trigger().request(ShutdownReason::Requested);
    assert_eq!(running.wait().await, ShutdownReason::Requested);
}

#[tokio::test]
async fn test_bare_engine_runs_until_requested() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.query_server.enabled = false;
    config.relay.enabled = false;
    config.app.halt_height = 0;

    let node = Node::new(config, HomeDir::new(tmp.path()));
    let mut states = node.subscribe();
    let metrics = node.metrics();
    let running = node.start().await.unwrap();
    assert_eq!(running.state(), LifecycleState::Running);
    assert!(running.query_addr().is_none());
    assert_eq!(metrics.sidecars_started.get(), 0);

    let app = running.app();
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.lock().await.last_height() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    running.shutdown_trigger().request(ShutdownReason::Requested);
    assert_eq!(running.wait().await, ShutdownReason::Requested);
    assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_halt_height_stops_the_node() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.app.halt_height = 3;
    config.query_server.enabled = false;

    let running = Node::new(config, HomeDir::new(tmp.path()))
        .start()
        .await
        .unwrap();
    let app = running.app();
    let reason = tokio::time::timeout(Duration::from_secs(10), running.wait())
        .await
        .unwrap();
    assert!(matches!(reason, ShutdownReason::Halt(_)));
    assert_eq!(app.lock().await.last_height(), 2);
}

#[tokio::test]
async fn test_invalid_genesis_reports_first_failing_module() {
    let tmp = tempfile::tempdir().unwrap();
    let home = HomeDir::new(tmp.path());
    vigil_node::cli::init(&home, Some("vigil-broken".to_string())).unwrap();

    let path = home.genesis_file();
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    doc["app_state"]["staking"]["validators"][0]["power"] = serde_json::json!(0);
    doc["app_state"]["checkpoint"] = serde_json::json!("not a section");
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let registry = ModuleRegistry::with_default_modules();
    match vigil_node::genesis::verify_genesis_file(&home, &registry) {
        Err(NodeError::GenesisVerificationError { module, reason }) => {
            assert_eq!(module, "staking");
            assert!(reason.contains("zero power"));
        }
        other => panic!("expected a staking failure, got {:?}", other.map(|d| d.chain_id)),
    }
}
