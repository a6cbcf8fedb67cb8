use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Node-wide Prometheus metrics.
pub struct NodeMetrics {
    pub app_height: Gauge,
    pub blocks_committed: Counter,
    pub sidecars_started: Counter,
    /// Ordinal of the current [`LifecycleState`](crate::node::LifecycleState).
    pub lifecycle_state: Gauge,
    pub registry: Registry,
}

impl NodeMetrics {
    /// Create a new metrics registry with all node metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let app_height = Gauge::default();
        let blocks_committed = Counter::default();
        let sidecars_started = Counter::default();
        let lifecycle_state = Gauge::default();

        registry.register(
            "vigil_app_height",
            "Last height committed by the application",
            app_height.clone(),
        );
        registry.register(
            "vigil_blocks_committed",
            "Blocks committed since the process started",
            blocks_committed.clone(),
        );
        registry.register(
            "vigil_sidecars_started",
            "Sidecar services started",
            sidecars_started.clone(),
        );
        registry.register(
            "vigil_lifecycle_state",
            "Node lifecycle state (0 unstarted, 1 initializing, 2 running, 3 shutting down, 4 stopped)",
            lifecycle_state.clone(),
        );

        Self {
            app_height,
            blocks_committed,
            sidecars_started,
            lifecycle_state,
            registry,
        }
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buf, &self.registry) {
            tracing::warn!("failed to encode metrics: {}", e);
        }
        buf
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("app_height", &self.app_height.get())
            .field("blocks_committed", &self.blocks_committed.get())
            .finish_non_exhaustive()
    }
}
