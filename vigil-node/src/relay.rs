//! Cross-chain relay sidecar.
//!
//! One listener per target chain polls the chain's JSON-RPC endpoint for its
//! latest block number and logs every new header it sees.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;

use crate::sidecar::{ReadySignal, Sidecar, SidecarError, StopToken};

const NAME: &str = "relay";

/// Per-request timeout for chain RPC calls.
const RPC_TIMEOUT_SECS: u64 = 10;

/// A chain the relay listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayTarget {
    Rootchain,
    Sidechain,
}

impl RelayTarget {
    pub const ALL: [RelayTarget; 2] = [RelayTarget::Rootchain, RelayTarget::Sidechain];
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayTarget::Rootchain => f.write_str("rootchain"),
            RelayTarget::Sidechain => f.write_str("sidechain"),
        }
    }
}

impl FromStr for RelayTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rootchain" => Ok(RelayTarget::Rootchain),
            "sidechain" => Ok(RelayTarget::Sidechain),
            other => Err(format!(
                "unknown relay target '{}', expected rootchain or sidechain",
                other
            )),
        }
    }
}

struct ChainListener {
    target: RelayTarget,
    url: String,
    client: HttpClient,
    last_seen: Option<u64>,
}

impl ChainListener {
    fn new(target: RelayTarget, url: &str) -> Result<Self, SidecarError> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build(url)
            .map_err(|e| SidecarError::Failed {
                name: NAME.to_string(),
                reason: format!("invalid {} rpc url '{}': {}", target, url, e),
            })?;
        Ok(Self {
            target,
            url: url.to_string(),
            client,
            last_seen: None,
        })
    }

    async fn poll(&mut self) {
        let result: Result<String, _> = self.client.request("eth_blockNumber", rpc_params![]).await;
        let number = match result {
            Ok(hex) => match parse_quantity(&hex) {
                Some(n) => n,
                None => {
                    tracing::warn!(target_chain = %self.target, value = %hex, "unparseable block number");
                    return;
                }
            },
            Err(e) => {
                tracing::warn!(target_chain = %self.target, url = %self.url, "block number poll failed: {}", e);
                return;
            }
        };
        if self.last_seen.map_or(true, |last| number > last) {
            tracing::info!(target_chain = %self.target, height = number, "new header");
            self.last_seen = Some(number);
        }
    }
}

/// Parse an Ethereum JSON-RPC quantity (`0x`-prefixed hex).
fn parse_quantity(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x")?;
    u64::from_str_radix(digits, 16).ok()
}

/// Relay sidecar over the configured targets.
pub struct RelaySidecar {
    targets: Vec<(RelayTarget, String)>,
    poll_interval: Duration,
}

impl RelaySidecar {
    pub fn new(
        targets: &[RelayTarget],
        root_rpc_url: &str,
        side_rpc_url: &str,
        poll_interval: Duration,
    ) -> Self {
        let targets = targets
            .iter()
            .map(|t| {
                let url = match t {
                    RelayTarget::Rootchain => root_rpc_url,
                    RelayTarget::Sidechain => side_rpc_url,
                };
                (*t, url.to_string())
            })
            .collect();
        Self {
            targets,
            poll_interval,
        }
    }
}

#[async_trait]
impl Sidecar for RelaySidecar {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn start(
        self: Box<Self>,
        ready: ReadySignal,
        mut stop: StopToken,
    ) -> Result<(), SidecarError> {
        let mut listeners = self
            .targets
            .iter()
            .map(|(target, url)| ChainListener::new(*target, url))
            .collect::<Result<Vec<_>, _>>()?;
        let names: Vec<String> = listeners.iter().map(|l| l.target.to_string()).collect();
        tracing::info!(targets = ?names, interval_secs = self.poll_interval.as_secs(), "relay started");
        ready.signal();

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {
                    for listener in listeners.iter_mut() {
                        if stop.is_stopped() {
                            break;
                        }
                        listener.poll().await;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar;

    #[test]
    fn test_target_parse() {
        assert_eq!("rootchain".parse::<RelayTarget>().unwrap(), RelayTarget::Rootchain);
        assert_eq!("sidechain".parse::<RelayTarget>().unwrap(), RelayTarget::Sidechain);
        assert!("bridge".parse::<RelayTarget>().is_err());
        assert_eq!(RelayTarget::Sidechain.to_string(), "sidechain");
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10"), Some(16));
        assert_eq!(parse_quantity("0x0"), Some(0));
        assert_eq!(parse_quantity("16"), None);
        assert_eq!(parse_quantity("0xzz"), None);
    }

    #[test]
    fn test_urls_follow_targets() {
        let relay = RelaySidecar::new(
            &[RelayTarget::Sidechain],
            "http://root:1",
            "http://side:2",
            Duration::from_secs(1),
        );
        assert_eq!(relay.targets, vec![(RelayTarget::Sidechain, "http://side:2".to_string())]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_keeps_running() {
        // Port 9 on loopback is not listening; polls fail and are only logged.
        let relay = RelaySidecar::new(
            &RelayTarget::ALL,
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            Duration::from_millis(20),
        );
        let (handle, waiter) = sidecar::spawn(Box::new(relay));
        waiter.wait(Duration::from_secs(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await.unwrap();
    }
}
