//! Provider selection
//!
//! Holds one client per configured endpoint and hands out the current one.
//! A background check calls `net_listening` on the current endpoint and
//! moves to the next endpoint when the call fails or reports `false`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;

use crate::client::{ChainClient, JsonRpcClient};

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub struct ProviderService {
    clients: Vec<Arc<dyn ChainClient>>,
    current: AtomicUsize,
}

impl ProviderService {
    pub fn new(clients: Vec<Arc<dyn ChainClient>>) -> Result<Self> {
        if clients.is_empty() {
            bail!("At least one provider endpoint is required");
        }
        Ok(Self {
            clients,
            current: AtomicUsize::new(0),
        })
    }

    /// Build a [`JsonRpcClient`] per endpoint, in order.
    pub fn from_endpoints<S: AsRef<str>>(endpoints: &[S]) -> Result<Self> {
        let clients = endpoints
            .iter()
            .map(|endpoint| {
                let endpoint = endpoint.as_ref().trim();
                JsonRpcClient::new(endpoint)
                    .map(|client| Arc::new(client) as Arc<dyn ChainClient>)
                    .with_context(|| format!("Invalid provider endpoint {endpoint}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(clients)
    }

    /// Client for the endpoint currently in use.
    pub fn get(&self) -> Arc<dyn ChainClient> {
        Arc::clone(&self.clients[self.current_index()])
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire) % self.clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Move to the next endpoint, wrapping around. Returns the new index.
    pub fn switch(&self) -> usize {
        let len = self.clients.len();
        let next = (self.current_index() + 1) % len;
        self.current.store(next, Ordering::Release);

        tracing::warn!(
            target: "reconciler_chain::provider",
            endpoint = %self.clients[next].endpoint(),
            index = next,
            "Switched provider"
        );
        next
    }

    /// Probe the current endpoint once. Switches away and returns `false`
    /// when it is not listening.
    pub async fn check_health(&self) -> bool {
        let client = self.get();
        match client.is_listening().await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(
                    target: "reconciler_chain::provider",
                    endpoint = %client.endpoint(),
                    "Provider is not listening"
                );
                self.switch();
                false
            }
            Err(e) => {
                tracing::warn!(
                    target: "reconciler_chain::provider",
                    endpoint = %client.endpoint(),
                    error = %e,
                    "Provider health check failed"
                );
                self.switch();
                false
            }
        }
    }

    /// Run [`Self::check_health`] every `interval` until the returned task is
    /// aborted.
    pub fn spawn_health_check(self: &Arc<Self>, interval: Duration) -> ProviderHealthCheck {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.check_health().await;
            }
        });
        ProviderHealthCheck { handle }
    }
}

/// Background health check; stops when dropped.
pub struct ProviderHealthCheck {
    handle: JoinHandle<()>,
}

impl ProviderHealthCheck {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for ProviderHealthCheck {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use async_trait::async_trait;
    use primitive_types::U256;
    use std::sync::atomic::AtomicBool;

    struct Node {
        name: &'static str,
        listening: AtomicBool,
        reachable: bool,
    }

    impl Node {
        fn new(name: &'static str, listening: bool, reachable: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                listening: AtomicBool::new(listening),
                reachable,
            })
        }
    }

    #[async_trait]
    impl ChainClient for Node {
        fn endpoint(&self) -> &str {
            self.name
        }

        async fn balance(&self, _address: &str) -> Result<U256, RpcError> {
            Ok(U256::zero())
        }

        async fn call(&self, _to: &str, _data: &str) -> Result<String, RpcError> {
            Ok("0x".into())
        }

        async fn is_listening(&self) -> Result<bool, RpcError> {
            if !self.reachable {
                return Err(RpcError::Transport("connection refused".into()));
            }
            Ok(self.listening.load(Ordering::SeqCst))
        }
    }

    fn service(nodes: &[Arc<Node>]) -> ProviderService {
        ProviderService::new(
            nodes
                .iter()
                .map(|node| Arc::clone(node) as Arc<dyn ChainClient>)
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_an_endpoint() {
        assert!(ProviderService::new(Vec::new()).is_err());
        assert!(ProviderService::from_endpoints(&["not a url"]).is_err());
        let service =
            ProviderService::from_endpoints(&["http://a:8545", " http://b:8545 "]).unwrap();
        assert_eq!(service.len(), 2);
        assert_eq!(service.get().endpoint(), "http://a:8545/");
    }

    #[tokio::test]
    async fn test_healthy_provider_is_kept() {
        let service = service(&[Node::new("a", true, true), Node::new("b", true, true)]);
        assert!(service.check_health().await);
        assert_eq!(service.get().endpoint(), "a");
    }

    #[tokio::test]
    async fn test_rotates_on_failure_and_wraps() {
        let a = Node::new("a", false, true);
        let b = Node::new("b", true, false);
        let service = service(&[a.clone(), b]);

        assert!(!service.check_health().await);
        assert_eq!(service.get().endpoint(), "b");

        a.listening.store(true, Ordering::SeqCst);
        assert!(!service.check_health().await);
        assert_eq!(service.get().endpoint(), "a");
        assert!(service.check_health().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_check_switches() {
        let service = Arc::new(service(&[
            Node::new("a", false, true),
            Node::new("b", true, true),
        ]));
        let check = service.spawn_health_check(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(service.current_index(), 1);
        check.abort();
    }
}
