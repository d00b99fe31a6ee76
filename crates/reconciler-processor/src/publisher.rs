//! Outbound balance updates

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::account::{Account, TokenBalance};
use crate::notification::TransactionNotification;

/// Message published after an account is reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub address: String,
    pub balance: String,
    pub erc20token: Vec<TokenBalance>,
    pub tx: Option<TransactionNotification>,
}

impl BalanceUpdate {
    pub fn new(account: &Account, tx: Option<TransactionNotification>) -> Self {
        Self {
            address: account.address.clone(),
            balance: account.balance.clone(),
            erc20token: account.erc20token.clone(),
            tx,
        }
    }
}

/// A [`BalanceUpdate`] with the routing key it was published under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Published {
    pub routing_key: String,
    pub update: BalanceUpdate,
}

#[async_trait]
pub trait BalancePublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, update: &BalanceUpdate) -> Result<()>;
}

/// In-process fan-out of published updates.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Published>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl BalancePublisher for EventBus {
    async fn publish(&self, routing_key: &str, update: &BalanceUpdate) -> Result<()> {
        let published = Published {
            routing_key: routing_key.to_string(),
            update: update.clone(),
        };
        // no subscribers is not an error
        if self.tx.send(published).is_err() {
            tracing::trace!(
                target: "reconciler_processor::publisher",
                routing_key,
                "No subscribers for balance update"
            );
        }
        Ok(())
    }
}
