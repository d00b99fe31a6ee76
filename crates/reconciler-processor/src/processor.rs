//! Per-delivery account reconciliation

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::account::AccountStore;
use crate::balance::BalanceAggregator;
use crate::notification::{Delivery, Notification, RoutingKeys};
use crate::publisher::{BalancePublisher, BalanceUpdate};

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Updated(BalanceUpdate),
    /// No account is registered for the address.
    Skipped(String),
}

pub struct BalanceProcessor {
    routes: RoutingKeys,
    accounts: Arc<dyn AccountStore>,
    aggregator: BalanceAggregator,
    publisher: Arc<dyn BalancePublisher>,
}

impl BalanceProcessor {
    pub fn new(
        routes: RoutingKeys,
        accounts: Arc<dyn AccountStore>,
        aggregator: BalanceAggregator,
        publisher: Arc<dyn BalancePublisher>,
    ) -> Self {
        Self {
            routes,
            accounts,
            aggregator,
            publisher,
        }
    }

    pub fn routes(&self) -> &RoutingKeys {
        &self.routes
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Recompute, store and publish the balances of the delivery's account.
    pub async fn handle(&self, delivery: &Delivery) -> Result<Outcome> {
        let notification = Notification::parse(&self.routes, delivery)?;
        let address = notification.address;

        let Some(mut account) = self.accounts.get(&address).await? else {
            tracing::debug!(
                target: "reconciler_processor::processor",
                address = %address,
                "No account registered, skipping"
            );
            return Ok(Outcome::Skipped(address));
        };

        let balances = self
            .aggregator
            .updated_balance(&address, notification.transaction.as_ref())
            .await
            .with_context(|| format!("Balance aggregation failed for {address}"))?;

        account.apply(balances);
        self.accounts.save(&account).await?;

        let update = BalanceUpdate::new(&account, notification.transaction);
        self.publisher
            .publish(&self.routes.balance(&account.address), &update)
            .await?;

        tracing::info!(
            target: "reconciler_processor::processor",
            "balance updated for {}",
            account.address
        );
        Ok(Outcome::Updated(update))
    }

    /// [`Self::handle`], logging failures. The delivery is consumed either
    /// way; returns whether it succeeded.
    pub async fn process(&self, delivery: &Delivery) -> bool {
        match self.handle(delivery).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    target: "reconciler_processor::processor",
                    routing_key = %delivery.routing_key,
                    error = ?e,
                    "Failed to process delivery"
                );
                false
            }
        }
    }
}
