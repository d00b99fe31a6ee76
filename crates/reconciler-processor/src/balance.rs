//! Balance aggregation
//!
//! Finds the tokens an account holds and reads every balance from the chain.
//! With a transaction at hand, only the tokens whose `Transfer` logs appear
//! in it are refreshed; otherwise every token the account ever sent or
//! received is looked up in the log store.

use std::sync::Arc;

use anyhow::{Context, Result};
use itertools::Itertools;
use reconciler::query::{transfer_signature, LogicalFilter, QueryCompiler, RowField};
use reconciler::LogStore;
use reconciler_chain::{Erc20, ProviderService};

use crate::account::{Balances, TokenBalance};
use crate::notification::TransactionNotification;

pub struct BalanceAggregator {
    providers: Arc<ProviderService>,
    logs: Arc<dyn LogStore>,
    compiler: QueryCompiler,
}

impl BalanceAggregator {
    pub fn new(
        providers: Arc<ProviderService>,
        logs: Arc<dyn LogStore>,
        compiler: QueryCompiler,
    ) -> Self {
        Self {
            providers,
            logs,
            compiler,
        }
    }

    pub async fn updated_balance(
        &self,
        address: &str,
        tx: Option<&TransactionNotification>,
    ) -> Result<Balances> {
        let client = self.providers.get();

        let tokens = match tx {
            Some(tx) => transferred_tokens(tx),
            None => self.touched_tokens(address).await?,
        };

        tracing::debug!(
            target: "reconciler_processor::balance",
            address,
            endpoint = %client.endpoint(),
            tokens = tokens.len(),
            from_transaction = tx.is_some(),
            "Aggregating balances"
        );

        // one token at a time, in discovery order
        let mut balances = Vec::with_capacity(tokens.len());
        for token in tokens {
            let contract = Erc20::new(Arc::clone(&client), token);
            let balance = contract.balance_of(address).await?;
            let symbol = contract.symbol().await?;
            let decimals = contract.decimals().await;
            balances.push(TokenBalance {
                symbol,
                decimals,
                address: contract.token().to_ascii_lowercase(),
                balance: balance.to_string(),
            });
        }

        let native = client
            .balance(address)
            .await
            .with_context(|| format!("eth_getBalance({address}) failed"))?;

        Ok(Balances {
            balance: native.to_string(),
            tokens: balances,
        })
    }

    /// Every token with a stored transfer from or to `address`.
    async fn touched_tokens(&self, address: &str) -> Result<Vec<String>> {
        let query = self
            .compiler
            .compile(&LogicalFilter::touching(&address_topic(address)))
            .with_context(|| format!("Cannot build token query for {address}"))?;
        self.logs
            .distinct(RowField::Address, &query)
            .await
            .context("Token lookup in log store failed")
    }
}

/// Emitters of the transaction's `Transfer` logs, first occurrence order.
pub fn transferred_tokens(tx: &TransactionNotification) -> Vec<String> {
    tx.logs
        .iter()
        .filter(|log| {
            log.signature()
                .is_some_and(|signature| signature.eq_ignore_ascii_case(transfer_signature()))
        })
        .map(|log| log.address.clone())
        .unique()
        .collect()
}

/// Address left-padded to a 32-byte topic.
pub fn address_topic(address: &str) -> String {
    let hex = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    format!("0x{:0>64}", hex.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::TxLog;
    use serde_json::Map;

    fn log(address: &str, signature: Option<&str>, topics: &[&str]) -> TxLog {
        TxLog {
            address: address.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            data: String::new(),
            signature: signature.map(str::to_string),
        }
    }

    #[test]
    fn test_address_topic() {
        assert_eq!(
            address_topic("0x00000000000000000000000000000000000000AB"),
            format!("0x{:0>64}", "ab")
        );
    }

    #[test]
    fn test_transferred_tokens() {
        let approval = "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925";
        let tx = TransactionNotification {
            hash: "0x01".into(),
            logs: vec![
                log("0xaa", Some(transfer_signature()), &[]),
                log("0xbb", None, &[transfer_signature()]),
                log("0xcc", Some(approval), &[transfer_signature()]),
                log("0xaa", None, &[transfer_signature()]),
                log("0xdd", None, &[]),
            ],
            extra: Map::new(),
        };
        assert_eq!(transferred_tokens(&tx), vec!["0xaa", "0xbb"]);
    }
}
