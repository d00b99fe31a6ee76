//! End-to-end reconciliation against an in-process chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_sol_types::SolCall;
use async_trait::async_trait;
use reconciler::query::{transfer_signature, QueryCompiler};
use reconciler::{LogStore, MemoryLogStore, RawLog, TxLogRow};
use reconciler_chain::{ChainClient, ProviderService, RpcError, IERC20, U256};
use reconciler_processor::{
    Account, AccountStore, BalanceAggregator, BalanceProcessor, Consumer, Delivery, EventBus,
    MemoryAccountStore, Outcome, RoutingKeys, TokenBalance,
};
use serde_json::json;

const OWNER: &str = "0x00000000000000000000000000000000000000a1";
const PEER: &str = "0x00000000000000000000000000000000000000b2";
const TOKEN_X: &str = "0x00000000000000000000000000000000000000c3";
const TOKEN_Y: &str = "0x00000000000000000000000000000000000000d4";

fn selector<C: SolCall>() -> String {
    format!("0x{}", hex::encode(C::SELECTOR))
}

fn word(value: u64) -> String {
    format!("{value:064x}")
}

fn abi_string(s: &str) -> String {
    let bytes = hex::encode(s);
    format!(
        "0x{}{}{:0<64}",
        word(32),
        word(s.len() as u64),
        bytes
    )
}

#[derive(Default)]
struct MockChain {
    native: HashMap<String, U256>,
    /// (token, owner) -> balance
    tokens: HashMap<(String, String), U256>,
    symbols: HashMap<String, String>,
    decimals: HashMap<String, u8>,
    calls: AtomicUsize,
}

impl MockChain {
    fn token(mut self, token: &str, symbol: &str, decimals: Option<u8>) -> Self {
        self.symbols.insert(token.into(), symbol.into());
        if let Some(decimals) = decimals {
            self.decimals.insert(token.into(), decimals);
        }
        self
    }

    fn holding(mut self, token: &str, owner: &str, balance: u64) -> Self {
        self.tokens.insert((token.into(), owner.into()), U256::from(balance));
        self
    }

    fn native(mut self, owner: &str, balance: u64) -> Self {
        self.native.insert(owner.into(), U256::from(balance));
        self
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn endpoint(&self) -> &str {
        "mock"
    }

    async fn balance(&self, address: &str) -> Result<U256, RpcError> {
        Ok(self.native.get(address).copied().unwrap_or_default())
    }

    async fn call(&self, to: &str, data: &str) -> Result<String, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reverted = || RpcError::Rpc {
            code: -32000,
            message: "execution reverted".into(),
        };
        if let Some(owner) = data.strip_prefix(&selector::<IERC20::balanceOfCall>()) {
            let owner = format!("0x{}", &owner[24..]);
            let balance = self
                .tokens
                .get(&(to.to_string(), owner))
                .copied()
                .unwrap_or_default();
            return Ok(format!("0x{}", word(balance.low_u64())));
        }
        match data {
            d if d == selector::<IERC20::symbolCall>() => {
                self.symbols.get(to).map(|s| abi_string(s)).ok_or_else(reverted)
            }
            d if d == selector::<IERC20::decimalsCall>() => self
                .decimals
                .get(to)
                .map(|d| format!("0x{}", word(u64::from(*d))))
                .ok_or_else(reverted),
            _ => Err(reverted()),
        }
    }

    async fn is_listening(&self) -> Result<bool, RpcError> {
        Ok(true)
    }
}

fn topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

fn stored_transfer(block: u64, token: &str, from: &str, to: &str) -> TxLogRow {
    TxLogRow::from_log(&RawLog {
        block_number: block,
        address: token.into(),
        topics: vec![transfer_signature().into(), topic(from), topic(to)],
        data: topic("1"),
        ..Default::default()
    })
    .unwrap()
}

struct Harness {
    processor: Arc<BalanceProcessor>,
    accounts: Arc<MemoryAccountStore>,
    bus: EventBus,
    routes: RoutingKeys,
}

async fn harness(chain: MockChain, rows: Vec<TxLogRow>) -> Harness {
    let providers = Arc::new(ProviderService::new(vec![Arc::new(chain) as Arc<dyn ChainClient>]).unwrap());
    let logs = Arc::new(MemoryLogStore::new());
    logs.insert(&rows).await.unwrap();
    let accounts = Arc::new(MemoryAccountStore::new());
    let bus = EventBus::new(16);
    let routes = RoutingKeys::new("app_eth");

    let aggregator = BalanceAggregator::new(providers, logs, QueryCompiler::transfer());
    let processor = Arc::new(BalanceProcessor::new(
        routes.clone(),
        accounts.clone(),
        aggregator,
        Arc::new(bus.clone()),
    ));
    Harness {
        processor,
        accounts,
        bus,
        routes,
    }
}

fn chain() -> MockChain {
    MockChain::default()
        .token(TOKEN_X, "XXX", Some(6))
        .token(TOKEN_Y, "YYY", None)
        .holding(TOKEN_X, OWNER, 500)
        .holding(TOKEN_Y, OWNER, 7)
        .native(OWNER, 1_000_000)
}

#[tokio::test]
async fn user_created_reconciles_every_touched_token() {
    let h = harness(
        chain(),
        vec![
            stored_transfer(1, TOKEN_X, PEER, OWNER),
            stored_transfer(2, TOKEN_Y, OWNER, PEER),
            stored_transfer(3, TOKEN_X, OWNER, PEER),
        ],
    )
    .await;
    h.accounts.save(&Account::new(OWNER)).await.unwrap();
    let mut rx = h.bus.subscribe();

    let delivery = Delivery::new(h.routes.user_created(), json!({ "address": OWNER }).to_string());
    let outcome = h.processor.handle(&delivery).await.unwrap();

    let expected = vec![
        TokenBalance {
            symbol: "XXX".into(),
            decimals: "6".into(),
            address: TOKEN_X.into(),
            balance: "500".into(),
        },
        TokenBalance {
            symbol: "YYY".into(),
            decimals: "18".into(),
            address: TOKEN_Y.into(),
            balance: "7".into(),
        },
    ];

    let Outcome::Updated(update) = outcome else {
        panic!("expected an update, got {outcome:?}");
    };
    assert_eq!(update.balance, "1000000");
    assert_eq!(update.erc20token, expected);
    assert!(update.tx.is_none());

    let stored = h.accounts.get(OWNER).await.unwrap().unwrap();
    assert_eq!(stored.erc20token, expected);

    let published = rx.recv().await.unwrap();
    assert_eq!(published.routing_key, format!("app_eth_balance.{OWNER}"));
    assert_eq!(published.update, update);
}

#[tokio::test]
async fn transaction_refreshes_only_its_tokens() {
    let h = harness(chain(), vec![stored_transfer(1, TOKEN_Y, PEER, OWNER)]).await;
    let mut account = Account::new(OWNER);
    account.erc20token = vec![TokenBalance {
        symbol: "YYY".into(),
        decimals: "18".into(),
        address: TOKEN_Y.into(),
        balance: "3".into(),
    }];
    h.accounts.save(&account).await.unwrap();

    let tx = json!({
        "hash": "0xfeed",
        "logs": [
            {"address": TOKEN_X, "topics": [transfer_signature(), topic(PEER), topic(OWNER)], "data": topic("1f4")}
        ]
    });
    let delivery = Delivery::new(h.routes.transaction(OWNER), tx.to_string());
    let Outcome::Updated(update) = h.processor.handle(&delivery).await.unwrap() else {
        panic!("expected an update");
    };

    let held: Vec<_> = update
        .erc20token
        .iter()
        .map(|t| (t.address.as_str(), t.balance.as_str()))
        .collect();
    // stale Y entry kept, X appended
    assert_eq!(held, vec![(TOKEN_Y, "3"), (TOKEN_X, "500")]);
    assert_eq!(update.tx.unwrap().hash, "0xfeed");
}

#[tokio::test]
async fn zero_balances_are_removed() {
    let chain = MockChain::default()
        .token(TOKEN_X, "XXX", Some(18))
        .native(OWNER, 1);
    let h = harness(chain, vec![stored_transfer(1, TOKEN_X, OWNER, PEER)]).await;
    let mut account = Account::new(OWNER);
    account.erc20token = vec![TokenBalance {
        symbol: "XXX".into(),
        decimals: "18".into(),
        address: TOKEN_X.into(),
        balance: "10".into(),
    }];
    h.accounts.save(&account).await.unwrap();

    let delivery = Delivery::new(h.routes.user_created(), json!({ "address": OWNER }).to_string());
    h.processor.handle(&delivery).await.unwrap();

    let stored = h.accounts.get(OWNER).await.unwrap().unwrap();
    assert!(stored.erc20token.is_empty());
    assert_eq!(stored.balance, "1");
}

#[tokio::test]
async fn unknown_accounts_are_skipped() {
    let h = harness(chain(), Vec::new()).await;
    let delivery = Delivery::new(h.routes.transaction(PEER), json!({ "hash": "0x01" }).to_string());
    assert_eq!(
        h.processor.handle(&delivery).await.unwrap(),
        Outcome::Skipped(PEER.into())
    );
    assert!(h.accounts.get(PEER).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_symbol_fails_the_delivery() {
    let chain = MockChain::default().holding(TOKEN_X, OWNER, 5);
    let h = harness(chain, vec![stored_transfer(1, TOKEN_X, PEER, OWNER)]).await;
    h.accounts.save(&Account::new(OWNER)).await.unwrap();

    let delivery = Delivery::new(h.routes.user_created(), json!({ "address": OWNER }).to_string());
    assert!(h.processor.handle(&delivery).await.is_err());
    assert!(!h.processor.process(&delivery).await);

    // account left as it was
    assert_eq!(
        h.accounts.get(OWNER).await.unwrap().unwrap(),
        Account::new(OWNER)
    );
}

#[tokio::test]
async fn consumer_processes_and_counts_every_delivery() {
    let h = harness(chain(), vec![stored_transfer(1, TOKEN_X, PEER, OWNER)]).await;
    h.accounts.save(&Account::new(OWNER)).await.unwrap();
    let mut rx = h.bus.subscribe();

    let (sender, consumer) = Consumer::spawn(Arc::clone(&h.processor), 16, 2);
    sender
        .send(Delivery::new(h.routes.user_created(), json!({ "address": OWNER }).to_string()))
        .await
        .unwrap();
    sender
        .send(Delivery::new(h.routes.user_created(), "not json"))
        .await
        .unwrap();
    sender
        .send(Delivery::new(h.routes.transaction(PEER), json!({ "hash": "0x02" }).to_string()))
        .await
        .unwrap();

    let published = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.update.address, OWNER);

    drop(sender);
    let stats = tokio::time::timeout(Duration::from_secs(5), consumer.join())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
}
