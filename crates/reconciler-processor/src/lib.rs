//! Balance reconciliation service core
//!
//! A delivery names an account (by routing key or body). The account's
//! token set is taken from the triggering transaction or from the log
//! store, every balance is re-read from the chain, and the merged account
//! is stored and published.

pub mod account;
pub mod balance;
pub mod consumer;
pub mod notification;
pub mod processor;
pub mod publisher;

pub use account::{Account, AccountStore, Balances, MemoryAccountStore, SqliteAccountStore, TokenBalance};
pub use balance::BalanceAggregator;
pub use consumer::{Consumer, ConsumerStats, DeliverySender, DEFAULT_PREFETCH};
pub use notification::{Delivery, Notification, RoutingKeys, TransactionNotification, TxLog};
pub use processor::{BalanceProcessor, Outcome};
pub use publisher::{BalancePublisher, BalanceUpdate, EventBus, Published};
