//! Accounts and their stored balances

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reconciler_chain::U256;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Balance of one ERC20 token. Amounts are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub decimals: String,
    /// Token contract, lowercase
    pub address: String,
    pub balance: String,
}

impl TokenBalance {
    pub fn is_zero(&self) -> bool {
        U256::from_dec_str(&self.balance).is_ok_and(|balance| balance.is_zero())
    }
}

/// Result of one reconciliation: native balance plus the recomputed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub balance: String,
    pub tokens: Vec<TokenBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: String,
    #[serde(default)]
    pub erc20token: Vec<TokenBalance>,
    #[serde(default = "active")]
    pub is_active: bool,
    /// Unix seconds of the last reconciliation.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

fn active() -> bool {
    true
}

impl Account {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_ascii_lowercase(),
            balance: "0".into(),
            erc20token: Vec::new(),
            is_active: true,
            updated_at: None,
        }
    }

    /// Overwrite the native balance and merge recomputed tokens: an entry
    /// for the same token is replaced, and zero balances are removed.
    /// Tokens not in `balances` are left untouched.
    pub fn apply(&mut self, balances: Balances) {
        self.balance = balances.balance;
        for token in balances.tokens {
            self.erc20token
                .retain(|held| !held.address.eq_ignore_ascii_case(&token.address));
            if !token.is_zero() {
                self.erc20token.push(token);
            }
        }
        self.updated_at = Some(chrono::Utc::now().timestamp());
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, address: &str) -> Result<Option<Account>>;

    /// Insert or overwrite by address.
    async fn save(&self, account: &Account) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, address: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&address.to_ascii_lowercase()).cloned())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.address.to_ascii_lowercase(), account.clone());
        Ok(())
    }
}

/// Accounts in SQLite; token balances are stored as a JSON column.
pub struct SqliteAccountStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAccountStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open account database at {db_path}"))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Self::init(conn, db_path)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(conn: Connection, db_path: &str) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                address TEXT PRIMARY KEY,
                balance TEXT NOT NULL,
                erc20token TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at INTEGER
            )",
            [],
        )?;

        tracing::info!(target: "reconciler_processor::account", db_path = %db_path, "Account database initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Account database lock poisoned: {e}"))
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn get(&self, address: &str) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT address, balance, erc20token, is_active, updated_at
                 FROM accounts WHERE address = ?1",
                params![address.to_ascii_lowercase()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(address, balance, tokens, is_active, updated_at)| {
            Ok(Account {
                erc20token: serde_json::from_str(&tokens)
                    .with_context(|| format!("Invalid erc20token column for {address}"))?,
                address,
                balance,
                is_active,
                updated_at,
            })
        })
        .transpose()
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let tokens = serde_json::to_string(&account.erc20token)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO accounts (address, balance, erc20token, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(address) DO UPDATE SET
                balance = excluded.balance,
                erc20token = excluded.erc20token,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
            params![
                account.address.to_ascii_lowercase(),
                account.balance,
                tokens,
                account.is_active,
                account.updated_at,
            ],
        )?;
        Ok(())
    }
}
