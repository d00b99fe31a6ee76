//! Configuration for the balance processor

use std::time::Duration;

use clap::Parser;
use reconciler::query::Negation;

/// Balance processor
///
/// Recomputes native and ERC20 balances of registered accounts whenever a
/// transaction or user-created notification names them.
#[derive(Parser, Debug, Clone)]
#[command(name = "balance-processor")]
#[command(about = "Reconcile account balances from transfer notifications", long_about = None)]
pub struct Config {
    /// Prefix of every routing key this instance consumes and publishes
    #[arg(long, env = "RABBIT_SERVICE_NAME", default_value = "app_eth")]
    pub service_name: String,

    /// Node endpoints, tried in order (comma-separated)
    #[arg(
        long,
        env = "WEB3_PROVIDERS",
        value_delimiter = ',',
        default_value = "http://localhost:8545"
    )]
    pub providers: Vec<String>,

    /// Database of indexed transfer logs
    #[arg(long, env = "LOGS_DB", default_value = "./logs.db")]
    pub logs_db: String,

    /// Database of accounts and their balances
    #[arg(long, env = "ACCOUNTS_DB", default_value = "./accounts.db")]
    pub accounts_db: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API
    #[arg(long, env = "PORT", default_value = "8081")]
    pub port: u16,

    /// Deliveries processed concurrently
    #[arg(long, default_value = "2")]
    pub prefetch: usize,

    /// Deliveries queued before senders wait
    #[arg(long, default_value = "1024")]
    pub queue_size: usize,

    /// Interval between provider `net_listening` checks
    #[arg(long, default_value = "5000")]
    pub health_check_interval_ms: u64,

    /// Compile `$ne`/`$nin` as field-wise `$ne` inside the element match
    ///
    /// Matches the query shape older deployments produced. A row is then
    /// selected whenever any of its arguments differs from the value.
    #[arg(long)]
    pub legacy_negation: bool,
}

impl Config {
    pub fn negation(&self) -> Negation {
        if self.legacy_negation {
            Negation::FieldWise
        } else {
            Negation::Complement
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms.max(1))
    }
}
