//! EVM chain access for balance reconciliation
//!
//! - [`ChainClient`]: the three reads reconciliation makes against a node
//! - [`JsonRpcClient`]: JSON-RPC 2.0 over HTTP
//! - [`Erc20`]: `balanceOf`, `symbol` and `decimals` on a token contract
//! - [`ProviderService`]: current endpoint with health-checked rotation

pub mod client;
pub mod erc20;
pub mod error;
pub mod provider;
pub mod retry;

pub use client::{ChainClient, JsonRpcClient};
pub use erc20::{Erc20, IERC20};
pub use error::{RpcError, RpcErrorCategory};
pub use primitive_types::U256;
pub use provider::{ProviderHealthCheck, ProviderService, DEFAULT_HEALTH_CHECK_INTERVAL};
pub use retry::RetryPolicy;
