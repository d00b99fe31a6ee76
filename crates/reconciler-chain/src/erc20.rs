//! ERC20 reads over [`ChainClient::call`]
//!
//! Calldata and return values go through the [`IERC20`] bindings. Tokens
//! that predate the string `symbol()` return a `bytes32`, which is decoded
//! by hand.

use std::sync::Arc;

use alloy_primitives::{hex, Address};
use alloy_sol_types::{sol, SolCall};
use anyhow::{bail, Context, Result};
use primitive_types::U256;

use crate::client::ChainClient;

sol! {
    /// The subset of ERC20 reconciliation reads.
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// Reported when a token does not implement `decimals()`.
pub const DEFAULT_DECIMALS: &str = "18";

const WORD: usize = 32;

/// Reads one token contract.
pub struct Erc20 {
    client: Arc<dyn ChainClient>,
    token: String,
}

impl Erc20 {
    pub fn new(client: Arc<dyn ChainClient>, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    async fn call<C: SolCall>(&self, call: &C) -> Result<Vec<u8>> {
        let data = hex::encode_prefixed(call.abi_encode());
        let result = self
            .client
            .call(&self.token, &data)
            .await
            .with_context(|| format!("{} failed on {}", C::SIGNATURE, self.token))?;
        hex::decode(&result)
            .with_context(|| format!("{} result from {} is not hex", C::SIGNATURE, self.token))
    }

    pub async fn balance_of(&self, owner: &str) -> Result<U256> {
        let owner: Address = owner
            .parse()
            .with_context(|| format!("Invalid address {owner}"))?;
        let result = self.call(&IERC20::balanceOfCall { owner }).await?;
        let balance = IERC20::balanceOfCall::abi_decode_returns(&result)
            .with_context(|| format!("Invalid balanceOf result from {}", self.token))?;
        Ok(U256::from_big_endian(&balance.to_be_bytes::<32>()))
    }

    pub async fn symbol(&self) -> Result<String> {
        let result = self.call(&IERC20::symbolCall {}).await?;
        decode_symbol(&result).with_context(|| format!("Invalid symbol result from {}", self.token))
    }

    /// Decimal string; [`DEFAULT_DECIMALS`] when the call fails.
    pub async fn decimals(&self) -> String {
        let decimals = match self.call(&IERC20::decimalsCall {}).await {
            Ok(result) => IERC20::decimalsCall::abi_decode_returns(&result).map_err(Into::into),
            Err(e) => Err(e),
        };
        match decimals {
            Ok(decimals) => decimals.to_string(),
            Err(e) => {
                tracing::debug!(
                    target: "reconciler_chain::erc20",
                    token = %self.token,
                    error = %e,
                    "decimals() unavailable, using default"
                );
                DEFAULT_DECIMALS.to_string()
            }
        }
    }
}

/// ABI `string`, or a NUL-padded `bytes32` as some older tokens return.
pub fn decode_symbol(result: &[u8]) -> Result<String> {
    if result.len() == WORD {
        let end = result.iter().position(|&b| b == 0).unwrap_or(WORD);
        return String::from_utf8(result[..end].to_vec()).context("bytes32 symbol is not UTF-8");
    }
    if result.len() < WORD {
        bail!("Expected at least one word, got {} bytes", result.len());
    }
    IERC20::symbolCall::abi_decode_returns(result).context("Not an ABI string")
}
