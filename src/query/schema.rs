//! Static description of the modeled event.

use std::sync::LazyLock;

use alloy_primitives::hex;
use alloy_sol_types::{sol, SolEvent};
use serde::{Deserialize, Serialize};

sol! {
    /// ERC20 `Transfer`
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// topic0 of `Transfer(address,address,uint256)`, lowercase with `0x`.
pub fn transfer_signature() -> &'static str {
    static SIGNATURE: LazyLock<String> =
        LazyLock::new(|| hex::encode_prefixed(Transfer::SIGNATURE_HASH));
    &SIGNATURE
}

/// One declared event argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventArgument {
    pub name: String,
    /// Indexed arguments are stored as topic words, the others as data words.
    pub indexed: bool,
}

impl EventArgument {
    pub fn indexed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: true,
        }
    }

    pub fn data(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: false,
        }
    }
}

/// Event schema
///
/// Argument order is the declaration order used when the log was encoded on
/// chain; every slot computation depends on it, so the schema is immutable
/// once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    name: String,
    signature: String,
    arguments: Vec<EventArgument>,
}

impl EventSchema {
    pub fn new(
        name: impl Into<String>,
        signature: impl Into<String>,
        arguments: Vec<EventArgument>,
    ) -> Self {
        Self {
            name: name.into(),
            signature: signature.into().to_ascii_lowercase(),
            arguments,
        }
    }

    /// ERC20 `Transfer(address indexed from, address indexed to, uint256 value)`
    pub fn transfer() -> Self {
        Self::new(
            "Transfer",
            transfer_signature(),
            vec![
                EventArgument::indexed("from"),
                EventArgument::indexed("to"),
                EventArgument::data("value"),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn arguments(&self) -> &[EventArgument] {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&EventArgument> {
        self.arguments.iter().find(|arg| arg.name == name)
    }

    pub fn indexed_count(&self) -> usize {
        self.arguments.iter().filter(|arg| arg.indexed).count()
    }

    pub fn data_count(&self) -> usize {
        self.arguments.len() - self.indexed_count()
    }

    /// Whether `signature` (any case) identifies this event.
    pub fn is_signature(&self, signature: &str) -> bool {
        signature.eq_ignore_ascii_case(&self.signature)
    }
}
