use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::query::TopicArg;

/// Hex characters in one 32-byte data word.
const WORD_HEX_LEN: usize = 64;

/// Log as delivered by the chain, before it is laid out for storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
    pub address: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Persisted log row
///
/// `values` keeps the raw words: the topics (signature first) followed by the
/// data blob split into 32-byte words. `args` is the encoded form queried by
/// [`crate::query::LogQuery`]; the inline signature topic is not an argument,
/// so `args[i].index` is the argument slot of the word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLogRow {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
    pub removed: bool,
    pub signature: String,
    pub address: String,
    pub values: Vec<String>,
    /// First data word in `values`; absent unless the log has both topics
    /// and data.
    pub data_values_start: Option<usize>,
    pub args: Vec<TopicArg>,
}

impl TxLogRow {
    pub fn from_log(log: &RawLog) -> Result<Self> {
        let data = log.data.trim_start_matches("0x");
        let data_words: Vec<String> = data
            .as_bytes()
            .chunks(WORD_HEX_LEN)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();

        let data_values_start =
            (!log.topics.is_empty() && !data_words.is_empty()).then_some(log.topics.len());

        let mut values = log.topics.clone();
        values.extend(data_words);

        let signature = log
            .topics
            .first()
            .map(|topic| topic.to_ascii_lowercase())
            .unwrap_or_default();

        let skip = usize::from(!log.topics.is_empty());
        let args = values
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(position, word)| {
                TopicArg::encode(word, position - skip, "log word")
                    .with_context(|| format!("Invalid word at position {position}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            block_number: log.block_number,
            tx_index: log.tx_index,
            log_index: log.log_index,
            removed: log.removed,
            signature,
            address: log.address.to_ascii_lowercase(),
            values,
            data_values_start,
            args,
        })
    }

    /// Stable identity of the row: one log per (block, tx, log index).
    pub fn id(&self) -> String {
        format!("{}x{}x{}", self.block_number, self.tx_index, self.log_index)
    }
}
