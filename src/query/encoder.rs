//! Numeric topic encoder
//!
//! Stored rows keep every argument word as a decimal magnitude: an exponent
//! `e` and base 10^14 coefficient limbs `c`, tagged with the argument slot.
//! Comparing that decomposition instead of raw strings makes `0x00ab` and
//! `0xAB` the same value.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::error::Unsatisfiable;

/// Decimal digits per coefficient limb.
const LIMB_DIGITS: usize = 14;

/// Encoded argument word as it is stored in a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicArg {
    pub e: u32,
    pub c: Vec<u64>,
    pub index: usize,
}

impl TopicArg {
    /// Encode a hex scalar found at `index`.
    ///
    /// `argument` only names the value in the error.
    pub fn encode(hex: &str, index: usize, argument: &str) -> Result<Self, Unsatisfiable> {
        let value = parse_hex_scalar(hex).ok_or_else(|| Unsatisfiable::MalformedValue {
            argument: argument.to_string(),
            value: hex.to_string(),
        })?;
        Ok(Self::from_u256(value, index))
    }

    pub fn from_u256(value: U256, index: usize) -> Self {
        let (e, c) = decompose(value);
        Self { e, c, index }
    }

    /// Back to the integer. Returns `None` for limbs that do not fit 256 bits.
    pub fn to_u256(&self) -> Option<U256> {
        let digits = self.e as usize + 1;
        let mut decimal = String::with_capacity(digits);
        for (i, limb) in self.c.iter().enumerate() {
            if i == 0 {
                decimal.push_str(&limb.to_string());
            } else {
                decimal.push_str(&format!("{limb:0width$}", width = LIMB_DIGITS));
            }
        }
        while decimal.len() < digits {
            decimal.push('0');
        }
        U256::from_dec_str(&decimal).ok()
    }
}

/// Parse `0x`-prefixed (or bare) hex of any case and padding.
pub fn parse_hex_scalar(hex: &str) -> Option<U256> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(significant, 16).ok()
}

fn decompose(value: U256) -> (u32, Vec<u64>) {
    if value.is_zero() {
        return (0, vec![0]);
    }

    let decimal = value.to_string();
    let e = decimal.len() - 1;
    let head = e % LIMB_DIGITS + 1;

    let mut limbs = Vec::with_capacity(decimal.len() / LIMB_DIGITS + 1);
    limbs.push(&decimal[..head]);
    let mut rest = &decimal[head..];
    while !rest.is_empty() {
        let (limb, tail) = rest.split_at(LIMB_DIGITS);
        limbs.push(limb);
        rest = tail;
    }

    let mut c: Vec<u64> = limbs
        .into_iter()
        .map(|limb| limb.parse().unwrap_or_default())
        .collect();
    while c.len() > 1 && c.last() == Some(&0) {
        c.pop();
    }

    (e as u32, c)
}
