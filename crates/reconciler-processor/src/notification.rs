//! Message-bus deliveries and their routing keys

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message taken off the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
        }
    }
}

/// Routing keys of one service instance, all prefixed by its service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeys {
    service: String,
}

impl RoutingKeys {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// `{service}_transaction`, followed by `.{address}` on each delivery.
    pub fn transaction_prefix(&self) -> String {
        format!("{}_transaction", self.service)
    }

    pub fn transaction(&self, address: &str) -> String {
        format!("{}.{address}", self.transaction_prefix())
    }

    pub fn user_created(&self) -> String {
        format!("{}_user.created", self.service)
    }

    pub fn balance(&self, address: &str) -> String {
        format!("{}_balance.{address}", self.service)
    }

    /// Address suffix of a transaction routing key, if any.
    pub fn transaction_address<'a>(&self, routing_key: &'a str) -> Option<&'a str> {
        routing_key
            .strip_prefix(&self.transaction_prefix())?
            .strip_prefix('.')
            .filter(|address| !address.is_empty())
    }
}

/// Log entry carried inside a transaction notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl TxLog {
    /// Event signature: the explicit field, else the first topic.
    pub fn signature(&self) -> Option<&str> {
        self.signature
            .as_deref()
            .or_else(|| self.topics.first().map(String::as_str))
    }
}

/// Transaction emitted by the block processor. Fields other than `hash` and
/// `logs` are kept as-is so the transaction can be forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionNotification {
    pub hash: String,
    #[serde(default)]
    pub logs: Vec<TxLog>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A parsed delivery: whose balance to recompute, and the transaction that
/// triggered it when there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub address: String,
    pub transaction: Option<TransactionNotification>,
}

impl Notification {
    pub fn parse(routes: &RoutingKeys, delivery: &Delivery) -> Result<Self> {
        let body: Value =
            serde_json::from_slice(&delivery.body).context("Delivery body is not JSON")?;

        let address = match routes.transaction_address(&delivery.routing_key) {
            Some(address) => address.to_string(),
            None => body
                .get("address")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    anyhow!(
                        "No address in routing key {} or body",
                        delivery.routing_key
                    )
                })?,
        };

        let transaction = if body.get("hash").is_some_and(is_set) {
            Some(serde_json::from_value(body).context("Invalid transaction notification")?)
        } else {
            None
        };

        Ok(Self {
            address: address.to_ascii_lowercase(),
            transaction,
        })
    }
}

/// `null`, `false`, `""` and `0` count as absent.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_i64() != Some(0),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routing_keys() {
        let routes = RoutingKeys::new("app_eth");
        assert_eq!(routes.transaction("0xab"), "app_eth_transaction.0xab");
        assert_eq!(routes.user_created(), "app_eth_user.created");
        assert_eq!(routes.balance("0xab"), "app_eth_balance.0xab");
        assert_eq!(
            routes.transaction_address("app_eth_transaction.0xab"),
            Some("0xab")
        );
        assert_eq!(routes.transaction_address("app_eth_transaction."), None);
        assert_eq!(routes.transaction_address("app_eth_user.created"), None);
        assert_eq!(routes.transaction_address("other_transaction.0xab"), None);
    }

    #[test]
    fn test_parse_transaction_delivery() {
        let routes = RoutingKeys::new("app_eth");
        let body = json!({
            "hash": "0x01",
            "blockNumber": 10,
            "logs": [{"address": "0xToken", "topics": ["0xddf2"], "data": "0x"}]
        });
        let delivery = Delivery::new("app_eth_transaction.0xABC", body.to_string());

        let notification = Notification::parse(&routes, &delivery).unwrap();
        assert_eq!(notification.address, "0xabc");
        let tx = notification.transaction.unwrap();
        assert_eq!(tx.hash, "0x01");
        assert_eq!(tx.logs[0].signature(), Some("0xddf2"));
        assert_eq!(tx.extra.get("blockNumber"), Some(&json!(10)));
        assert_eq!(serde_json::to_value(&tx).unwrap(), body);
    }

    #[test]
    fn test_parse_user_created_delivery() {
        let routes = RoutingKeys::new("app_eth");
        let delivery = Delivery::new("app_eth_user.created", r#"{"address":"0xAB"}"#);
        let notification = Notification::parse(&routes, &delivery).unwrap();
        assert_eq!(notification.address, "0xab");
        assert!(notification.transaction.is_none());
    }

    #[test]
    fn test_unset_hash_is_not_a_transaction() {
        let routes = RoutingKeys::new("app_eth");
        for body in [
            r#"{"address":"0xab","hash":null}"#,
            r#"{"address":"0xab","hash":""}"#,
        ] {
            let notification =
                Notification::parse(&routes, &Delivery::new("app_eth_user.created", body)).unwrap();
            assert_eq!(notification.address, "0xab");
            assert!(notification.transaction.is_none(), "{body}");
        }
    }

    #[test]
    fn test_parse_rejects_unaddressed_or_invalid() {
        let routes = RoutingKeys::new("app_eth");
        assert!(Notification::parse(&routes, &Delivery::new("app_eth_user.created", "{}")).is_err());
        assert!(Notification::parse(&routes, &Delivery::new("app_eth_user.created", "nope")).is_err());
    }
}
