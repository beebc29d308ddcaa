use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use storefront_core::{DomainError, ValueObject};

/// Shipping or billing address.
///
/// The structure belongs to the storefront UI; checkout only requires a
/// non-empty JSON object and stores it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(Map<String, Value>);

impl Address {
    pub fn parse(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Object(map) if !map.is_empty() => Ok(Self(map)),
            Value::Object(_) => Err(DomainError::validation("address cannot be empty")),
            _ => Err(DomainError::validation("address must be an object")),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl ValueObject for Address {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_non_empty_objects_only() {
        let addr = Address::parse(json!({"line1": "1 Main St", "city": "Lahore"})).unwrap();
        assert_eq!(addr.as_map()["city"], "Lahore");

        assert!(Address::parse(json!({})).is_err());
        assert!(Address::parse(json!("1 Main St")).is_err());
        assert!(Address::parse(Value::Null).is_err());
    }
}
