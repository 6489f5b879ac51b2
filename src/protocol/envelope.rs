// src/protocol/envelope.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ENV_PREFIX, VALUE_KEY};

/// Payload handed to the action callback.
pub type Payload = Map<String, Value>;

/// One request as read from the action's stdin.
///
/// Top-level keys other than `value` are action parameters (activation id,
/// deadline, namespace, ...); `value` carries the user payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The `value` object, or an empty payload when it is absent or not an
    /// object.
    pub fn payload(&self) -> Payload {
        match self.fields.get(VALUE_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Payload::new(),
        }
    }

    /// Consume the envelope and keep only its payload.
    pub fn into_payload(mut self) -> Payload {
        match self.fields.remove(VALUE_KEY) {
            Some(Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }

    /// Environment variables this envelope injects into the action process.
    ///
    /// Only string-valued parameters are exported; `value` never is.
    pub fn env_assignments(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|(key, _)| key.as_str() != VALUE_KEY)
            .filter_map(|(key, value)| {
                value
                    .as_str()
                    .map(|s| (env_var_name(key), s.to_string()))
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Envelope {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// `api_key` → `__OW_API_KEY`.
pub fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(v: Value) -> Envelope {
        match v {
            Value::Object(map) => Envelope::new(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn string_parameters_become_prefixed_uppercase_vars() {
        let env = envelope(json!({
            "name": "OpenWhisk",
            "__ignored": 123,
            "activation_id": "abc",
            "value": {"name": "X"}
        }));

        let mut vars = env.env_assignments();
        vars.sort();

        assert_eq!(
            vars,
            vec![
                ("__OW_ACTIVATION_ID".to_string(), "abc".to_string()),
                ("__OW_NAME".to_string(), "OpenWhisk".to_string()),
            ]
        );
    }

    #[test]
    fn string_value_key_is_never_exported() {
        let env = envelope(json!({"value": "plain"}));
        assert!(env.env_assignments().is_empty());
    }

    #[test]
    fn payload_is_value_object() {
        let env = envelope(json!({"value": {"name": "X"}}));
        assert_eq!(Value::Object(env.payload()), json!({"name": "X"}));
    }

    #[test]
    fn missing_or_scalar_value_yields_empty_payload() {
        assert!(envelope(json!({"name": "n"})).payload().is_empty());
        assert!(envelope(json!({"value": 42})).payload().is_empty());
        assert!(envelope(json!({"value": [1, 2]})).into_payload().is_empty());
    }
}
