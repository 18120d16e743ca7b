//! Callback descriptors stored with each order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Current encoding version of [`CallbackDescriptor`].
pub const CALLBACK_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CallbackDecodeError {
    #[error("malformed callback: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported callback version {0}")]
    UnsupportedVersion(u32),
}

/// What to run when an order reaches a terminal status.
///
/// The method name is resolved against the bot's algorithm. Parameters are
/// passed through unchanged, with the order added at invocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackDescriptor {
    #[serde(default = "current_version")]
    pub version: u32,
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn current_version() -> u32 {
    CALLBACK_VERSION
}

impl CallbackDescriptor {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            version: CALLBACK_VERSION,
            method: method.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(raw: &str) -> Result<Self, CallbackDecodeError> {
        let descriptor: Self = serde_json::from_str(raw)?;
        if descriptor.version > CALLBACK_VERSION {
            return Err(CallbackDecodeError::UnsupportedVersion(descriptor.version));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_wire_form() {
        let descriptor = CallbackDescriptor::new("on_take_profit").with_param("level", 3);
        let value: Value = serde_json::from_str(&descriptor.to_json()).unwrap();
        assert_eq!(
            value,
            json!({"version": 1, "method": "on_take_profit", "params": {"level": 3}})
        );
    }

    #[test]
    fn test_missing_version_and_params_default() {
        let descriptor = CallbackDescriptor::from_json(r#"{"method":"step_test"}"#).unwrap();
        assert_eq!(descriptor.version, CALLBACK_VERSION);
        assert!(descriptor.params.is_empty());
    }

    #[test]
    fn test_future_version_is_rejected() {
        let err = CallbackDescriptor::from_json(r#"{"version":9,"method":"x"}"#).unwrap_err();
        assert!(matches!(err, CallbackDecodeError::UnsupportedVersion(9)));
    }
}
