//! Wire messages for the control socket

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote method invocation, e.g. `{"method": "SetState", "args": ["listening"]}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,

    /// Positional arguments; omitted means none
    #[serde(default)]
    pub args: Vec<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// A call without arguments
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Vec::new())
    }
}

/// Outcome of a call, sent back on the same connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MethodReply {
    /// `value` is null for methods without a return value
    Return { value: Option<String> },

    /// Structured failure; `name` is stable, `message` is for humans
    Error { name: String, message: String },
}
