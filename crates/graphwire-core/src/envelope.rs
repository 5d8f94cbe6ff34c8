//! JSON-RPC envelopes.
//!
//! All messages are JSON over UTF-8 text frames:
//!
//! - Request: `{"id":"<hex>","async":<bool?>,"method":"<name>","params":[...]}`
//! - Response: `{"id":"<hex>","error":{"code":<int>,"message":"<str?>"}?,"result":<any>?}`
//! - Notify: `{"id":"<hex>","method":"<name>","params":[...]}`
//!
//! Optional fields at their defaults are omitted from the wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A server-reported error record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// An outbound request envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: String,
    /// Fire-and-forget marker; the server may not reply.
    #[serde(default, rename = "async", skip_serializing_if = "is_false")]
    pub fire_and_forget: bool,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl Request {
    /// Request with no parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// Request with positional parameters.
    pub fn with_params(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            ..Self::default()
        }
    }

    /// Mark the request fire-and-forget (`"async":true` on the wire).
    pub fn fire_and_forget(mut self) -> Self {
        self.fire_and_forget = true;
        self
    }
}

/// An inbound response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
}

/// A server-initiated notification envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    #[serde(default)]
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}
