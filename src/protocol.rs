//! JSON-RPC 2.0 envelopes as spoken on the control-plane channel.
//!
//! One envelope per line. An envelope with an `id` is a request and is
//! always answered; one without is a notification and never is.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Error(error),
        }
    }
}

/// Shape of an inbound line before classification.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Incoming {
    pub fn method(&self) -> &str {
        match self {
            Incoming::Request { method, .. } | Incoming::Notification { method, .. } => method,
        }
    }
}

/// A line that could not be accepted. `reply_to` is `None` when nobody is
/// waiting for an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub reply_to: Option<Value>,
    pub error: RpcError,
}

impl Rejected {
    pub fn into_response(self) -> Option<RpcResponse> {
        self.reply_to.map(|id| RpcResponse::failure(id, self.error))
    }
}

pub fn parse_line(line: &str) -> Result<Incoming, Rejected> {
    let value: Value = serde_json::from_str(line).map_err(|e| Rejected {
        reply_to: Some(Value::Null),
        error: RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
    })?;

    if !value.is_object() {
        return Err(Rejected {
            reply_to: Some(Value::Null),
            error: RpcError::new(INVALID_REQUEST, "Invalid Request: expected a JSON object"),
        });
    }

    // A present id makes it a request, even when the id is null
    let id = value.get("id").cloned();
    let raw: RawEnvelope = serde_json::from_value(value).map_err(|e| Rejected {
        reply_to: Some(Value::Null),
        error: RpcError::new(INVALID_REQUEST, format!("Invalid Request: {}", e)),
    })?;

    if raw.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
        return Err(Rejected {
            reply_to: id.clone(),
            error: RpcError::new(INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""),
        });
    }

    let method = match raw.method {
        Some(m) if !m.is_empty() => m,
        _ => {
            return Err(Rejected {
                reply_to: id.clone(),
                error: RpcError::new(INVALID_REQUEST, "Invalid Request: missing method"),
            })
        }
    };
    let params = raw.params.unwrap_or_else(|| json!({}));

    Ok(match id {
        Some(id) => Incoming::Request { id, method, params },
        None => Incoming::Notification { method, params },
    })
}

/// MCP tool result carrying a single text block.
pub fn tool_text(text: impl Into<String>, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }],
        "isError": is_error,
    })
}
