//! JSON-RPC 2.0 message shapes used between the proxy, the client and the backends.
//!
//! The proxy only ever looks inside `params`/`result` payloads for the handful of things
//! it needs to rewrite (ids, `initializationOptions`, capability fields); everything else
//! is kept as opaque [`serde_json::Value`].

use std::fmt;

use jsonrpc_core::Id;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

/// A JSON-RPC error object, as carried by a [`Message::Response`].
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError { code, message: message.into(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        RpcError::new(-32601, format!("method not found: {}", method))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        RpcError::new(-32603, message.into())
    }

    pub fn server_not_initialized() -> Self {
        RpcError::new(-32002, "server not initialized")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        RpcError::new(-32600, message.into())
    }

    pub fn parse_error() -> Self {
        RpcError::new(-32700, "parse error")
    }
}

impl Serialize for RpcError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + if self.data.is_some() { 1 } else { 0 };
        let mut s = serializer.serialize_struct("RpcError", len)?;
        s.serialize_field("code", &self.code)?;
        s.serialize_field("message", &self.message)?;
        if let Some(data) = &self.data {
            s.serialize_field("data", data)?;
        }
        s.end()
    }
}

/// One JSON-RPC 2.0 message: a request, a notification, or a response.
#[derive(Debug, Clone)]
pub enum Message {
    Request { id: Id, method: String, params: Value },
    Notification { method: String, params: Value },
    Response { id: Id, outcome: Result<Value, RpcError> },
}

impl Message {
    pub fn request(id: Id, method: impl Into<String>, params: Value) -> Self {
        Message::Request { id, method: method.into(), params }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Message::Notification { method: method.into(), params }
    }

    pub fn success(id: Id, result: Value) -> Self {
        Message::Response { id, outcome: Ok(result) }
    }

    pub fn failure(id: Id, error: RpcError) -> Self {
        Message::Response { id, outcome: Err(error) }
    }

    /// The `method` of a request or notification, if this message carries one.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(method),
            Message::Response { .. } => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request { .. })
    }

    /// Parses a single JSON-RPC message from its wire representation.
    ///
    /// Per JSON-RPC, an object with `method` is a request (if it has `id`) or a
    /// notification (if it doesn't); an object without `method` but with `id` is a
    /// response to one of our own outbound requests.
    pub fn try_parse(text: &str) -> Result<Message, RpcError> {
        let value: Value = serde_json::from_str(text).map_err(|_| RpcError::parse_error())?;
        Message::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Message, RpcError> {
        let object = value.as_object().ok_or_else(|| RpcError::invalid_request("not an object"))?;

        let id = object.get("id").map(|id| {
            serde_json::from_value::<Id>(id.clone()).unwrap_or(Id::Null)
        });

        if let Some(method) = object.get("method") {
            let method =
                method.as_str().ok_or_else(|| RpcError::invalid_request("method not a string"))?.to_owned();
            let params = object.get("params").cloned().unwrap_or(Value::Null);
            return Ok(match id {
                Some(id) => Message::Request { id, method, params },
                None => Message::Notification { method, params },
            });
        }

        let id = id.ok_or_else(|| RpcError::invalid_request("response missing id"))?;
        if let Some(error) = object.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
            let message =
                error.get("message").and_then(Value::as_str).unwrap_or("").to_owned();
            let data = error.get("data").cloned();
            return Ok(Message::Response { id, outcome: Err(RpcError { code, message, data }) });
        }

        let result = object.get("result").cloned().unwrap_or(Value::Null);
        Ok(Message::Response { id, outcome: Ok(result) })
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Message::Request { id, method, params } => {
                let serialize_params = !params.is_null();
                let len = 3 + if serialize_params { 1 } else { 0 };
                let mut s = serializer.serialize_struct("Message", len)?;
                s.serialize_field("jsonrpc", "2.0")?;
                s.serialize_field("id", id)?;
                s.serialize_field("method", method)?;
                if serialize_params {
                    s.serialize_field("params", params)?;
                }
                s.end()
            }
            Message::Notification { method, params } => {
                let serialize_params = !params.is_null();
                let len = 2 + if serialize_params { 1 } else { 0 };
                let mut s = serializer.serialize_struct("Message", len)?;
                s.serialize_field("jsonrpc", "2.0")?;
                s.serialize_field("method", method)?;
                if serialize_params {
                    s.serialize_field("params", params)?;
                }
                s.end()
            }
            Message::Response { id, outcome } => {
                let mut s = serializer.serialize_struct("Message", 3)?;
                s.serialize_field("jsonrpc", "2.0")?;
                s.serialize_field("id", id)?;
                match outcome {
                    Ok(result) => s.serialize_field("result", result)?,
                    Err(error) => s.serialize_field("error", error)?,
                }
                s.end()
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => s.fmt(f),
            Err(_) => Err(fmt::Error),
        }
    }
}
