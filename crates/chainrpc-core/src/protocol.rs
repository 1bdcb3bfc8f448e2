//! JSON-RPC protocol definitions
//!
//! Both JSON-RPC 1.0 (as spoken by Bitcoin Core and friends) and 2.0 messages are
//! representable. Only positional (`by-position`) parameters are supported.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC protocol version carried in the `jsonrpc` member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    #[serde(rename = "1.0")]
    V1,
    #[serde(rename = "2.0")]
    V2,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V1 => "1.0",
            Version::V2 => "2.0",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request ID
///
/// Strings that look like integers are normalized to numbers, so an id always
/// serializes as a JSON number when it can. Some v1.0 servers reject string ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    #[default]
    Null,
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        match i64::try_from(id) {
            Ok(n) => RequestId::Number(n),
            Err(_) => RequestId::String(id.to_string()),
        }
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        let digits = id.strip_prefix('-').unwrap_or(&id);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = id.parse::<i64>() {
                return RequestId::Number(n);
            }
        }
        RequestId::String(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::from(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => f.write_str(s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(RequestId::Null),
            Value::String(s) => Ok(RequestId::from(s)),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => RequestId::Number(i),
                None => RequestId::String(n.to_string()),
            }),
            other => Err(de::Error::custom(format!("invalid request id: {}", other))),
        }
    }
}

/// JSON-RPC Request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_request_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub id: RequestId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Vec<Value>,
}

fn default_request_version() -> String {
    Version::V1.as_str().to_string()
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Request {
    /// Create a JSON-RPC 2.0 request. Trailing `null` params are removed.
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<RequestId>) -> Self {
        Self::with_version(Version::V2, method, params, id)
    }

    /// Create a request for a specific protocol version. Trailing `null` params are removed.
    pub fn with_version(
        version: Version,
        method: impl Into<String>,
        params: Vec<Value>,
        id: impl Into<RequestId>,
    ) -> Self {
        Self {
            jsonrpc: version.as_str().to_string(),
            method: method.into(),
            id: id.into(),
            params: strip_trailing_nulls(params),
        }
    }

    pub fn validate(&self) -> Result<(), RpcError> {
        if self.jsonrpc != "2.0" && self.jsonrpc != "1.0" {
            return Err(RpcError::invalid_request(format!(
                "Unsupported JSON-RPC version: {}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(RpcError::invalid_request("Empty method name"));
        }
        Ok(())
    }
}

/// Remove every `null` that follows the last non-`null` parameter.
///
/// A `null` sent over the wire overrides the server default for that position,
/// so trailing ones are dropped. Earlier `null`s are placeholders and are kept.
pub fn strip_trailing_nulls(mut params: Vec<Value>) -> Vec<Value> {
    while matches!(params.last(), Some(Value::Null)) {
        params.pop();
    }
    params
}

/// JSON-RPC Response
///
/// `result: Some(Value::Null)` is a present `null` result (a void method);
/// `result: None` means the member was absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: RequestId,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Response {
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: Version::V2.as_str().to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(error: RpcError, id: RequestId) -> Self {
        Self {
            jsonrpc: Version::V2.as_str().to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Success response echoing the version and id of `request`
    pub fn result_for(request: &Request, result: Value) -> Self {
        Self {
            jsonrpc: request.jsonrpc.clone(),
            id: request.id.clone(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response echoing the version and id of `request`
    pub fn error_for(request: &Request, error: RpcError) -> Self {
        Self {
            jsonrpc: request.jsonrpc.clone(),
            id: request.id.clone(),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// A response with neither `result` nor `error` violates the protocol.
    pub fn has_outcome(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Split into the result or the server-reported error.
    ///
    /// Bitcoin Core sends `"result": null` next to an error, so `error` wins.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(RpcError::internal_error(
                "Response carried neither result nor error",
            )),
        }
    }
}

/// Standard and reserved error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError,
    ServerException,
    /// Synthesized by the client while waiting for a server to come up
    ServerUnavailable,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::ParseError,
        ErrorCode::InvalidRequest,
        ErrorCode::MethodNotFound,
        ErrorCode::InvalidParams,
        ErrorCode::InternalError,
        ErrorCode::ServerError,
        ErrorCode::ServerException,
        ErrorCode::ServerUnavailable,
    ];

    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError => -32000,
            ErrorCode::ServerException => -32001,
            ErrorCode::ServerUnavailable => -20000,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ServerError => "Server error",
            ErrorCode::ServerException => "Server exception",
            ErrorCode::ServerUnavailable => "Server temporarily unavailable",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// JSON-RPC Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error with the standard message for `code`
    pub fn of(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message())
    }

    /// Error whose message is the standard message for `code` followed by `cause`
    pub fn with_cause(code: ErrorCode, cause: impl fmt::Display) -> Self {
        Self::new(code.code(), format!("{}: {}", code.message(), cause))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(cause: impl fmt::Display) -> Self {
        Self::with_cause(ErrorCode::ParseError, cause)
    }

    pub fn invalid_request(cause: impl fmt::Display) -> Self {
        Self::with_cause(ErrorCode::InvalidRequest, cause)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::with_cause(ErrorCode::MethodNotFound, method)
    }

    pub fn invalid_params(cause: impl fmt::Display) -> Self {
        Self::with_cause(ErrorCode::InvalidParams, cause)
    }

    pub fn internal_error(cause: impl fmt::Display) -> Self {
        Self::with_cause(ErrorCode::InternalError, cause)
    }

    pub fn server_exception(cause: impl fmt::Display) -> Self {
        Self::with_cause(ErrorCode::ServerException, cause)
    }

    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}
