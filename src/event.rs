//! Protocol events consumed by the recorder
//!
//! Events arrive as `{ method, params }` envelopes. The envelope is kept
//! generic so unknown methods can be ignored; params of the methods the
//! recorder understands are decoded into the typed structs below.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{HarError, Result};

/// `network.beforeRequestSent`
pub const BEFORE_REQUEST_SENT: &str = "network.beforeRequestSent";
/// `network.responseCompleted`
pub const RESPONSE_COMPLETED: &str = "network.responseCompleted";
/// `browsingContext.contextCreated`
pub const CONTEXT_CREATED: &str = "browsingContext.contextCreated";
/// `browsingContext.domContentLoaded`
pub const DOM_CONTENT_LOADED: &str = "browsingContext.domContentLoaded";
/// `browsingContext.load`
pub const LOAD: &str = "browsingContext.load";

/// Every event method the recorder consumes
pub const RECORDED_EVENTS: [&str; 5] = [
    BEFORE_REQUEST_SENT,
    RESPONSE_COMPLETED,
    CONTEXT_CREATED,
    DOM_CONTENT_LOADED,
    LOAD,
];

/// A protocol event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event method name
    pub method: String,
    /// Event params object
    pub params: Map<String, Value>,
}

impl Event {
    /// Build an event from a method name and a params value
    ///
    /// # Errors
    ///
    /// Returns error if the method is empty or params is not an object
    pub fn new(method: impl Into<String>, params: Value) -> Result<Self> {
        let method = method.into();
        if method.is_empty() {
            return Err(HarError::Validation("event has no method".to_string()));
        }

        match params {
            Value::Object(params) => Ok(Self { method, params }),
            other => Err(HarError::Validation(format!(
                "event {method} has non-object params: {other}"
            ))),
        }
    }

    /// Build an event from a decoded JSON envelope
    ///
    /// # Errors
    ///
    /// Returns error if the envelope lacks a method or a params object
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut envelope) = value else {
            return Err(HarError::Validation("event is not an object".to_string()));
        };

        let method = match envelope.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(HarError::Validation("event has no method".to_string())),
        };

        let params = envelope
            .remove("params")
            .ok_or_else(|| HarError::Validation(format!("event {method} has no params")))?;

        Self::new(method, params)
    }

    /// The `params.timestamp` of this event, if any
    #[must_use]
    pub fn timestamp(&self) -> Option<f64> {
        self.params.get("timestamp").and_then(Value::as_f64)
    }

    /// Decode the params into a typed struct
    ///
    /// # Errors
    ///
    /// Returns error if the params do not match the expected shape
    pub fn decode_params<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(Value::Object(self.params.clone()))
            .map_err(|e| HarError::Validation(format!("invalid params for {}: {e}", self.method)))
    }
}

/// Params of `network.beforeRequestSent`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeRequestSentParams {
    /// Owning browsing context
    #[serde(default)]
    pub context: Option<String>,
    /// Position in the redirect chain
    #[serde(default)]
    pub redirect_count: u32,
    /// Request snapshot
    pub request: RequestData,
}

/// Params of `network.responseCompleted`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCompletedParams {
    /// Owning browsing context
    #[serde(default)]
    pub context: Option<String>,
    /// Position in the redirect chain
    #[serde(default)]
    pub redirect_count: u32,
    /// Request snapshot
    pub request: RequestData,
    /// Response snapshot
    pub response: ResponseData,
    /// Bodies fetched out-of-band by the live recorder
    #[serde(rename = "_bodyData", default)]
    pub body_data: Option<BodyData>,
}

/// Params of `browsingContext.contextCreated`
#[derive(Debug, Clone, Deserialize)]
pub struct ContextCreatedParams {
    /// Created context id
    pub context: String,
    /// Parent context, `None` for top-level contexts
    #[serde(default)]
    pub parent: Option<String>,
}

/// Params of `browsingContext.domContentLoaded` and `browsingContext.load`
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationParams {
    /// Context the marker belongs to
    pub context: String,
    /// Document url
    #[serde(default)]
    pub url: String,
    /// Wall-clock time of the marker, in milliseconds
    pub timestamp: f64,
}

/// Request snapshot carried by network events
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    /// Protocol request id, shared by every hop of a redirect chain
    #[serde(deserialize_with = "string_or_number")]
    pub request: String,
    /// Request url
    pub url: String,
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Request headers
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Request cookies
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Size of the serialized headers
    #[serde(default)]
    pub headers_size: Option<i64>,
    /// Size of the request body
    #[serde(default)]
    pub body_size: Option<i64>,
    /// Fetch timing instants
    #[serde(default)]
    pub timings: FetchTimings,
}

/// Raw fetch timing instants, in the session's time unit (0 = did not happen)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchTimings {
    /// Time the request was issued
    pub request_time: f64,
    /// DNS lookup start
    pub dns_start: f64,
    /// DNS lookup end
    pub dns_end: f64,
    /// Connection start
    pub connect_start: f64,
    /// Connection end
    pub connect_end: f64,
    /// TLS handshake start
    pub tls_start: f64,
    /// TLS handshake end
    pub tls_end: f64,
    /// Request sending start
    pub request_start: f64,
    /// First response byte
    pub response_start: f64,
    /// Last response byte
    pub response_end: f64,
}

/// Response snapshot carried by `network.responseCompleted`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseData {
    /// Response url
    pub url: String,
    /// Protocol, e.g. `http/1.1`
    pub protocol: Option<String>,
    /// HTTP status
    pub status: Option<i64>,
    /// HTTP status text
    pub status_text: Option<String>,
    /// Response headers
    pub headers: Vec<Header>,
    /// Response mime type
    pub mime_type: Option<String>,
    /// Decoded content info
    pub content: ResponseContent,
    /// Size of the serialized headers
    pub headers_size: Option<i64>,
    /// Bytes received on the wire
    pub bytes_received: Option<i64>,
}

/// Response content info
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ResponseContent {
    /// Decoded body size
    pub size: Option<i64>,
}

/// A header as delivered by the protocol
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,
    /// Header value
    pub value: HeaderValue,
}

/// A cookie as delivered by the protocol
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: HeaderValue,
    /// Cookie domain
    #[serde(default)]
    pub domain: Option<String>,
    /// Cookie path
    #[serde(default)]
    pub path: Option<String>,
    /// `HttpOnly` flag
    #[serde(default)]
    pub http_only: Option<bool>,
    /// `Secure` flag
    #[serde(default)]
    pub secure: Option<bool>,
}

/// Header or cookie value: either a plain string or a tagged bytes wrapper
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Plain string value
    Text(String),
    /// Tagged value
    Bytes(BytesValue),
}

/// Tagged bytes value, `{ type: "string" | "base64", value }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesValue {
    /// Value encoding
    #[serde(rename = "type")]
    pub kind: BytesKind,
    /// Encoded value
    pub value: String,
}

impl BytesValue {
    /// A plain string value
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: BytesKind::String,
            value: value.into(),
        }
    }

    /// A base64 encoded value
    pub fn base64(value: impl Into<String>) -> Self {
        Self {
            kind: BytesKind::Base64,
            value: value.into(),
        }
    }
}

/// Encoding of a [`BytesValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BytesKind {
    /// UTF-8 text
    String,
    /// Base64 encoded bytes
    Base64,
}

/// Request and response bodies fetched out-of-band
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyData {
    /// Request body
    #[serde(default)]
    pub request: Option<BytesValue>,
    /// Response body
    #[serde(default)]
    pub response: Option<BytesValue>,
}

impl BodyData {
    /// Check if neither side carries a body
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request.is_none() && self.response.is_none()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(id) => id,
        Id::Number(id) => id.to_string(),
    })
}
