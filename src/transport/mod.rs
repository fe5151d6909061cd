//! Remote automation transport
//!
//! The live recorder talks to the browser through the [`Driver`] trait.
//! [`WebSocketDriver`] implements it over a WebDriver BiDi WebSocket.

mod websocket;

pub use websocket::WebSocketDriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{HarError, Result};

/// Browser identity negotiated with the remote end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Browser name, e.g. `firefox`
    pub browser_name: String,
    /// Browser version
    pub browser_version: String,
}

/// A protocol command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command method, e.g. `network.getData`
    pub method: String,
    /// Command params
    pub params: Value,
}

impl Command {
    /// Create a command
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Reply to a protocol command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandResponse {
    /// Command succeeded
    Success {
        /// Command result
        #[serde(default)]
        result: Value,
    },
    /// Command failed
    Error {
        /// Error description
        #[serde(default)]
        message: String,
    },
}

impl CommandResponse {
    /// Convert into the command result
    ///
    /// # Errors
    ///
    /// Returns [`HarError::Protocol`] for error replies
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Success { result } => Ok(result),
            Self::Error { message } => Err(HarError::Protocol(message)),
        }
    }
}

/// Capabilities the live recorder needs from a remote automation session
#[async_trait]
pub trait Driver: Send + Sync {
    /// Negotiated browser identity
    async fn capabilities(&self) -> Result<Capabilities>;

    /// Subscribe to an event for the given contexts
    async fn subscribe(&self, event: &str, contexts: &[String]) -> Result<()>;

    /// Unsubscribe from an event for the given contexts
    async fn unsubscribe(&self, event: &str, contexts: &[String]) -> Result<()>;

    /// Send a command and wait for its reply
    async fn send(&self, command: Command) -> Result<CommandResponse>;

    /// Take the stream of inbound JSON event envelopes
    async fn messages(&self) -> Result<mpsc::UnboundedReceiver<String>>;
}
