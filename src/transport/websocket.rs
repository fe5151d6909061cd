//! WebDriver BiDi over WebSocket

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, warn};

use super::{Capabilities, Command, CommandResponse, Driver};
use crate::{HarError, Result};

type PendingCommands = Arc<Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>>;

/// BiDi driver speaking JSON over a WebSocket
///
/// Commands are correlated with replies by id; event frames are forwarded
/// untouched to the stream returned by [`Driver::messages`].
pub struct WebSocketDriver {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingCommands,
    events: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    next_id: AtomicU64,
    tasks: Vec<JoinHandle<()>>,
}

impl WebSocketDriver {
    /// Connect to a BiDi WebSocket endpoint
    ///
    /// # Errors
    ///
    /// Returns error if connection fails
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| HarError::Transport(format!("WebSocket connect failed: {e}")))?;

        debug!("Connected to {url}");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an established WebSocket stream
    pub fn from_stream<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: PendingCommands = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("Failed to send command: {e}");
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => dispatch(&text, &reader_pending, &events_tx),
                    Ok(Message::Close(_)) => {
                        debug!("Remote end closed connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                }
            }

            // Waiters see the dropped senders as a closed connection
            reader_pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        });

        Self {
            outgoing,
            pending,
            events: Mutex::new(Some(events_rx)),
            next_id: AtomicU64::new(1),
            tasks: vec![writer, reader],
        }
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.send(Command::new(method, params)).await?.into_result()
    }
}

fn dispatch(
    text: &str,
    pending: &PendingCommands,
    events: &mpsc::UnboundedSender<String>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring malformed message: {e}");
            return;
        }
    };

    if value.get("type").and_then(Value::as_str) == Some("event") {
        let _ = events.send(text.to_string());
        return;
    }

    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        debug!("Ignoring message without id");
        return;
    };

    let waiter = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);

    match (waiter, serde_json::from_value::<CommandResponse>(value)) {
        (Some(waiter), Ok(response)) => {
            let _ = waiter.send(response);
        }
        (Some(_), Err(e)) => warn!(id, "Malformed command reply: {e}"),
        (None, _) => debug!(id, "Reply for unknown command"),
    }
}

fn subscription_params(event: &str, contexts: &[String]) -> Value {
    if contexts.is_empty() {
        json!({ "events": [event] })
    } else {
        json!({ "events": [event], "contexts": contexts })
    }
}

#[async_trait]
impl Driver for WebSocketDriver {
    async fn capabilities(&self) -> Result<Capabilities> {
        let result = self
            .command("session.new", json!({ "capabilities": {} }))
            .await?;

        let capabilities = result.get("capabilities").cloned().ok_or_else(|| {
            HarError::Protocol("session.new returned no capabilities".to_string())
        })?;
        Ok(serde_json::from_value(capabilities)?)
    }

    async fn subscribe(&self, event: &str, contexts: &[String]) -> Result<()> {
        self.command("session.subscribe", subscription_params(event, contexts))
            .await
            .map(|_| ())
    }

    async fn unsubscribe(&self, event: &str, contexts: &[String]) -> Result<()> {
        self.command("session.unsubscribe", subscription_params(event, contexts))
            .await
            .map(|_| ())
    }

    async fn send(&self, command: Command) -> Result<CommandResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        let payload = json!({
            "id": id,
            "method": command.method,
            "params": command.params,
        });

        if self.outgoing.send(Message::Text(payload.to_string())).is_err() {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(HarError::Transport("connection closed".to_string()));
        }

        rx.await
            .map_err(|_| HarError::Transport("connection closed before reply".to_string()))
    }

    async fn messages(&self) -> Result<mpsc::UnboundedReceiver<String>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| HarError::Transport("message stream already taken".to_string()))
    }
}

impl Drop for WebSocketDriver {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
