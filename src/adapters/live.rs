//! Live recorder driving a remote browser session
//!
//! [`LiveRecorder`] subscribes to the recorded events for a set of browsing
//! contexts and feeds them to a [`HarRecorder`] in delivery order. When body
//! collection is enabled, each `network.responseCompleted` also queues a body
//! fetch on the [`TaskQueue`]; the bodies are attached to the recorded entry
//! once the fetch settles.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::body;
use crate::config::{HeaderValueFormatter, LiveConfig, RecorderConfig};
use crate::event::{self, BodyData, Event, RECORDED_EVENTS};
use crate::har::Har;
use crate::recorder::HarRecorder;
use crate::task_queue::TaskQueue;
use crate::transport::{Command, Driver};
use crate::{HarError, Result};

/// Request id and redirect count of a recorded response
type EntryKey = (String, u32);

type PendingBody = BoxFuture<'static, (EntryKey, Result<Option<BodyData>>)>;

struct Running {
    shutdown: oneshot::Sender<()>,
    pump: JoinHandle<HarRecorder>,
    collector: Option<String>,
}

/// Records a HAR from a live browser session
pub struct LiveRecorder<D: Driver + 'static> {
    driver: Arc<D>,
    config: LiveConfig,
    header_value_formatter: Option<HeaderValueFormatter>,
    running: Option<Running>,
}

impl<D: Driver + 'static> LiveRecorder<D> {
    /// Create a live recorder
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(driver: Arc<D>, config: LiveConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            driver,
            config,
            header_value_formatter: None,
            running: None,
        })
    }

    /// Install a hook applied to every exported header and cookie value
    #[must_use]
    pub fn with_header_value_formatter(mut self, formatter: HeaderValueFormatter) -> Self {
        self.header_value_formatter = Some(formatter);
        self
    }

    /// Check if a recording is in progress
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.running.is_some()
    }

    /// Subscribe to the recorded events and start recording
    ///
    /// # Errors
    ///
    /// Returns error if already recording, or if capabilities, subscriptions
    /// or the message stream cannot be obtained. Failing to seed existing
    /// contexts or to install the data collector is logged and tolerated.
    pub async fn start(&mut self, initial_page_url: Option<&str>) -> Result<()> {
        if self.running.is_some() {
            return Err(HarError::State("HAR recording already started".to_string()));
        }

        let debug_logs = self.config.debug_logs;
        let contexts = &self.config.browsing_context_ids;

        let capabilities = self.driver.capabilities().await?;
        let mut recorder = HarRecorder::new(
            RecorderConfig::new(capabilities.browser_name, capabilities.browser_version)
                .with_debug_logs(debug_logs),
        )?;
        if let Some(formatter) = &self.header_value_formatter {
            recorder = recorder.with_header_value_formatter(Arc::clone(formatter));
        }
        recorder.start(initial_page_url)?;

        for (subscribed, method) in RECORDED_EVENTS.iter().enumerate() {
            if let Err(e) = self.driver.subscribe(method, contexts).await {
                self.unsubscribe(&RECORDED_EVENTS[..subscribed]).await;
                return Err(e);
            }
        }

        let seeded = match self.top_level_contexts().await {
            Ok(seeded) => seeded,
            Err(e) => {
                warn_log!(debug_logs, "Failed to list existing contexts: {e}");
                Vec::new()
            }
        };

        let messages = match self.driver.messages().await {
            Ok(messages) => messages,
            Err(e) => {
                self.unsubscribe(&RECORDED_EVENTS).await;
                return Err(e);
            }
        };

        let collector = if self.config.skip_body_data {
            None
        } else {
            match body::add_data_collector(&*self.driver, contexts, self.config.max_body_size).await
            {
                Ok(collector) => Some(collector),
                Err(e) => {
                    warn_log!(debug_logs, "Failed to add data collector: {e}");
                    None
                }
            }
        };

        for context in seeded {
            let mut params = Map::new();
            params.insert("context".to_string(), Value::String(context));
            params.insert("parent".to_string(), Value::Null);
            let created = Event {
                method: event::CONTEXT_CREATED.to_string(),
                params,
            };
            record(&mut recorder, &created, debug_logs);
        }

        let fetcher = collector.clone().map(|collector| BodyFetcher {
            driver: Arc::clone(&self.driver),
            collector,
            queue: TaskQueue::new(
                self.config.max_concurrent_get_data,
                Duration::from_millis(self.config.get_data_timeout_ms),
            ),
            debug_logs,
        });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let pump = tokio::spawn(pump(recorder, messages, shutdown_rx, fetcher, debug_logs));

        info!(
            contexts = contexts.len(),
            collector = collector.is_some(),
            "Live HAR recording started"
        );
        self.running = Some(Running {
            shutdown,
            pump,
            collector,
        });
        Ok(())
    }

    /// Stop recording and export the HAR
    ///
    /// Pending body fetches are awaited before export. Returns `Ok(None)` if
    /// the export itself failed; the failure is logged.
    ///
    /// # Errors
    ///
    /// Returns error if not recording or if the event pump panicked
    pub async fn stop(&mut self, last_page_url: Option<&str>) -> Result<Option<Har>> {
        let Some(running) = self.running.take() else {
            return Err(HarError::State("HAR recording not started".to_string()));
        };
        let debug_logs = self.config.debug_logs;

        let _ = running.shutdown.send(());
        let mut recorder = running
            .pump
            .await
            .map_err(|e| HarError::Task(format!("event pump failed: {e}")))?;

        self.unsubscribe(&RECORDED_EVENTS).await;

        if let Some(collector) = &running.collector {
            if let Err(e) = body::remove_data_collector(&*self.driver, collector).await {
                warn_log!(debug_logs, "Failed to remove data collector: {e}");
            }
        }

        match recorder.stop(last_page_url) {
            Ok(har) => {
                info!(entries = har.log.entries.len(), "Live HAR recording stopped");
                Ok(Some(har))
            }
            Err(e) => {
                warn!("Failed to export HAR: {e}");
                Ok(None)
            }
        }
    }

    /// Best-effort unsubscribe; failures are logged
    async fn unsubscribe(&self, methods: &[&str]) {
        for method in methods {
            if let Err(e) = self
                .driver
                .unsubscribe(method, &self.config.browsing_context_ids)
                .await
            {
                warn_log!(self.config.debug_logs, method, "Failed to unsubscribe: {e}");
            }
        }
    }

    /// Ids of the existing top-level contexts among the monitored ones
    async fn top_level_contexts(&self) -> Result<Vec<String>> {
        let result = self
            .driver
            .send(Command::new("browsingContext.getTree", json!({})))
            .await?
            .into_result()?;

        let monitored = &self.config.browsing_context_ids;
        let contexts = result
            .get("contexts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(contexts
            .iter()
            .filter(|info| info.get("parent").map_or(true, Value::is_null))
            .filter_map(|info| info.get("context").and_then(Value::as_str))
            .filter(|id| monitored.is_empty() || monitored.iter().any(|m| m == *id))
            .map(str::to_string)
            .collect())
    }
}

struct BodyFetcher<D: Driver + 'static> {
    driver: Arc<D>,
    collector: String,
    queue: TaskQueue,
    debug_logs: bool,
}

impl<D: Driver + 'static> BodyFetcher<D> {
    fn fetch(&self, key: EntryKey) -> PendingBody {
        let driver = Arc::clone(&self.driver);
        let collector = self.collector.clone();
        let request_id = key.0.clone();
        let debug_logs = self.debug_logs;

        let result = self.queue.submit(move || async move {
            Ok(body::fetch_body_data(&*driver, &collector, &request_id, debug_logs).await)
        });

        async move { (key, result.await) }.boxed()
    }
}

/// Owns the recorder while recording. Returns it once shut down, with every
/// delivered event recorded and every body fetch settled.
async fn pump<D: Driver + 'static>(
    mut recorder: HarRecorder,
    mut messages: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
    fetcher: Option<BodyFetcher<D>>,
    debug_logs: bool,
) -> HarRecorder {
    let mut pending: FuturesUnordered<PendingBody> = FuturesUnordered::new();
    let mut messages_open = true;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            Some((key, body)) = pending.next(), if !pending.is_empty() => {
                attach_body(&mut recorder, key, body, debug_logs);
            }
            message = messages.recv(), if messages_open => {
                match message {
                    Some(text) => on_message(&mut recorder, &mut pending, fetcher.as_ref(), &text, debug_logs),
                    None => messages_open = false,
                }
            }
        }
    }

    // Events delivered before shutdown still belong to this recording
    while let Ok(text) = messages.try_recv() {
        on_message(&mut recorder, &mut pending, fetcher.as_ref(), &text, debug_logs);
    }

    if let Some(fetcher) = &fetcher {
        fetcher.queue.drain().await;
    }
    while let Some((key, body)) = pending.next().await {
        attach_body(&mut recorder, key, body, debug_logs);
    }

    recorder
}

fn on_message<D: Driver + 'static>(
    recorder: &mut HarRecorder,
    pending: &mut FuturesUnordered<PendingBody>,
    fetcher: Option<&BodyFetcher<D>>,
    text: &str,
    debug_logs: bool,
) {
    let event = match parse_event(text) {
        Ok(event) => event,
        Err(e) => {
            warn_log!(debug_logs, "Ignoring malformed event: {e}");
            return;
        }
    };

    record(recorder, &event, debug_logs);

    if let (Some(fetcher), Some(key)) = (fetcher, body_key(&event)) {
        pending.push(fetcher.fetch(key));
    }
}

fn parse_event(text: &str) -> Result<Event> {
    Event::from_value(serde_json::from_str(text)?)
}

/// Entry key of a `network.responseCompleted` event
fn body_key(event: &Event) -> Option<EntryKey> {
    if event.method != event::RESPONSE_COMPLETED {
        return None;
    }

    let request_id = match event.params.get("request")?.get("request")? {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let redirect_count = event
        .params
        .get("redirectCount")
        .and_then(Value::as_u64)
        .and_then(|count| u32::try_from(count).ok())
        .unwrap_or(0);

    Some((request_id, redirect_count))
}

fn attach_body(
    recorder: &mut HarRecorder,
    (request_id, redirect_count): EntryKey,
    body: Result<Option<BodyData>>,
    debug_logs: bool,
) {
    match body {
        Ok(Some(body)) => {
            if let Err(e) = recorder.attach_body_data(&request_id, redirect_count, body) {
                warn_log!(debug_logs, %request_id, "Failed to attach body data: {e}");
            }
        }
        Ok(None) => {}
        Err(e) => warn_log!(debug_logs, %request_id, "Body fetch failed: {e}"),
    }
}

fn record(recorder: &mut HarRecorder, event: &Event, debug_logs: bool) {
    if let Err(e) = recorder.record_event(event) {
        warn_log!(debug_logs, method = %event.method, "Failed to record event: {e}");
    }
}
