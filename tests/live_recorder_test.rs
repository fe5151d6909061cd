//! Live recording against a scripted driver

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bidi_har::adapters::LiveRecorder;
use bidi_har::transport::{Capabilities, Command, CommandResponse, Driver};
use bidi_har::{Event, HarError, LiveConfig, Result};
use common::{envelope, mock_events, MockOptions, START_MS};
use serde_json::json;
use tokio::sync::mpsc;

const REQUEST_BODY: &str = r#"{"test":"request"}"#;
const RESPONSE_BODY: &str = "<html><body>Test Response</body></html>";

/// Scripted BiDi remote end
struct MockDriver {
    commands: Mutex<Vec<String>>,
    subscriptions: Mutex<HashSet<String>>,
    events_tx: mpsc::UnboundedSender<String>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    failing: HashSet<&'static str>,
    get_data_delay: Option<Duration>,
}

impl MockDriver {
    fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            commands: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashSet::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            failing: HashSet::new(),
            get_data_delay: None,
        }
    }

    fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    fn get_data_delay(mut self, delay: Duration) -> Self {
        self.get_data_delay = Some(delay);
        self
    }

    fn emit(&self, event: &Event) {
        if self.subscriptions.lock().unwrap().contains(&event.method) {
            self.events_tx.send(envelope(event)).unwrap();
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn count(&self, method: &str) -> usize {
        self.commands().iter().filter(|c| *c == method).count()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn capabilities(&self) -> Result<Capabilities> {
        Ok(Capabilities {
            browser_name: "firefox".to_string(),
            browser_version: "112.0a1".to_string(),
        })
    }

    async fn subscribe(&self, event: &str, _contexts: &[String]) -> Result<()> {
        if self.failing.contains(event) {
            return Err(HarError::Transport(format!("cannot subscribe to {event}")));
        }
        self.subscriptions.lock().unwrap().insert(event.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, event: &str, _contexts: &[String]) -> Result<()> {
        self.subscriptions.lock().unwrap().remove(event);
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<CommandResponse> {
        self.commands.lock().unwrap().push(command.method.clone());

        if self.failing.contains(command.method.as_str()) {
            return Err(HarError::Transport(format!("{} not supported", command.method)));
        }

        let result = match command.method.as_str() {
            "browsingContext.getTree" => json!({
                "contexts": [
                    { "context": "context-1", "parent": null, "url": "about:blank", "children": [] },
                ],
            }),
            "network.addDataCollector" => json!({ "collector": "collector-1" }),
            "network.removeDataCollector" => json!({}),
            "network.getData" => {
                if let Some(delay) = self.get_data_delay {
                    tokio::time::sleep(delay).await;
                }
                assert_eq!(command.params["collector"], "collector-1");
                let value = match command.params["dataType"].as_str() {
                    Some("request") => REQUEST_BODY,
                    _ => RESPONSE_BODY,
                };
                json!({ "bytes": { "type": "string", "value": value } })
            }
            other => {
                return Ok(CommandResponse::Error {
                    message: format!("unknown command {other}"),
                })
            }
        };

        Ok(CommandResponse::Success { result })
    }

    async fn messages(&self) -> Result<mpsc::UnboundedReceiver<String>> {
        self.events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| HarError::Transport("already taken".to_string()))
    }
}

fn config() -> LiveConfig {
    LiveConfig::new(vec!["context-1".to_string()])
}

fn navigation() -> Vec<Event> {
    let events = mock_events(START_MS, &MockOptions::default());
    vec![
        events.before_request_sent,
        events.response_completed,
        events.dom_content_loaded,
        events.load,
    ]
}

async fn record(driver: Arc<MockDriver>, config: LiveConfig) -> bidi_har::Har {
    let mut recorder = LiveRecorder::new(Arc::clone(&driver), config).unwrap();
    recorder.start(None).await.unwrap();
    assert!(recorder.is_recording());

    for event in navigation() {
        driver.emit(&event);
    }

    let har = recorder.stop(None).await.unwrap().unwrap();
    assert!(!recorder.is_recording());
    har
}

#[tokio::test]
async fn test_live_recording_collects_body_data() {
    let driver = Arc::new(MockDriver::new());
    let har = record(Arc::clone(&driver), config()).await;

    assert_eq!(har.log.browser.name, "firefox");
    assert_eq!(har.log.browser.version, "112.0a1");
    assert_eq!(har.log.pages.len(), 1);
    assert_eq!(har.log.pages[0].title, "https://example.com/");
    assert_eq!(har.log.entries.len(), 1);

    let entry = &har.log.entries[0];
    assert_eq!(entry.pageref, har.log.pages[0].id);
    assert_eq!(entry.response.content.text, RESPONSE_BODY);
    assert_eq!(entry.response.content.encoding, "");
    assert_eq!(
        entry.request.post_data.as_ref().map(|p| p.text.as_str()),
        Some(REQUEST_BODY)
    );

    assert_eq!(driver.count("network.addDataCollector"), 1);
    assert_eq!(driver.count("network.getData"), 2);
    assert_eq!(driver.count("network.removeDataCollector"), 1);
    assert!(driver.subscriptions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_data_collector_failure_is_tolerated() {
    let driver = Arc::new(MockDriver::new().failing("network.addDataCollector"));
    let har = record(Arc::clone(&driver), config()).await;

    assert_eq!(har.log.entries.len(), 1);
    assert_eq!(har.log.entries[0].response.content.text, "");
    assert!(har.log.entries[0].request.post_data.is_none());

    assert_eq!(driver.count("network.getData"), 0);
    assert_eq!(driver.count("network.removeDataCollector"), 0);
}

#[tokio::test]
async fn test_get_data_failure_is_tolerated() {
    let driver = Arc::new(MockDriver::new().failing("network.getData"));
    let har = record(Arc::clone(&driver), config()).await;

    assert_eq!(har.log.entries.len(), 1);
    assert_eq!(har.log.entries[0].response.content.text, "");
    assert!(har.log.entries[0].request.post_data.is_none());
    assert_eq!(driver.count("network.removeDataCollector"), 1);
}

#[tokio::test]
async fn test_slow_get_data_times_out() {
    let driver = Arc::new(MockDriver::new().get_data_delay(Duration::from_millis(500)));
    let mut config = config();
    config.get_data_timeout_ms = 50;

    let har = record(driver, config).await;

    assert_eq!(har.log.entries.len(), 1);
    assert_eq!(har.log.entries[0].response.content.text, "");
}

#[tokio::test]
async fn test_skip_body_data() {
    let driver = Arc::new(MockDriver::new());
    let mut config = config();
    config.skip_body_data = true;

    let har = record(Arc::clone(&driver), config).await;

    assert_eq!(har.log.entries.len(), 1);
    assert_eq!(har.log.entries[0].response.content.text, "");
    assert_eq!(driver.count("network.addDataCollector"), 0);
    assert_eq!(driver.count("network.getData"), 0);
}

#[tokio::test]
async fn test_without_context_tree_markers_are_ignored() {
    let driver = Arc::new(MockDriver::new().failing("browsingContext.getTree"));
    let last_page_url = "https://last.page.url";

    let mut recorder = LiveRecorder::new(Arc::clone(&driver), config()).unwrap();
    recorder.start(None).await.unwrap();
    for event in navigation() {
        driver.emit(&event);
    }
    let har = recorder.stop(Some(last_page_url)).await.unwrap().unwrap();

    assert_eq!(har.log.pages.len(), 1);
    assert_eq!(har.log.pages[0].title, last_page_url);
    assert_eq!(har.log.pages[0].page_timings.on_load, None);
    assert_eq!(har.log.entries.len(), 1);
}

#[tokio::test]
async fn test_markers_fall_back_to_html_response_while_collecting_bodies() {
    let marker_url = "https://example.com/#top";
    let mut hars = Vec::new();

    for skip_body_data in [true, false] {
        let driver = Arc::new(MockDriver::new());
        let mut config = config();
        config.skip_body_data = skip_body_data;

        let mut recorder = LiveRecorder::new(Arc::clone(&driver), config).unwrap();
        recorder.start(None).await.unwrap();
        for mut event in navigation() {
            if event.method.starts_with("browsingContext.") {
                event.params.insert("url".to_string(), json!(marker_url));
            }
            driver.emit(&event);
        }
        hars.push(recorder.stop(None).await.unwrap().unwrap());
    }

    for har in &hars {
        assert_eq!(har.log.pages.len(), 1);
        let page = &har.log.pages[0];
        assert_eq!(page.title, marker_url);
        assert_eq!(page.page_timings.on_content_load, Some(5.0));
        assert_eq!(page.page_timings.on_load, Some(15.0));
        assert_eq!(har.log.entries[0].pageref, page.id);
    }

    assert_eq!(hars[0].log.entries[0].response.content.text, "");
    assert_eq!(hars[1].log.entries[0].response.content.text, RESPONSE_BODY);
}

#[tokio::test]
async fn test_failed_subscription_rolls_back() {
    let driver = Arc::new(MockDriver::new().failing("browsingContext.load"));
    let mut recorder = LiveRecorder::new(Arc::clone(&driver), config()).unwrap();

    assert!(matches!(
        recorder.start(None).await,
        Err(HarError::Transport(_))
    ));
    assert!(!recorder.is_recording());
    assert!(driver.subscriptions.lock().unwrap().is_empty());
    assert_eq!(driver.count("network.addDataCollector"), 0);
}

#[tokio::test]
async fn test_unavailable_message_stream_rolls_back() {
    let driver = Arc::new(MockDriver::new());
    let _taken = driver.messages().await.unwrap();
    let mut recorder = LiveRecorder::new(Arc::clone(&driver), config()).unwrap();

    assert!(matches!(
        recorder.start(None).await,
        Err(HarError::Transport(_))
    ));
    assert!(!recorder.is_recording());
    assert!(driver.subscriptions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let driver = Arc::new(MockDriver::new());
    let mut recorder = LiveRecorder::new(driver, config()).unwrap();

    assert!(matches!(recorder.stop(None).await, Err(HarError::State(_))));

    recorder.start(None).await.unwrap();
    assert!(matches!(recorder.start(None).await, Err(HarError::State(_))));

    let har = recorder.stop(None).await.unwrap().unwrap();
    assert!(har.log.entries.is_empty());
    assert!(matches!(recorder.stop(None).await, Err(HarError::State(_))));
}

#[tokio::test]
async fn test_malformed_messages_are_skipped() {
    let driver = Arc::new(MockDriver::new());
    let mut recorder = LiveRecorder::new(Arc::clone(&driver), config()).unwrap();
    recorder.start(None).await.unwrap();

    driver.events_tx.send("not json".to_string()).unwrap();
    driver
        .events_tx
        .send(json!({ "type": "event", "params": {} }).to_string())
        .unwrap();
    for event in navigation() {
        driver.emit(&event);
    }

    let har = recorder.stop(None).await.unwrap().unwrap();
    assert_eq!(har.log.entries.len(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = config();
    config.max_concurrent_get_data = 0;

    let result = LiveRecorder::new(Arc::new(MockDriver::new()), config);
    assert!(matches!(result, Err(HarError::Configuration(_))));
}

