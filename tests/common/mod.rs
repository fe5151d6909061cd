//! Shared fixtures: a navigation's worth of BiDi events

#![allow(dead_code)]

use bidi_har::Event;
use serde_json::{json, Value};

/// Fixed wall-clock start (ms) used by most tests
pub const START_MS: f64 = 1_700_000_000_000.0;

/// Options for [`mock_events`]
#[derive(Debug, Clone)]
pub struct MockOptions {
    pub url: String,
    pub context_id: String,
    pub parent_context_id: Option<String>,
    pub request_id: String,
    pub redirect_count: u32,
    pub microseconds: bool,
    pub mime_type: String,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            url: "https://example.com/".to_string(),
            context_id: "context-1".to_string(),
            parent_context_id: None,
            request_id: "33".to_string(),
            redirect_count: 0,
            microseconds: true,
            mime_type: "text/html;charset=UTF-8".to_string(),
        }
    }
}

impl MockOptions {
    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn context(mut self, context_id: &str) -> Self {
        self.context_id = context_id.to_string();
        self
    }

    pub fn parent(mut self, parent_context_id: &str) -> Self {
        self.parent_context_id = Some(parent_context_id.to_string());
        self
    }

    pub fn request_id(mut self, request_id: &str) -> Self {
        self.request_id = request_id.to_string();
        self
    }

    pub fn redirect_count(mut self, redirect_count: u32) -> Self {
        self.redirect_count = redirect_count;
        self
    }

    pub fn milliseconds(mut self) -> Self {
        self.microseconds = false;
        self
    }
}

/// Events of one navigation starting at `start_ms`
#[derive(Debug, Clone)]
pub struct MockEvents {
    pub context_created: Event,
    pub before_request_sent: Event,
    pub response_completed: Event,
    pub dom_content_loaded: Event,
    pub load: Event,
}

impl MockEvents {
    /// All events in the order a browser emits them
    pub fn in_order(&self) -> Vec<Event> {
        vec![
            self.context_created.clone(),
            self.before_request_sent.clone(),
            self.response_completed.clone(),
            self.dom_content_loaded.clone(),
            self.load.clone(),
        ]
    }
}

pub fn request_headers() -> Value {
    json!([
        { "name": "Host", "value": "example.com" },
        { "name": "User-Agent", "value": "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/112.0" },
        { "name": "Accept", "value": "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8" },
        { "name": "Accept-Language", "value": "en-US,en;q=0.5" },
        { "name": "Connection", "value": "keep-alive" },
    ])
}

pub fn response_headers() -> Value {
    json!([
        { "name": "content-encoding", "value": "gzip" },
        { "name": "cache-control", "value": "max-age=604800" },
        { "name": "content-type", "value": "text/html; charset=UTF-8" },
        { "name": "etag", "value": "\"3147526947\"" },
        { "name": "content-length", "value": "648" },
    ])
}

/// Raw fetch timings. Phases are 100 raw units apart, so 0.1 ms each with
/// microsecond timings and 100 ms each with millisecond timings.
fn timings(start_ms: f64, microseconds: bool) -> Value {
    let base = if microseconds { start_ms * 1000.0 } else { start_ms };
    json!({
        "originTime": 0,
        "requestTime": base,
        "redirectStart": 0,
        "redirectEnd": 0,
        "fetchStart": base + 100.0,
        "dnsStart": base + 100.0,
        "dnsEnd": base + 200.0,
        "connectStart": base + 300.0,
        "connectEnd": base + 400.0,
        "tlsStart": base + 500.0,
        "tlsEnd": base + 600.0,
        "requestStart": base + 700.0,
        "responseStart": base + 800.0,
        "responseEnd": base + 900.0,
    })
}

fn request(options: &MockOptions, timings: Value) -> Value {
    json!({
        "request": options.request_id,
        "url": options.url,
        "method": "GET",
        "headers": request_headers(),
        "cookies": [],
        "headersSize": 447,
        "bodySize": null,
        "timings": timings,
    })
}

/// Build the events of a navigation to `options.url` starting at `start_ms`
pub fn mock_events(start_ms: f64, options: &MockOptions) -> MockEvents {
    let context = &options.context_id;
    let mut sent_timings = timings(start_ms, options.microseconds);
    if let Some(fields) = sent_timings.as_object_mut() {
        for (name, value) in fields.iter_mut() {
            if name != "requestTime" {
                *value = json!(0);
            }
        }
    }

    let context_created = event(
        "browsingContext.contextCreated",
        json!({
            "context": context,
            "parent": options.parent_context_id,
            "url": "about:blank",
            "children": null,
        }),
    );

    let before_request_sent = event(
        "network.beforeRequestSent",
        json!({
            "context": context,
            "isRedirect": options.redirect_count > 0,
            "redirectCount": options.redirect_count,
            "navigation": null,
            "request": request(options, sent_timings),
            "timestamp": start_ms,
            "initiator": { "type": "other" },
        }),
    );

    let response_completed = event(
        "network.responseCompleted",
        json!({
            "context": context,
            "isRedirect": options.redirect_count > 0,
            "redirectCount": options.redirect_count,
            "navigation": null,
            "request": request(options, timings(start_ms, options.microseconds)),
            "timestamp": start_ms + 10.0,
            "response": {
                "url": options.url,
                "protocol": "http/2",
                "status": 200,
                "statusText": "OK",
                "fromCache": false,
                "headers": response_headers(),
                "mimeType": options.mime_type,
                "bytesReceived": 1040,
                "headersSize": 392,
                "bodySize": 648,
                "content": { "size": 1256 },
            },
        }),
    );

    let dom_content_loaded = event(
        "browsingContext.domContentLoaded",
        json!({ "context": context, "url": options.url, "timestamp": start_ms + 5.0 }),
    );

    let load = event(
        "browsingContext.load",
        json!({ "context": context, "url": options.url, "timestamp": start_ms + 15.0 }),
    );

    MockEvents {
        context_created,
        before_request_sent,
        response_completed,
        dom_content_loaded,
        load,
    }
}

pub fn event(method: &str, params: Value) -> Event {
    Event::new(method, params).expect("valid mock event")
}

/// Wire form of an event, as a BiDi remote end sends it
pub fn envelope(event: &Event) -> String {
    json!({ "type": "event", "method": event.method, "params": event.params }).to_string()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
