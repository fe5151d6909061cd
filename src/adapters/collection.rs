//! Batch exporter for pre-collected events
//!
//! Consumers that always listen for events and filter them afterwards can
//! hand the whole, possibly unsorted, collection to this exporter. Events
//! are sorted and replayed through a fresh [`HarRecorder`].

use std::cmp::Ordering;

use tracing::info;

use crate::config::{CollectionExporterConfig, HeaderValueFormatter};
use crate::event::{self, Event};
use crate::har::Har;
use crate::recorder::HarRecorder;
use crate::Result;

/// Replay order for events sharing a timestamp
pub const EVENT_ORDER: [&str; 5] = [
    event::BEFORE_REQUEST_SENT,
    event::CONTEXT_CREATED,
    event::DOM_CONTENT_LOADED,
    event::RESPONSE_COMPLETED,
    event::LOAD,
];

/// Exports a collection of events as a HAR
pub struct CollectionExporter {
    config: CollectionExporterConfig,
    header_value_formatter: Option<HeaderValueFormatter>,
    events: Vec<Event>,
}

impl CollectionExporter {
    /// Create an exporter for the given events
    #[must_use]
    pub fn new(config: CollectionExporterConfig, events: Vec<Event>) -> Self {
        Self {
            config,
            header_value_formatter: None,
            events,
        }
    }

    /// Install a hook applied to every exported header and cookie value
    #[must_use]
    pub fn with_header_value_formatter(mut self, formatter: HeaderValueFormatter) -> Self {
        self.header_value_formatter = Some(formatter);
        self
    }

    /// Sort and replay the events, then export the HAR
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or an event is malformed
    pub fn export(self, initial_page_url: Option<&str>, last_page_url: Option<&str>) -> Result<Har> {
        let Self {
            config,
            header_value_formatter,
            mut events,
        } = self;

        let mut recorder = HarRecorder::new(config.into())?;
        if let Some(formatter) = header_value_formatter {
            recorder = recorder.with_header_value_formatter(formatter);
        }

        sort_events(&mut events);
        info!(events = events.len(), "Replaying collected events");

        recorder.start(initial_page_url)?;
        for event in &events {
            recorder.record_event(event)?;
        }
        recorder.stop(last_page_url)
    }
}

/// Stable sort by timestamp, then by [`EVENT_ORDER`]. Events without a
/// timestamp come first; unknown methods come last on ties.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        let by_time = match (a.timestamp(), b.timestamp()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| precedence(&a.method).cmp(&precedence(&b.method)))
    });
}

fn precedence(method: &str) -> usize {
    EVENT_ORDER
        .iter()
        .position(|known| *known == method)
        .unwrap_or(EVENT_ORDER.len())
}
