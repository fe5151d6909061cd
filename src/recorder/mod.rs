//! HAR recorder: a small state machine fed with protocol events
//!
//! The recorder keeps two working tables while recording: network entries
//! keyed by `(request id, redirect count)` and page timing markers for
//! top-level browsing contexts. Stopping reduces both tables into a
//! [`Har`](crate::har::Har) and clears them.

mod entry;
mod export;

use std::collections::{HashMap, HashSet};

use crate::config::{HeaderValueFormatter, RecorderConfig};
use crate::event::{
    self, BeforeRequestSentParams, BodyData, ContextCreatedParams, Event, NavigationParams,
    RequestData, ResponseCompletedParams, ResponseData,
};
use crate::har::Har;
use crate::time::{round_tenth, TimeNormalizer};
use crate::{HarError, Result};

/// Title used for synthesized pages when the caller gave no url
pub const UNKNOWN_PAGE_TITLE: &str = "[unknown page]";

/// Recorder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Created, never started
    Idle,
    /// Accepting events
    Recording,
    /// Stopped, may be started again
    Stopped,
}

/// Page lifecycle marker type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    DomContentLoaded,
    Load,
}

/// One request/response exchange
#[derive(Debug, Clone)]
pub(crate) struct NetworkEntry {
    pub(crate) context_id: Option<String>,
    pub(crate) request_id: String,
    pub(crate) redirect_count: u32,
    pub(crate) url: String,
    pub(crate) request: RequestData,
    pub(crate) response: Option<ResponseData>,
    pub(crate) body_data: Option<BodyData>,
    pub(crate) is_first_request: bool,
}

/// A lifecycle marker for a top-level context
#[derive(Debug, Clone)]
pub(crate) struct PageTiming {
    pub(crate) context_id: String,
    pub(crate) kind: MarkerKind,
    pub(crate) started_time: f64,
    pub(crate) relative_time: f64,
    pub(crate) url: String,
}

/// Working tables of one recording session
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) network_entries: Vec<NetworkEntry>,
    entry_index: HashMap<(String, u32), usize>,
    pub(crate) page_timings: Vec<PageTiming>,
    top_level_contexts: HashSet<String>,
    pub(crate) initial_page_url: Option<String>,
    pub(crate) time: TimeNormalizer,
}

impl Session {
    fn new(initial_page_url: Option<String>, time: TimeNormalizer) -> Self {
        Self {
            initial_page_url,
            time,
            ..Self::default()
        }
    }

    fn entry_mut(&mut self, request_id: &str, redirect_count: u32) -> Option<&mut NetworkEntry> {
        let index = *self
            .entry_index
            .get(&(request_id.to_string(), redirect_count))?;
        self.network_entries.get_mut(index)
    }
}

/// Records protocol events and exports them as a HAR
pub struct HarRecorder {
    config: RecorderConfig,
    header_value_formatter: Option<HeaderValueFormatter>,
    reference_time_ms: Option<f64>,
    state: RecorderState,
    session: Session,
}

impl std::fmt::Debug for HarRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarRecorder")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("network_entries", &self.session.network_entries.len())
            .field("page_timings", &self.session.page_timings.len())
            .finish_non_exhaustive()
    }
}

impl HarRecorder {
    /// Create a new recorder
    ///
    /// # Errors
    ///
    /// Returns error if the browser name or version is missing
    pub fn new(config: RecorderConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            header_value_formatter: None,
            reference_time_ms: None,
            state: RecorderState::Idle,
            session: Session::default(),
        })
    }

    /// Install a hook applied to every exported header and cookie value
    #[must_use]
    pub fn with_header_value_formatter(mut self, formatter: HeaderValueFormatter) -> Self {
        self.header_value_formatter = Some(formatter);
        self
    }

    /// Compare raw timings against a fixed wall-clock time (ms) instead of
    /// the current time when inferring their unit
    #[must_use]
    pub fn with_reference_time(mut self, reference_time_ms: f64) -> Self {
        self.reference_time_ms = Some(reference_time_ms);
        self
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Check if the recorder accepts events
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Start a new recording session
    ///
    /// `initial_page_url` titles the page synthesized for entries recorded
    /// before the first navigation.
    ///
    /// # Errors
    ///
    /// Returns error if already recording
    pub fn start(&mut self, initial_page_url: Option<&str>) -> Result<()> {
        if self.is_recording() {
            return Err(HarError::State("HAR recording already started".to_string()));
        }

        debug_log!(self.config.debug_logs, "Start recording");
        let time = match self.reference_time_ms {
            Some(reference) => TimeNormalizer::with_reference(reference),
            None => TimeNormalizer::new(),
        };
        self.session = Session::new(initial_page_url.map(str::to_string), time);
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Stop recording and export the HAR
    ///
    /// `last_page_url` titles the page synthesized when no navigation was
    /// recorded at all.
    ///
    /// # Errors
    ///
    /// Returns error if not recording
    pub fn stop(&mut self, last_page_url: Option<&str>) -> Result<Har> {
        if !self.is_recording() {
            return Err(HarError::State("HAR recording not started".to_string()));
        }

        debug_log!(self.config.debug_logs, "Stop recording");
        let session = std::mem::take(&mut self.session);
        self.state = RecorderState::Stopped;

        let exporter = export::Exporter {
            config: &self.config,
            header_value_formatter: self.header_value_formatter.as_ref(),
            last_page_url,
        };
        Ok(exporter.export(&session))
    }

    /// Record a protocol event
    ///
    /// Unknown methods are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if not recording or if the event is malformed
    pub fn record_event(&mut self, event: &Event) -> Result<()> {
        if !self.is_recording() {
            return Err(HarError::State("HAR recording not started".to_string()));
        }

        if event.method.is_empty() {
            return Err(HarError::Validation(
                "recordEvent expects an event with method and params".to_string(),
            ));
        }

        match event.method.as_str() {
            event::BEFORE_REQUEST_SENT => self.on_before_request_sent(event.decode_params()?),
            event::RESPONSE_COMPLETED => self.on_response_completed(event.decode_params()?),
            event::CONTEXT_CREATED => self.on_context_created(event.decode_params()?),
            event::DOM_CONTENT_LOADED => {
                self.on_navigation_marker(MarkerKind::DomContentLoaded, event.decode_params()?);
            }
            event::LOAD => self.on_navigation_marker(MarkerKind::Load, event.decode_params()?),
            other => debug_log!(self.config.debug_logs, method = other, "Ignoring event"),
        }

        Ok(())
    }

    /// Attach bodies fetched out-of-band to the entry of an already
    /// recorded request
    ///
    /// Returns `false` if no entry matches `(request_id, redirect_count)`.
    ///
    /// # Errors
    ///
    /// Returns error if not recording
    pub fn attach_body_data(
        &mut self,
        request_id: &str,
        redirect_count: u32,
        body_data: BodyData,
    ) -> Result<bool> {
        if !self.is_recording() {
            return Err(HarError::State("HAR recording not started".to_string()));
        }

        match self.session.entry_mut(request_id, redirect_count) {
            Some(entry) => {
                entry.body_data = Some(body_data);
                Ok(true)
            }
            None => {
                warn_log!(
                    self.config.debug_logs,
                    %request_id,
                    redirect_count,
                    "No matching entry found for body data"
                );
                Ok(false)
            }
        }
    }

    fn on_before_request_sent(&mut self, params: BeforeRequestSentParams) {
        let url = params.request.url.clone();
        let request_id = params.request.request.clone();
        if is_data_url(&url) {
            debug_log!(self.config.debug_logs, %request_id, "Ignoring data url request");
            return;
        }

        debug_log!(
            self.config.debug_logs,
            %url,
            %request_id,
            redirect_count = params.redirect_count,
            "Event beforeRequestSent"
        );

        let entry = NetworkEntry {
            context_id: params.context,
            request_id: request_id.clone(),
            redirect_count: params.redirect_count,
            url,
            request: params.request,
            response: None,
            body_data: None,
            is_first_request: false,
        };

        let key = (request_id, params.redirect_count);
        let session = &mut self.session;
        match session.entry_index.get(&key) {
            Some(&index) => session.network_entries[index] = entry,
            None => {
                session.entry_index.insert(key, session.network_entries.len());
                session.network_entries.push(entry);
            }
        }
    }

    fn on_response_completed(&mut self, params: ResponseCompletedParams) {
        let url = params.request.url.clone();
        if is_data_url(&url) {
            debug_log!(self.config.debug_logs, "Ignoring data url response");
            return;
        }

        let request_id = params.request.request.clone();
        debug_log!(
            self.config.debug_logs,
            %url,
            %request_id,
            redirect_count = params.redirect_count,
            "Event responseCompleted"
        );

        match self.session.entry_mut(&request_id, params.redirect_count) {
            Some(entry) => {
                entry.request = params.request;
                entry.response = Some(params.response);
                if params.body_data.is_some() {
                    entry.body_data = params.body_data;
                }
            }
            None => warn_log!(
                self.config.debug_logs,
                %url,
                %request_id,
                "No matching entry found for response"
            ),
        }
    }

    fn on_context_created(&mut self, params: ContextCreatedParams) {
        if params.parent.is_none() {
            debug_log!(self.config.debug_logs, context = %params.context, "Top-level context created");
            self.session.top_level_contexts.insert(params.context);
        }
    }

    fn on_navigation_marker(&mut self, kind: MarkerKind, params: NavigationParams) {
        let NavigationParams {
            context,
            url,
            timestamp,
        } = params;
        let debug = self.config.debug_logs;

        if !self.session.top_level_contexts.contains(&context) {
            debug_log!(debug, %context, %url, ?kind, "Ignoring marker for non top-level context");
            return;
        }

        let (started_time, url) = match kind {
            MarkerKind::Load => {
                let previous = self
                    .session
                    .page_timings
                    .iter()
                    .rev()
                    .find(|timing| timing.context_id == context);

                match previous {
                    Some(timing) if timing.kind == MarkerKind::DomContentLoaded => {
                        (timing.started_time, timing.url.clone())
                    }
                    _ => {
                        warn_log!(debug, %context, %url, "domContentLoaded not found for load");
                        return;
                    }
                }
            }
            MarkerKind::DomContentLoaded => match self.resolve_first_request(&context, &url) {
                Some(started_time) => (started_time, url),
                None => {
                    warn_log!(debug, %context, %url, "No request found for domContentLoaded, bailing out");
                    return;
                }
            },
        };

        let relative_time = round_tenth(timestamp - started_time);
        debug_log!(debug, %context, %url, ?kind, timestamp, relative_time, "Page timing recorded");

        self.session.page_timings.push(PageTiming {
            context_id: context,
            kind,
            started_time,
            relative_time,
            url,
        });
    }

    /// Find the request that started the navigation to `url` in `context`
    /// and return its start time in milliseconds.
    fn resolve_first_request(&mut self, context: &str, url: &str) -> Option<f64> {
        let debug = self.config.debug_logs;
        let session = &mut self.session;
        let in_context = |entry: &NetworkEntry| entry.context_id.as_deref() == Some(context);

        let mut index = session
            .network_entries
            .iter()
            .rposition(|entry| in_context(entry) && entry.request.url == url);

        if let Some(found) = index {
            let entry = &session.network_entries[found];
            if entry.redirect_count > 0 {
                if let Some(&original) = session.entry_index.get(&(entry.request_id.clone(), 0)) {
                    index = Some(original);
                }
            }
        } else {
            debug_log!(debug, %context, %url, "No request matches url, falling back to html responses");
            index = session.network_entries.iter().rposition(|entry| {
                in_context(entry)
                    && entry
                        .response
                        .as_ref()
                        .and_then(|response| response.mime_type.as_deref())
                        .is_some_and(|mime| mime.starts_with("text/html"))
            });
        }

        let entry = session.network_entries.get_mut(index?)?;
        entry.is_first_request = true;
        Some(session.time.to_millis(entry.request.timings.request_time))
    }
}

fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}
