//! Reduction of the working tables into a HAR

use crate::config::{HeaderValueFormatter, RecorderConfig};
use crate::har::{self, Creator, Har, Log, Page, PageTimings, HAR_VERSION};
use crate::time::iso_date_time;

use super::entry::EntryBuilder;
use super::{MarkerKind, PageTiming, Session, UNKNOWN_PAGE_TITLE};

/// Id of the page synthesized for entries recorded before any page started
const LEADING_PAGE_ID: &str = "page_0";

/// Page under construction
#[derive(Debug)]
struct PageDraft {
    id: String,
    title: String,
    started_time: f64,
    url: Option<String>,
    dom_content_loaded: Option<f64>,
    load: Option<f64>,
}

impl PageDraft {
    fn synthesized(id: &str, title: Option<&str>, started_time: f64) -> Self {
        Self {
            id: id.to_string(),
            title: title.unwrap_or(UNKNOWN_PAGE_TITLE).to_string(),
            started_time,
            url: None,
            dom_content_loaded: None,
            load: None,
        }
    }

    fn timing(&self, kind: MarkerKind) -> Option<f64> {
        match kind {
            MarkerKind::DomContentLoaded => self.dom_content_loaded,
            MarkerKind::Load => self.load,
        }
    }

    fn set_timing(&mut self, kind: MarkerKind, value: f64) {
        match kind {
            MarkerKind::DomContentLoaded => self.dom_content_loaded = Some(value),
            MarkerKind::Load => self.load = Some(value),
        }
    }

    fn finish(self) -> Page {
        Page {
            id: self.id,
            title: self.title,
            started_date_time: iso_date_time(self.started_time),
            page_timings: PageTimings {
                on_content_load: self.dom_content_loaded,
                on_load: self.load,
            },
        }
    }
}

pub(super) struct Exporter<'a> {
    pub(super) config: &'a RecorderConfig,
    pub(super) header_value_formatter: Option<&'a HeaderValueFormatter>,
    pub(super) last_page_url: Option<&'a str>,
}

impl Exporter<'_> {
    pub(super) fn export(&self, session: &Session) -> Har {
        let debug = self.config.debug_logs;
        debug_log!(debug, "Building HAR");

        let mut pages = build_pages(&session.page_timings, debug);

        if pages.is_empty() {
            if let Some(first) = session.network_entries.first() {
                let started_time = session.time.to_millis(first.request.timings.request_time);
                debug_log!(debug, "No page timings, creating a single page");
                pages.push(PageDraft::synthesized("page_1", self.last_page_url, started_time));
            }
        }

        let builder = EntryBuilder {
            time: &session.time,
            header_value_formatter: self.header_value_formatter,
            debug_logs: debug,
        };

        let mut entries = Vec::with_capacity(session.network_entries.len());
        for network_entry in &session.network_entries {
            if network_entry.response.is_none() {
                warn_log!(
                    debug,
                    url = %network_entry.url,
                    request_id = %network_entry.request_id,
                    "Ignoring entry without response"
                );
                continue;
            }

            let Some((started_time, mut entry)) = builder.build(network_entry) else {
                warn_log!(debug, url = %network_entry.url, "Ignoring entry without start time");
                continue;
            };

            entry.pageref = match pages.iter().rev().find(|page| page.started_time <= started_time) {
                Some(page) => page.id.clone(),
                None => {
                    attach_to_leading_page(&mut pages, session, started_time);
                    LEADING_PAGE_ID.to_string()
                }
            };

            debug_log!(
                debug,
                url = %network_entry.url,
                pageref = %entry.pageref,
                first_request = network_entry.is_first_request,
                "Network entry attached to page"
            );
            entries.push((started_time, entry));
        }

        entries.sort_by(|(a, _), (b, _)| a.total_cmp(b));

        let browser = Creator {
            name: self.config.browser.clone(),
            version: self.config.version.clone(),
        };

        Har {
            log: Log {
                version: HAR_VERSION.to_string(),
                creator: browser.clone(),
                browser,
                pages: pages.into_iter().map(PageDraft::finish).collect(),
                entries: entries.into_iter().map(|(_, entry)| entry).collect::<Vec<har::Entry>>(),
            },
        }
    }
}

/// Group timings into pages: a timing joins the first page with the same
/// url that does not have this marker yet, otherwise it opens a new page.
fn build_pages(page_timings: &[PageTiming], debug: bool) -> Vec<PageDraft> {
    let mut pages: Vec<PageDraft> = Vec::new();

    for timing in page_timings {
        let existing = pages.iter_mut().position(|page| {
            page.url.as_deref() == Some(timing.url.as_str()) && page.timing(timing.kind).is_none()
        });

        let index = match existing {
            Some(index) => index,
            None => {
                let id = format!("page_{}", pages.len() + 1);
                debug_log!(debug, url = %timing.url, %id, "Create page entry");
                pages.push(PageDraft {
                    id,
                    title: timing.url.clone(),
                    started_time: timing.started_time,
                    url: Some(timing.url.clone()),
                    dom_content_loaded: None,
                    load: None,
                });
                pages.len() - 1
            }
        };

        pages[index].set_timing(timing.kind, timing.relative_time);
    }

    pages
}

fn attach_to_leading_page(pages: &mut Vec<PageDraft>, session: &Session, started_time: f64) {
    match pages.iter_mut().find(|page| page.id == LEADING_PAGE_ID) {
        Some(page) => page.started_time = page.started_time.min(started_time),
        None => pages.insert(
            0,
            PageDraft::synthesized(
                LEADING_PAGE_ID,
                session.initial_page_url.as_deref(),
                started_time,
            ),
        ),
    }
}
