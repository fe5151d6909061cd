//! Conversion of a completed network entry into a HAR entry

use crate::config::HeaderValueFormatter;
use crate::event::{self, BytesKind, BytesValue, FetchTimings, HeaderValue};
use crate::har::{self, Cache, Content, Entry, PostData, QueryParam, Request, Response, Timings};
use crate::time::{iso_date_time, TimeNormalizer};
use url::{ParseError, Url};

use super::NetworkEntry;

pub(super) struct EntryBuilder<'a> {
    pub(super) time: &'a TimeNormalizer,
    pub(super) header_value_formatter: Option<&'a HeaderValueFormatter>,
    pub(super) debug_logs: bool,
}

impl EntryBuilder<'_> {
    /// Build the HAR entry for a network entry with a response.
    ///
    /// Returns the entry start time in milliseconds alongside the entry, or
    /// `None` if the entry has no response or no positive start time. The
    /// returned entry has an empty `pageref`.
    pub(super) fn build(&self, network_entry: &NetworkEntry) -> Option<(f64, Entry)> {
        let response = network_entry.response.as_ref()?;
        let request = &network_entry.request;

        let started_time = self.time.to_millis(request.timings.request_time);
        if started_time.is_nan() || started_time <= 0.0 {
            return None;
        }

        let http_version = response.protocol.clone().unwrap_or_else(|| "?".to_string());
        let body_data = network_entry.body_data.as_ref();

        let post_data = body_data
            .and_then(|body| body.request.as_ref())
            .filter(|body| !body.value.is_empty())
            .map(|body| PostData {
                mime_type: content_type(&request.headers).unwrap_or_default(),
                params: Vec::new(),
                text: body.value.clone(),
                encoding: encoding_name(body),
            });

        let (text, encoding) = body_data
            .and_then(|body| body.response.as_ref())
            .map(|body| (body.value.clone(), encoding_name(body)))
            .unwrap_or_default();

        let timings = self.timings(&request.timings);

        let entry = Entry {
            pageref: String::new(),
            started_date_time: iso_date_time(started_time),
            time: timings.total(),
            request: Request {
                method: request.method.clone(),
                url: request.url.clone(),
                http_version: http_version.clone(),
                cookies: self.cookies(&request.cookies),
                headers: self.headers(&request.headers),
                query_string: self.query_string(&request.url),
                post_data,
                headers_size: request.headers_size.unwrap_or(-1),
                body_size: request.body_size.unwrap_or(-1),
            },
            response: Response {
                status: response.status.filter(|status| *status != 0).unwrap_or(-1),
                status_text: response
                    .status_text
                    .clone()
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| "?".to_string()),
                http_version,
                cookies: Vec::new(),
                headers: self.headers(&response.headers),
                content: Content {
                    size: response.content.size.unwrap_or(-1),
                    mime_type: response
                        .mime_type
                        .clone()
                        .filter(|mime| !mime.is_empty())
                        .unwrap_or_else(|| "?".to_string()),
                    text,
                    encoding,
                },
                redirect_url: String::new(),
                headers_size: response.headers_size.unwrap_or(-1),
                body_size: response.bytes_received.unwrap_or(-1),
            },
            cache: Cache::default(),
            timings,
        };

        Some((started_time, entry))
    }

    /// Walk the fetch instants in order. A phase whose start marker is unset
    /// starts at the previous known instant.
    fn timings(&self, raw: &FetchTimings) -> Timings {
        let phase = |end: f64, start: f64| self.time.duration_to_millis(end - start).max(0.0);
        let known = |instant: f64, last: f64| if instant == 0.0 { last } else { instant };

        let mut last = raw.request_time;
        let blocked = phase(raw.dns_start, last);

        last = known(raw.dns_start, last);
        let dns = phase(raw.dns_end, last);

        last = known(raw.connect_start, last);
        let connect = phase(raw.connect_end, last);

        last = known(raw.tls_start, last);
        let ssl = phase(raw.tls_end, last);

        last = known(raw.tls_end, last);
        let send = phase(raw.request_start, last);

        last = known(raw.request_start, last);
        let wait = phase(raw.response_start, last);

        last = known(raw.response_start, last);
        let receive = phase(raw.response_end, last);

        Timings {
            blocked,
            dns,
            connect,
            ssl,
            send,
            wait,
            receive,
        }
    }

    fn format_value(&self, name: &str, value: &HeaderValue) -> Option<String> {
        let text = match value {
            HeaderValue::Text(text) => text,
            HeaderValue::Bytes(BytesValue {
                kind: BytesKind::String,
                value,
            }) => value,
            HeaderValue::Bytes(BytesValue {
                kind: BytesKind::Base64,
                ..
            }) => {
                warn_log!(self.debug_logs, %name, "Base64 header values are not supported");
                return None;
            }
        };

        Some(match self.header_value_formatter {
            Some(formatter) => formatter(name, text.as_str()),
            None => text.clone(),
        })
    }

    fn headers(&self, headers: &[event::Header]) -> Vec<har::Header> {
        headers
            .iter()
            .map(|header| har::Header {
                name: header.name.clone(),
                value: self.format_value(&header.name, &header.value),
            })
            .collect()
    }

    fn cookies(&self, cookies: &[event::Cookie]) -> Vec<har::Cookie> {
        cookies
            .iter()
            .map(|cookie| har::Cookie {
                name: cookie.name.clone(),
                value: self.format_value(&cookie.name, &cookie.value),
                path: cookie.path.clone(),
                domain: cookie.domain.clone(),
                http_only: cookie.http_only,
                secure: cookie.secure,
            })
            .collect()
    }

    fn query_string(&self, url: &str) -> Vec<QueryParam> {
        parse_query_string(url).unwrap_or_else(|e| {
            warn_log!(self.debug_logs, %url, "Failed to parse query string: {e}");
            Vec::new()
        })
    }
}

fn encoding_name(body: &BytesValue) -> String {
    match body.kind {
        BytesKind::String => String::new(),
        BytesKind::Base64 => "base64".to_string(),
    }
}

fn content_type(headers: &[event::Header]) -> Option<String> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("content-type"))
        .and_then(|header| match &header.value {
            HeaderValue::Text(text) => Some(text.clone()),
            HeaderValue::Bytes(BytesValue {
                kind: BytesKind::String,
                value,
            }) => Some(value.clone()),
            HeaderValue::Bytes(_) => None,
        })
}

/// Decode the query component of an absolute url into name/value pairs
fn parse_query_string(url: &str) -> Result<Vec<QueryParam>, ParseError> {
    let parsed = Url::parse(url)?;

    Ok(parsed
        .query_pairs()
        .map(|(name, value)| QueryParam {
            name: name.into_owned(),
            value: value.into_owned(),
        })
        .collect())
}
