//! HAR 1.2 archive types produced by the recorder

use serde::{Deserialize, Serialize};

/// HAR format version written in every archive
pub const HAR_VERSION: &str = "1.2";

/// Root of an HTTP Archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Har {
    /// Archive log
    pub log: Log,
}

/// Archive log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// Format version, always [`HAR_VERSION`]
    pub version: String,
    /// Creator block
    pub creator: Creator,
    /// Browser block
    pub browser: Creator,
    /// Pages, in creation order
    pub pages: Vec<Page>,
    /// Entries, sorted by request start
    pub entries: Vec<Entry>,
}

/// Name/version pair used for `creator` and `browser`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    /// Name
    pub name: String,
    /// Version
    pub version: String,
}

/// A page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Page id referenced by entries
    pub id: String,
    /// Page title (its url)
    pub title: String,
    /// Navigation start
    pub started_date_time: String,
    /// Lifecycle timings relative to navigation start
    pub page_timings: PageTimings,
}

/// Page lifecycle timings, absent when the marker was never seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTimings {
    /// `DOMContentLoaded`, in ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_content_load: Option<f64>,
    /// `load`, in ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_load: Option<f64>,
}

/// A network entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Id of the page this entry belongs to
    pub pageref: String,
    /// Request start
    pub started_date_time: String,
    /// Total time, sum of all timing phases
    pub time: f64,
    /// Request block
    pub request: Request,
    /// Response block
    pub response: Response,
    /// Cache block (always empty)
    pub cache: Cache,
    /// Timing phases
    pub timings: Timings,
}

/// Request block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// HTTP method
    pub method: String,
    /// Request url
    pub url: String,
    /// HTTP version
    pub http_version: String,
    /// Cookies
    pub cookies: Vec<Cookie>,
    /// Headers
    pub headers: Vec<Header>,
    /// Decoded query string
    pub query_string: Vec<QueryParam>,
    /// Posted body, only for non-empty request bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
    /// Headers size, -1 if unknown
    pub headers_size: i64,
    /// Body size, -1 if unknown
    pub body_size: i64,
}

/// Response block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP status, -1 if unknown
    pub status: i64,
    /// HTTP status text, `?` if unknown
    pub status_text: String,
    /// HTTP version
    pub http_version: String,
    /// Cookies
    pub cookies: Vec<Cookie>,
    /// Headers
    pub headers: Vec<Header>,
    /// Body content
    pub content: Content,
    /// Redirect target
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    /// Headers size, -1 if unknown
    pub headers_size: i64,
    /// Bytes received, -1 if unknown
    pub body_size: i64,
}

/// Header, value omitted when it could not be expanded to text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,
    /// Header value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Cookie path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Cookie domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// `HttpOnly` flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// `Secure` flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

/// Query string parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    /// Decoded name
    pub name: String,
    /// Decoded value
    pub value: String,
}

/// Posted request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    /// Request content type
    pub mime_type: String,
    /// Form params (always empty)
    pub params: Vec<QueryParam>,
    /// Body text
    pub text: String,
    /// `""` for text, `"base64"` for encoded bytes
    pub encoding: String,
}

/// Response body content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Decoded size, -1 if unknown
    pub size: i64,
    /// Response mime type
    pub mime_type: String,
    /// Body text, empty when not collected
    pub text: String,
    /// `""` for text, `"base64"` for encoded bytes
    pub encoding: String,
}

/// Cache block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {}

/// Timing phases in milliseconds, each clamped to zero or more
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    /// Queueing time
    pub blocked: f64,
    /// DNS resolution
    pub dns: f64,
    /// TCP connection
    pub connect: f64,
    /// TLS handshake
    pub ssl: f64,
    /// Sending the request
    pub send: f64,
    /// Waiting for the first byte
    pub wait: f64,
    /// Receiving the response
    pub receive: f64,
}

impl Timings {
    /// Sum of all phases
    #[must_use]
    pub fn total(&self) -> f64 {
        self.blocked + self.dns + self.connect + self.ssl + self.send + self.wait + self.receive
    }
}

impl Har {
    /// Find a page by id
    #[must_use]
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.log.pages.iter().find(|page| page.id == id)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
