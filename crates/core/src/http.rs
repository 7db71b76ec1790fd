//! Request and response values that flow through the worker.
//!
//! These are plain owned data: the worker never holds a live connection in
//! them, so they can be cloned into background tasks and persisted as-is.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    #[default]
    Empty,
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

/// An outgoing request as seen by the interception layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Build a request, uppercasing the method.
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            destination: Destination::Empty,
            mode: RequestMode::Cors,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Plain GET subresource request.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// Page navigation: mode `navigate`, destination `document`.
    pub fn navigate(url: Url) -> Self {
        Self { destination: Destination::Document, mode: RequestMode::Navigate, ..Self::get(url) }
    }

    /// Parse `url` and build a request for it.
    pub fn parse(method: &str, url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::new(method, url))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// A navigation loads a full document.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == Destination::Document
    }
}

/// A response, either fresh from the network or replayed from a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    /// A 200 `text/html` response.
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body).with_header("Content-Type", "text/html")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Case-insensitive header lookup; first value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every value of `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_navigation_detection() {
        assert!(Request::navigate(url("https://app.test/")).is_navigation());
        assert!(
            Request::get(url("https://app.test/"))
                .with_destination(Destination::Document)
                .is_navigation()
        );
        assert!(
            Request::get(url("https://app.test/"))
                .with_mode(RequestMode::Navigate)
                .is_navigation()
        );
        assert!(
            !Request::get(url("https://app.test/app.js"))
                .with_destination(Destination::Script)
                .is_navigation()
        );
    }

    #[test]
    fn test_method_uppercased() {
        let req = Request::parse("post", "https://app.test/auth").unwrap();
        assert_eq!(req.method, "POST");
    }

    #[test]
    fn test_parse_invalid_url() {
        assert!(matches!(Request::parse("GET", "not a url"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_header_replace_case_insensitive() {
        let mut resp = Response::new(200, "ok").with_header("cache-control", "max-age=60");
        resp.set_header("Cache-Control", "no-store");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.header("CACHE-CONTROL"), Some("no-store"));
    }

    #[test]
    fn test_destination_serde() {
        let d: Destination = serde_json::from_str("\"script\"").unwrap();
        assert_eq!(d, Destination::Script);
        let m: RequestMode = serde_json::from_str("\"no-cors\"").unwrap();
        assert_eq!(m, RequestMode::NoCors);
    }
}
