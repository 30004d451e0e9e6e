//! Captured requests and their parsed view.

use crate::http::body::HttpBody;
use crate::http::method::HttpMethod;
use crate::http::multimap::HttpMultiMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Request as handed over by the transport, before any matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRequest {
    pub method: HttpMethod,
    /// Absolute URL including the query string
    pub url: String,
    /// Header names are stored lowercased
    pub headers: HttpMultiMap,
    pub body: HttpBody,
}

impl CapturedRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HttpMultiMap::new(),
            body: HttpBody::Empty,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name.to_lowercase(), value);
        self
    }

    pub fn body(mut self, body: impl Into<HttpBody>) -> Self {
        let body = body.into();
        if let Some(content_type) = body.content_type() {
            if !self.headers.has("content-type") {
                self.headers.set("content-type", content_type);
            }
        }
        self.body = body;
        self
    }

    pub fn json(self, value: Value) -> Self {
        self.body(HttpBody::Json(value))
    }

    /// Set the body from raw bytes, materialized using the `content-type` header.
    pub fn raw_body(mut self, bytes: &[u8]) -> Self {
        self.body = HttpBody::parse(self.headers.get("content-type"), bytes);
        self
    }
}

/// Components of an absolute or relative URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts<'a> {
    /// Everything before the query string (and fragment)
    pub base: &'a str,
    pub path: &'a str,
    pub query: &'a str,
}

impl<'a> UrlParts<'a> {
    pub fn parse(url: &'a str) -> Self {
        let url = url.split('#').next().unwrap_or("");
        let (base, query) = url.split_once('?').unwrap_or((url, ""));

        let path = match base.find("://") {
            Some(scheme_end) => {
                let authority_start = scheme_end + 3;
                match base[authority_start..].find('/') {
                    Some(offset) => &base[authority_start + offset..],
                    None => "/",
                }
            }
            None => base,
        };

        Self { base, path, query }
    }
}

/// Parsed request passed to restrictions, response factories and recordings.
///
/// Exposes the typed parts only. The transport-level request stays reachable through
/// [`HttpRequest::raw`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub path: String,
    pub path_params: HashMap<String, String>,
    pub headers: HttpMultiMap,
    pub search_params: HttpMultiMap,
    pub body: HttpBody,
    raw: Arc<CapturedRequest>,
}

impl HttpRequest {
    pub fn parse(raw: Arc<CapturedRequest>, path_params: HashMap<String, String>) -> Self {
        let parts = UrlParts::parse(&raw.url);
        Self {
            method: raw.method,
            url: raw.url.clone(),
            path: parts.path.to_string(),
            search_params: HttpMultiMap::parse_query(parts.query),
            path_params,
            headers: raw.headers.with_lowercase_keys(),
            body: raw.body.clone(),
            raw,
        }
    }

    pub fn raw(&self) -> &CapturedRequest {
        &self.raw
    }

    /// JSON document used by `${...}` expressions.
    pub fn to_value(&self) -> Value {
        json!({
            "method": self.method.as_str(),
            "url": self.url,
            "path": self.path,
            "pathParams": self.path_params,
            "headers": self.headers.to_value(),
            "searchParams": self.search_params.to_value(),
            "body": self.body.to_value(),
        })
    }
}
