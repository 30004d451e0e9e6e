//! Response declarations and synthesized responses.

use crate::http::body::HttpBody;
use crate::http::method::HttpMethod;
use crate::http::multimap::HttpMultiMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_status() -> u16 {
    200
}

/// Mocked response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    /// HTTP status code for the response (100-599)
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "HttpMultiMap::is_empty")]
    pub headers: HttpMultiMap,
    #[serde(default, skip_serializing_if = "HttpBody::is_empty")]
    pub body: HttpBody,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HttpMultiMap::new(),
            body: HttpBody::Empty,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name.to_lowercase(), value);
        self
    }

    pub fn body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(self, value: Value) -> Self {
        self.body(HttpBody::Json(value))
    }
}

/// What to do with a request instead of answering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseAction {
    /// Let the original request reach the network
    Bypass,
    /// Fail the request with a network error
    Reject,
}

/// Declared outcome of a handler: a mocked response or an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseDeclaration {
    Action { action: ResponseAction },
    Response(MockResponse),
}

impl ResponseDeclaration {
    pub fn bypass() -> Self {
        ResponseDeclaration::Action {
            action: ResponseAction::Bypass,
        }
    }

    pub fn reject() -> Self {
        ResponseDeclaration::Action {
            action: ResponseAction::Reject,
        }
    }
}

impl From<MockResponse> for ResponseDeclaration {
    fn from(response: MockResponse) -> Self {
        ResponseDeclaration::Response(response)
    }
}

impl From<ResponseAction> for ResponseDeclaration {
    fn from(action: ResponseAction) -> Self {
        ResponseDeclaration::Action { action }
    }
}

/// Response produced for an intercepted request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpMultiMap,
    pub body: HttpBody,
}

impl HttpResponse {
    /// Build the response for `method` from a declaration.
    ///
    /// `HEAD` requests and `204` responses never carry a body.
    pub fn synthesize(method: HttpMethod, declaration: &MockResponse) -> Self {
        let mut headers = declaration.headers.with_lowercase_keys();
        let body = if method == HttpMethod::Head || declaration.status == 204 {
            HttpBody::Empty
        } else {
            declaration.body.clone()
        };

        if let Some(content_type) = body.content_type() {
            if !headers.has("content-type") {
                headers.set("content-type", content_type);
            }
        }

        Self {
            status: declaration.status,
            headers,
            body,
        }
    }
}
