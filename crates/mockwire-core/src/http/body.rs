//! Request and response bodies, materialized per content type.

use crate::http::multimap::HttpMultiMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// HTTP body already parsed according to its content type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HttpBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
    /// `application/x-www-form-urlencoded` (or equivalent structured form) data
    Form(HttpMultiMap),
}

/// Discriminant of [`HttpBody`] without its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Json,
    Text,
    Binary,
    Form,
}

impl HttpBody {
    /// Materialize raw bytes according to a `Content-Type` header value.
    ///
    /// JSON that fails to parse is kept as text. Non-UTF-8 content is binary.
    pub fn parse(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return HttpBody::Empty;
        }

        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if mime == "application/json" || mime.ends_with("+json") {
            if let Ok(value) = serde_json::from_slice(bytes) {
                return HttpBody::Json(value);
            }
        }

        match std::str::from_utf8(bytes) {
            Ok(text) if mime == "application/x-www-form-urlencoded" => {
                HttpBody::Form(HttpMultiMap::parse_query(text))
            }
            Ok(text) if mime.is_empty() || mime.starts_with("text/") || mime.contains("json") => {
                HttpBody::Text(text.to_string())
            }
            Ok(text) if mime.ends_with("+xml") || mime == "application/xml" => {
                HttpBody::Text(text.to_string())
            }
            _ => HttpBody::Binary(bytes.to_vec()),
        }
    }

    pub fn kind(&self) -> BodyKind {
        match self {
            HttpBody::Empty => BodyKind::Empty,
            HttpBody::Json(_) => BodyKind::Json,
            HttpBody::Text(_) => BodyKind::Text,
            HttpBody::Binary(_) => BodyKind::Binary,
            HttpBody::Form(_) => BodyKind::Form,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, HttpBody::Empty)
    }

    /// Default `Content-Type` for a synthesized response carrying this body.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            HttpBody::Empty => None,
            HttpBody::Json(_) => Some("application/json"),
            HttpBody::Text(_) => Some("text/plain;charset=UTF-8"),
            HttpBody::Binary(_) => Some("application/octet-stream"),
            HttpBody::Form(_) => Some("application/x-www-form-urlencoded"),
        }
    }

    /// JSON view used by expressions and diagnostics.
    pub fn to_value(&self) -> Value {
        match self {
            HttpBody::Empty => Value::Null,
            HttpBody::Json(value) => value.clone(),
            HttpBody::Text(text) => Value::String(text.clone()),
            HttpBody::Binary(bytes) => Value::String(format!("<binary: {} bytes>", bytes.len())),
            HttpBody::Form(form) => form.to_value(),
        }
    }
}

impl From<Value> for HttpBody {
    fn from(value: Value) -> Self {
        HttpBody::Json(value)
    }
}

impl From<&str> for HttpBody {
    fn from(text: &str) -> Self {
        HttpBody::Text(text.to_string())
    }
}

impl From<String> for HttpBody {
    fn from(text: String) -> Self {
        HttpBody::Text(text)
    }
}

impl From<Vec<u8>> for HttpBody {
    fn from(bytes: Vec<u8>) -> Self {
        HttpBody::Binary(bytes)
    }
}

impl From<HttpMultiMap> for HttpBody {
    fn from(form: HttpMultiMap) -> Self {
        HttpBody::Form(form)
    }
}

impl Serialize for HttpBody {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// Strings deserialize as text, `null` as empty, anything else as JSON.
impl<'de> Deserialize<'de> for HttpBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => HttpBody::Empty,
            Value::String(text) => HttpBody::Text(text),
            other => HttpBody::Json(other),
        })
    }
}
