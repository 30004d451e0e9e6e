//! Expected number of requests per handler and the error reported when it is not met.

use crate::http::HttpRequest;
use crate::matching::RestrictionDiff;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::panic::Location;

/// Inclusive window `[min, max]` of requests a handler is expected to serve.
///
/// `max == usize::MAX` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLimits {
    pub min: usize,
    pub max: usize,
}

impl RequestLimits {
    pub fn exactly(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max == usize::MAX
    }

    pub fn contains(&self, count: usize) -> bool {
        self.min <= count && count <= self.max
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
        }
    }
}

fn pluralize(count: usize) -> &'static str {
    if count == 1 {
        "request"
    } else {
        "requests"
    }
}

impl fmt::Display for RequestLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "exactly {} {}", self.min, pluralize(self.min))
        } else if self.is_unbounded() {
            write!(f, "at least {} {}", self.min, pluralize(self.min))
        } else {
            write!(
                f,
                "at least {} and at most {} {}",
                self.min,
                self.max,
                pluralize(self.max)
            )
        }
    }
}

/// Request evaluated by a handler whose restrictions did not match it.
#[derive(Debug, Clone)]
pub struct UnmatchedRequestGroup {
    pub request: HttpRequest,
    pub diff: RestrictionDiff,
}

/// A handler served a number of requests outside its expected window.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", self.render())]
pub struct TimesCheckError {
    pub limits: RequestLimits,
    pub actual: usize,
    /// Requests rejected by the handler's restrictions; empty unless request saving is enabled
    pub unmatched: Vec<UnmatchedRequestGroup>,
    pub saving_enabled: bool,
    /// Where `times()` was called
    pub declared_at: Option<&'static Location<'static>>,
}

impl TimesCheckError {
    fn render(&self) -> String {
        let mut message = format!("Expected {}, but got {}.", self.limits, self.actual);

        if self.saving_enabled {
            if !self.unmatched.is_empty() {
                message.push_str("\n\nRequests evaluated by this handler:\n");
                message.push_str("\n  - Expected\n  + Received\n");
                for (index, group) in self.unmatched.iter().enumerate() {
                    render_group(&mut message, index + 1, group);
                }
            }
        } else {
            message.push_str(
                "\n\nEnable request saving on the interceptor to see the requests \
                 evaluated by this handler.",
            );
        }

        if let Some(location) = self.declared_at {
            let _ = write!(message, "\n\nDeclared at {location}");
        }

        message
    }
}

fn render_group(message: &mut String, index: usize, group: &UnmatchedRequestGroup) {
    let _ = write!(
        message,
        "\n{index}: {} {}",
        group.request.method, group.request.url
    );

    let diff = &group.diff;
    if let Some(computed) = &diff.computed {
        render_entry(message, "Computed", &computed.expected, &computed.received);
    }
    if let Some(headers) = &diff.headers {
        render_entry(message, "Headers", &headers.expected, &headers.received);
    }
    if let Some(search_params) = &diff.search_params {
        render_entry(
            message,
            "Search params",
            &search_params.expected,
            &search_params.received,
        );
    }
    if let Some(body) = &diff.body {
        render_entry(message, "Body", &body.expected, &body.received);
    }
}

fn render_entry<T: Serialize>(message: &mut String, label: &str, expected: &T, received: &T) {
    let expected = serde_json::to_string(expected).unwrap_or_default();
    let received = serde_json::to_string(received).unwrap_or_default();
    let _ = write!(
        message,
        "\n     {label}:\n       - {expected}\n       + {received}"
    );
}
