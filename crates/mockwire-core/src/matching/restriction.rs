//! Request restrictions and their evaluation.
//!
//! A [`Restriction`] is either static (partial headers, search params and body compared
//! by containment or equality) or computed (an asynchronous predicate). Evaluating a
//! restriction yields either a match or a [`RestrictionDiff`] describing every
//! dimension that failed.

use crate::http::{HttpBody, HttpMultiMap, HttpRequest};
use crate::matching::expression::{match_with_jmespath, validate_expression};
use crate::matching::intersection::json_contains;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error raised while evaluating a computed restriction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RestrictionError {
    #[error("computed restriction failed: {0}")]
    Predicate(String),
    #[error("invalid expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },
}

pub type RequestPredicate =
    Arc<dyn Fn(&HttpRequest) -> BoxFuture<'static, Result<bool, RestrictionError>> + Send + Sync>;

/// Partial request description compared against intercepted requests.
///
/// Undeclared dimensions are ignored. With `exact` unset, declared dimensions use
/// containment; with `exact` set, they must be equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaticRestriction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HttpMultiMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_params: Option<HttpMultiMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<HttpBody>,
    pub exact: bool,
}

impl StaticRestriction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HttpMultiMap::new)
            .append(name.to_lowercase(), value);
        self
    }

    pub fn search_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.search_params
            .get_or_insert_with(HttpMultiMap::new)
            .append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json(self, value: Value) -> Self {
        self.body(HttpBody::Json(value))
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    fn evaluate(&self, request: &HttpRequest) -> RestrictionDiff {
        let mut diff = RestrictionDiff::default();

        if let Some(expected) = &self.headers {
            let expected = expected.with_lowercase_keys();
            let matches = if self.exact {
                request.headers.equals(&expected)
            } else {
                request.headers.contains(&expected)
            };
            if !matches {
                diff.headers = Some(DiffEntry::new(expected, request.headers.clone()));
            }
        }

        if let Some(expected) = &self.search_params {
            let matches = if self.exact {
                request.search_params.equals(expected)
            } else {
                request.search_params.contains(expected)
            };
            if !matches {
                diff.search_params =
                    Some(DiffEntry::new(expected.clone(), request.search_params.clone()));
            }
        }

        if let Some(expected) = &self.body {
            if !body_matches(&request.body, expected, self.exact) {
                diff.body = Some(DiffEntry::new(expected.clone(), request.body.clone()));
            }
        }

        diff
    }
}

fn body_matches(received: &HttpBody, expected: &HttpBody, exact: bool) -> bool {
    match (received, expected) {
        (HttpBody::Text(received), HttpBody::Text(expected)) => {
            if exact {
                received == expected
            } else {
                received.contains(expected.as_str())
            }
        }
        (HttpBody::Binary(received), HttpBody::Binary(expected)) => received == expected,
        (HttpBody::Form(received), HttpBody::Form(expected)) => {
            if exact {
                received.equals(expected)
            } else {
                received.contains(expected)
            }
        }
        (HttpBody::Json(received), HttpBody::Json(expected)) => {
            if exact {
                received == expected
            } else {
                json_contains(received, expected)
            }
        }
        (HttpBody::Empty, HttpBody::Empty) => true,
        _ => false,
    }
}

/// Asynchronous predicate over an intercepted request.
#[derive(Clone)]
pub struct ComputedRestriction {
    predicate: RequestPredicate,
    description: Option<String>,
}

impl ComputedRestriction {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Debug for ComputedRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedRestriction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Condition an intercepted request must satisfy for a handler to match.
#[derive(Debug, Clone)]
pub enum Restriction {
    Static(StaticRestriction),
    Computed(ComputedRestriction),
}

impl Restriction {
    /// Restriction from an asynchronous predicate.
    ///
    /// The predicate receives a borrowed request and must return an owned future, so
    /// anything the future needs is extracted before the `async` block.
    pub fn computed<F, Fut>(predicate: F) -> Self
    where
        F: Fn(&HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self::try_computed(move |request| predicate(request).map(Ok))
    }

    /// Restriction from a fallible asynchronous predicate.
    pub fn try_computed<F, Fut>(predicate: F) -> Self
    where
        F: Fn(&HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, RestrictionError>> + Send + 'static,
    {
        Restriction::Computed(ComputedRestriction {
            predicate: Arc::new(move |request: &HttpRequest| predicate(request).boxed()),
            description: None,
        })
    }

    /// Restriction from a synchronous predicate.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&HttpRequest) -> bool + Send + Sync + 'static,
    {
        Self::computed(move |request| futures::future::ready(predicate(request)))
    }

    /// Computed restriction from a JMESPath expression evaluated on the request document
    /// (`method`, `url`, `path`, `pathParams`, `headers`, `searchParams`, `body`).
    pub fn expression(expression: &str) -> Result<Self, RestrictionError> {
        validate_expression(expression).map_err(|reason| RestrictionError::InvalidExpression {
            expression: expression.to_string(),
            reason,
        })?;

        let owned = expression.to_string();
        let predicate: RequestPredicate = Arc::new(move |request: &HttpRequest| {
            let result = match_with_jmespath(&owned, &request.to_value())
                .map_err(RestrictionError::Predicate);
            futures::future::ready(result).boxed()
        });

        Ok(Restriction::Computed(ComputedRestriction {
            predicate,
            description: Some(format!("${{{expression}}}")),
        }))
    }
}

impl From<StaticRestriction> for Restriction {
    fn from(restriction: StaticRestriction) -> Self {
        Restriction::Static(restriction)
    }
}

/// Expected and received values of one mismatching dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry<T> {
    pub expected: T,
    pub received: T,
}

impl<T> DiffEntry<T> {
    pub fn new(expected: T, received: T) -> Self {
        Self { expected, received }
    }
}

/// Every failing dimension of a restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<DiffEntry<HttpMultiMap>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_params: Option<DiffEntry<HttpMultiMap>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<DiffEntry<HttpBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed: Option<DiffEntry<bool>>,
}

impl RestrictionDiff {
    pub fn is_empty(&self) -> bool {
        self.headers.is_none()
            && self.search_params.is_none()
            && self.body.is_none()
            && self.computed.is_none()
    }
}

/// Outcome of evaluating one restriction.
#[derive(Debug, Clone, PartialEq)]
pub enum RestrictionMatch {
    Matched,
    Unmatched(RestrictionDiff),
}

/// Evaluate a restriction against a request.
pub async fn evaluate(
    request: &HttpRequest,
    restriction: &Restriction,
) -> Result<RestrictionMatch, RestrictionError> {
    match restriction {
        Restriction::Static(restriction) => {
            let diff = restriction.evaluate(request);
            if diff.is_empty() {
                Ok(RestrictionMatch::Matched)
            } else {
                Ok(RestrictionMatch::Unmatched(diff))
            }
        }
        Restriction::Computed(computed) => {
            if (computed.predicate)(request).await? {
                Ok(RestrictionMatch::Matched)
            } else {
                Ok(RestrictionMatch::Unmatched(RestrictionDiff {
                    computed: Some(DiffEntry::new(true, false)),
                    ..RestrictionDiff::default()
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{CapturedRequest, HttpMethod};
    use rstest::rstest;
    use serde_json::json;
    use std::collections::HashMap;

    fn request(captured: CapturedRequest) -> HttpRequest {
        HttpRequest::parse(Arc::new(captured), HashMap::new())
    }

    fn get(url: &str) -> HttpRequest {
        request(CapturedRequest::new(HttpMethod::Get, url))
    }

    async fn matches(request: &HttpRequest, restriction: impl Into<Restriction>) -> bool {
        evaluate(request, &restriction.into())
            .await
            .expect("evaluation should not fail")
            == RestrictionMatch::Matched
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    #[tokio::test]
    async fn test_search_params_containment_vs_exact(#[case] exact: bool, #[case] expected: bool) {
        let request = get("http://localhost/users?name=User&other=param");
        let restriction = StaticRestriction {
            search_params: Some([("name", "User")].into_iter().collect()),
            exact,
            ..StaticRestriction::default()
        };
        assert_eq!(matches(&request, restriction).await, expected);
    }

    #[rstest]
    #[tokio::test]
    async fn test_headers_are_case_insensitive() {
        let request = request(
            CapturedRequest::new(HttpMethod::Get, "http://localhost/").header("X-Api-Key", "k"),
        );
        assert!(matches(&request, StaticRestriction::new().header("x-API-key", "k")).await);
        assert!(!matches(&request, StaticRestriction::new().header("x-api-key", "other")).await);
    }

    #[rstest]
    #[case(HttpBody::from("hello world"), HttpBody::from("world"), false, true)]
    #[case(HttpBody::from("hello world"), HttpBody::from("world"), true, false)]
    #[case(HttpBody::from("hello"), HttpBody::from("hello"), true, true)]
    #[case(HttpBody::Binary(vec![1, 2]), HttpBody::Binary(vec![1]), false, false)]
    #[case(HttpBody::Binary(vec![1, 2]), HttpBody::Binary(vec![1, 2]), false, true)]
    #[case(HttpBody::Json(json!({"name": "User", "extra": 1})), HttpBody::Json(json!({"name": "User"})), false, true)]
    #[case(HttpBody::Json(json!({"name": "User", "extra": 1})), HttpBody::Json(json!({"name": "User"})), true, false)]
    #[case(HttpBody::Json(json!({"name": "Other"})), HttpBody::Json(json!({"name": "User"})), false, false)]
    #[case(HttpBody::Json(json!("hello")), HttpBody::from("hello"), false, false)]
    #[case(
        HttpBody::Form([("a", "1"), ("b", "2")].into_iter().collect()),
        HttpBody::Form([("a", "1")].into_iter().collect()),
        false,
        true
    )]
    #[case(
        HttpBody::Form([("a", "1"), ("b", "2")].into_iter().collect()),
        HttpBody::Form([("a", "1")].into_iter().collect()),
        true,
        false
    )]
    #[tokio::test]
    async fn test_body_restrictions(
        #[case] received: HttpBody,
        #[case] expected: HttpBody,
        #[case] exact: bool,
        #[case] result: bool,
    ) {
        let request = request(CapturedRequest::new(HttpMethod::Post, "http://localhost/").body(received));
        let restriction = StaticRestriction {
            body: Some(expected),
            exact,
            ..StaticRestriction::default()
        };
        assert_eq!(matches(&request, restriction).await, result);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failing_dimensions_are_merged_into_one_diff() {
        let request = request(
            CapturedRequest::new(HttpMethod::Post, "http://localhost/users?page=2")
                .json(json!({"name": "Other"})),
        );
        let restriction: Restriction = StaticRestriction::new()
            .search_param("page", "1")
            .json(json!({"name": "User"}))
            .into();

        let RestrictionMatch::Unmatched(diff) = evaluate(&request, &restriction)
            .await
            .expect("evaluation should not fail")
        else {
            panic!("Expected a mismatch");
        };

        assert!(diff.headers.is_none());
        assert!(diff.computed.is_none());
        let search_params = diff.search_params.expect("search params diff");
        assert_eq!(search_params.received.get("page"), Some("2"));
        let body = diff.body.expect("body diff");
        assert_eq!(body.expected, HttpBody::Json(json!({"name": "User"})));
        assert_eq!(body.received, HttpBody::Json(json!({"name": "Other"})));
    }

    #[rstest]
    #[tokio::test]
    async fn test_computed_restriction() {
        let request = get("http://localhost/users?admin=true");
        let restriction = Restriction::computed(|request: &HttpRequest| {
            let is_admin = request.search_params.get("admin") == Some("true");
            async move { is_admin }
        });
        assert!(matches(&request, restriction.clone()).await);

        let other = get("http://localhost/users");
        assert_eq!(
            evaluate(&other, &restriction).await,
            Ok(RestrictionMatch::Unmatched(RestrictionDiff {
                computed: Some(DiffEntry::new(true, false)),
                ..RestrictionDiff::default()
            }))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_failing_computed_restriction_propagates() {
        let restriction = Restriction::try_computed(|_: &HttpRequest| {
            futures::future::ready(Err(RestrictionError::Predicate("boom".to_string())))
        });
        let result = evaluate(&get("http://localhost/"), &restriction).await;
        assert_eq!(result, Err(RestrictionError::Predicate("boom".to_string())));
    }

    #[rstest]
    #[case("body.name == 'User'", true)]
    #[case("searchParams.page == '1'", true)]
    #[case("method == 'GET'", false)]
    #[tokio::test]
    async fn test_expression_restriction(#[case] expression: &str, #[case] expected: bool) {
        let request = request(
            CapturedRequest::new(HttpMethod::Post, "http://localhost/users?page=1")
                .json(json!({"name": "User"})),
        );
        let restriction = Restriction::expression(expression).expect("valid expression");
        assert_eq!(matches(&request, restriction).await, expected);
    }

    #[rstest]
    fn test_invalid_expression_is_rejected() {
        assert!(matches!(
            Restriction::expression("[invalid"),
            Err(RestrictionError::InvalidExpression { .. })
        ));
    }
}
