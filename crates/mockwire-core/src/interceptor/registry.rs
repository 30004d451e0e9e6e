//! Handlers grouped by method and path, and the scan that picks one for a request.

use crate::handler::{Handler, HandlerMatch, MatchFailure};
use crate::http::{HttpMethod, HttpRequest};
use crate::matching::RestrictionError;
use std::collections::HashMap;
use tracing::debug;

type BucketKey = (HttpMethod, String);

/// Handlers of one interceptor, per (method, path), in registration order.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    buckets: HashMap<BucketKey, Vec<Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to its bucket unless it is already there.
    ///
    /// Returns `true` when the handler is the first one of its bucket.
    pub fn register(&mut self, handler: &Handler) -> bool {
        let bucket = self
            .buckets
            .entry((handler.method(), handler.path().to_string()))
            .or_default();

        if bucket.iter().any(|registered| registered.ptr_eq(handler)) {
            return false;
        }
        bucket.push(handler.clone());
        bucket.len() == 1
    }

    /// Snapshot of a bucket, oldest handler first.
    pub fn bucket(&self, method: HttpMethod, path: &str) -> Vec<Handler> {
        self.buckets
            .get(&(method, path.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove every bucket, returning the handlers they held.
    pub fn drain(&mut self) -> Vec<Handler> {
        self.buckets.drain().flat_map(|(_, bucket)| bucket).collect()
    }
}

/// Pick the handler that serves `request` from a bucket snapshot.
///
/// Handlers are scanned newest first. The first one that matches and can still claim a
/// request wins. When none does, the scan records restriction mismatches on their
/// handlers and counts the request against the first handler that failed for any other
/// reason, then stops.
pub async fn find_matching_handler(
    handlers: &[Handler],
    request: &HttpRequest,
) -> Result<Option<Handler>, RestrictionError> {
    let mut failures = Vec::with_capacity(handlers.len());

    for handler in handlers.iter().rev() {
        match handler.matches_request(request).await? {
            HandlerMatch::Success if handler.try_claim() => {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    handler = handler.id().sequence,
                    "request matched handler"
                );
                return Ok(Some(handler.clone()));
            }
            // Exhausted by a concurrent dispatch between the check and the claim
            HandlerMatch::Success => {
                failures.push((handler, MatchFailure::ExceededNumberOfRequests))
            }
            HandlerMatch::Failure(failure) => failures.push((handler, failure)),
        }
    }

    for (handler, failure) in failures {
        match failure {
            MatchFailure::UnmatchedRestrictions(diff) => handler.record_unmatched(request, diff),
            MatchFailure::MissingResponseDeclaration | MatchFailure::ExceededNumberOfRequests => {
                handler.mark_matched();
                break;
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestSavingOptions;
    use crate::http::{CapturedRequest, MockResponse};
    use crate::interceptor::client::InterceptorClient;
    use crate::interceptor::worker::InterceptorWorker;
    use crate::interceptor::{InterceptorMode, UnhandledDefaults};
    use crate::matching::StaticRestriction;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn client() -> Arc<InterceptorClient> {
        let worker = InterceptorWorker::new(UnhandledDefaults::default());
        let client = InterceptorClient::new(
            worker.allocate_interceptor_id(),
            "http://localhost:3000",
            InterceptorMode::Local,
            RequestSavingOptions {
                enabled: true,
                safe_limit: 100,
            },
            worker,
        );
        client.set_running(true);
        client
    }

    fn request() -> HttpRequest {
        let captured = CapturedRequest::new(HttpMethod::Get, "http://localhost:3000/users");
        HttpRequest::parse(Arc::new(captured), HashMap::new())
    }

    async fn dispatch(handlers: &[Handler]) -> Option<Handler> {
        find_matching_handler(handlers, &request())
            .await
            .expect("restrictions evaluate")
    }

    /// Handler that only accepts requests carrying `x-tenant: a`.
    fn restricted(client: &InterceptorClient) -> Handler {
        let handler = client
            .create_handler(HttpMethod::Get, "/users")
            .expect("running");
        handler
            .with(StaticRestriction::new().header("x-tenant", "a"))
            .respond(MockResponse::new(200))
            .expect("running")
            .times(1);
        handler
    }

    fn unmatched_count(handler: &Handler) -> usize {
        handler
            .check_times()
            .err()
            .map_or(0, |error| error.unmatched.len())
    }

    #[rstest]
    #[tokio::test]
    async fn test_newest_eligible_handler_claims_request() {
        let client = client();
        let older = client.create_handler(HttpMethod::Get, "/users").expect("running");
        older.respond(MockResponse::new(200)).expect("running");
        let newer = client.create_handler(HttpMethod::Get, "/users").expect("running");
        newer.respond(MockResponse::new(201)).expect("running");

        let matched = dispatch(&[older.clone(), newer.clone()]).await;

        assert!(matched.is_some_and(|handler| handler.ptr_eq(&newer)));
        assert_eq!(newer.matched_count(), 1);
        assert_eq!(older.matched_count(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_exhausted_newer_handler_stops_scan() {
        let client = client();
        let older = restricted(&client);
        let newer = client.create_handler(HttpMethod::Get, "/users").expect("running");
        newer.respond(MockResponse::new(201)).expect("running").times(1);
        let handlers = [older.clone(), newer.clone()];

        assert!(dispatch(&handlers).await.is_some());
        assert!(dispatch(&handlers).await.is_none());

        assert_eq!(newer.matched_count(), 2);
        assert_eq!(older.matched_count(), 0);
        assert_eq!(unmatched_count(&older), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_cleared_newer_handler_stops_scan() {
        let client = client();
        let older = restricted(&client);
        let newer = client.create_handler(HttpMethod::Get, "/users").expect("running");
        newer.respond(MockResponse::new(201)).expect("running");
        newer.clear();
        let handlers = [older.clone(), newer.clone()];

        assert!(dispatch(&handlers).await.is_none());

        assert_eq!(newer.matched_count(), 1);
        assert!(!newer.has_response());
        assert_eq!(unmatched_count(&older), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_unmatched_handlers_all_record_diagnostics() {
        let client = client();
        let older = restricted(&client);
        let newer = restricted(&client);
        let handlers = [older.clone(), newer.clone()];

        assert!(dispatch(&handlers).await.is_none());

        assert_eq!(older.matched_count(), 0);
        assert_eq!(newer.matched_count(), 0);
        assert_eq!(unmatched_count(&older), 1);
        assert_eq!(unmatched_count(&newer), 1);
    }

    #[rstest]
    fn test_register_reports_first_in_bucket() {
        let client = client();
        let first = client.create_handler(HttpMethod::Get, "/users").expect("running");
        let second = client.create_handler(HttpMethod::Get, "/users").expect("running");
        let other = client.create_handler(HttpMethod::Post, "/users").expect("running");

        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(&first));
        assert!(!registry.register(&first));
        assert!(!registry.register(&second));
        assert!(registry.register(&other));
        assert_eq!(registry.bucket(HttpMethod::Get, "/users").len(), 2);
        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
    }
}
