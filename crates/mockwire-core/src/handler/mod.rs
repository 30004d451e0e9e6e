//! Request handlers: restrictions, response declarations and request accounting.
//!
//! A [`Handler`] is created by an interceptor for a method and path. It becomes eligible
//! to answer requests once a response is declared with [`Handler::respond`] or
//! [`Handler::respond_with`], and counts every request it served (or would have served
//! but for its [`RequestLimits`]).

pub mod remote;
mod times;

pub use times::{RequestLimits, TimesCheckError, UnmatchedRequestGroup};

use crate::http::{HttpMethod, HttpRequest, HttpResponse, ResponseDeclaration};
use crate::interceptor::{InterceptorClient, InterceptorError};
use crate::matching::{evaluate, Restriction, RestrictionDiff, RestrictionError, RestrictionMatch};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type ResponseFactory =
    Arc<dyn Fn(&HttpRequest) -> BoxFuture<'static, ResponseDeclaration> + Send + Sync>;

/// Source of the response declaration of a handler.
#[derive(Clone)]
pub enum ResponseSource {
    Static(ResponseDeclaration),
    Factory(ResponseFactory),
}

impl fmt::Debug for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSource::Static(declaration) => {
                f.debug_tuple("Static").field(declaration).finish()
            }
            ResponseSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Identity of a handler: method, path and registration sequence within its interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HandlerId {
    pub method: HttpMethod,
    pub path: String,
    pub sequence: u64,
}

/// Why a handler did not match a request.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchFailure {
    MissingResponseDeclaration,
    ExceededNumberOfRequests,
    UnmatchedRestrictions(RestrictionDiff),
}

/// Result of [`Handler::matches_request`].
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerMatch {
    Success,
    Failure(MatchFailure),
}

/// Request answered by a handler, together with the response it received.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

#[derive(Debug, Default)]
struct HandlerState {
    restrictions: Vec<Restriction>,
    response: Option<ResponseSource>,
    limits: RequestLimits,
    limits_declared_at: Option<&'static Location<'static>>,
    matched_count: usize,
    unmatched_groups: Vec<UnmatchedRequestGroup>,
    intercepted_requests: Vec<InterceptedRequest>,
}

struct HandlerInner {
    id: HandlerId,
    client: Weak<InterceptorClient>,
    state: Mutex<HandlerState>,
}

/// Declared rule pairing restrictions and a response with a method and path.
///
/// Cloning a handler yields another reference to the same rule.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerInner>,
}

/// Reference to a handler that does not keep it alive.
#[derive(Clone)]
pub(crate) struct WeakHandler(Weak<HandlerInner>);

impl WeakHandler {
    pub(crate) fn upgrade(&self) -> Option<Handler> {
        self.0.upgrade().map(|inner| Handler { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.inner.id)
            .field("state", &*self.state())
            .finish()
    }
}

impl Handler {
    pub(crate) fn new(id: HandlerId, client: Weak<InterceptorClient>) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                id,
                client,
                state: Mutex::new(HandlerState::default()),
            }),
        }
    }

    pub fn id(&self) -> &HandlerId {
        &self.inner.id
    }

    pub fn method(&self) -> HttpMethod {
        self.inner.id.method
    }

    pub fn path(&self) -> &str {
        &self.inner.id.path
    }

    pub(crate) fn downgrade(&self) -> WeakHandler {
        WeakHandler(Arc::downgrade(&self.inner))
    }

    pub(crate) fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> MutexGuard<'_, HandlerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Result<Arc<InterceptorClient>, InterceptorError> {
        self.inner.client.upgrade().ok_or(InterceptorError::Detached)
    }

    /// Add a restriction; all restrictions must pass for the handler to match.
    pub fn with(&self, restriction: impl Into<Restriction>) -> &Self {
        self.state().restrictions.push(restriction.into());
        self
    }

    /// Declare a static response and start a fresh accounting epoch.
    pub fn respond(
        &self,
        declaration: impl Into<ResponseDeclaration>,
    ) -> Result<&Self, InterceptorError> {
        self.set_response(ResponseSource::Static(declaration.into()))
    }

    /// Declare a response computed for every matched request.
    pub fn respond_with<F, Fut>(&self, factory: F) -> Result<&Self, InterceptorError>
    where
        F: Fn(&HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseDeclaration> + Send + 'static,
    {
        let factory: ResponseFactory =
            Arc::new(move |request: &HttpRequest| factory(request).boxed());
        self.set_response(ResponseSource::Factory(factory))
    }

    fn set_response(&self, source: ResponseSource) -> Result<&Self, InterceptorError> {
        let client = self.client()?;
        client.ensure_running()?;

        let discarded = {
            let mut state = self.state();
            state.response = Some(source);
            state.matched_count = 0;
            state.unmatched_groups.clear();
            std::mem::take(&mut state.intercepted_requests).len()
        };
        client.increment_number_of_saved_requests(-(discarded as isize));
        client.register_request_handler(self)?;

        Ok(self)
    }

    /// Expect exactly `count` requests.
    #[track_caller]
    pub fn times(&self, count: usize) -> &Self {
        self.set_limits(RequestLimits::exactly(count), Location::caller())
    }

    /// Expect between `min` and `max` requests, inclusive.
    #[track_caller]
    pub fn times_between(&self, min: usize, max: usize) -> &Self {
        self.set_limits(RequestLimits::between(min, max), Location::caller())
    }

    fn set_limits(&self, limits: RequestLimits, location: &'static Location<'static>) -> &Self {
        let mut state = self.state();
        state.limits = limits;
        state.limits_declared_at = Some(location);
        drop(state);
        self
    }

    pub fn limits(&self) -> RequestLimits {
        self.state().limits
    }

    pub fn matched_count(&self) -> usize {
        self.state().matched_count
    }

    pub fn has_response(&self) -> bool {
        self.state().response.is_some()
    }

    /// Check the handler against a request without changing any counter.
    pub async fn matches_request(
        &self,
        request: &HttpRequest,
    ) -> Result<HandlerMatch, RestrictionError> {
        let (restrictions, has_response) = {
            let state = self.state();
            (state.restrictions.clone(), state.response.is_some())
        };

        if !has_response {
            return Ok(HandlerMatch::Failure(
                MatchFailure::MissingResponseDeclaration,
            ));
        }

        for restriction in &restrictions {
            if let RestrictionMatch::Unmatched(diff) = evaluate(request, restriction).await? {
                return Ok(HandlerMatch::Failure(MatchFailure::UnmatchedRestrictions(
                    diff,
                )));
            }
        }

        let state = self.state();
        if state.matched_count < state.limits.max {
            Ok(HandlerMatch::Success)
        } else {
            Ok(HandlerMatch::Failure(MatchFailure::ExceededNumberOfRequests))
        }
    }

    /// Count a request as served if the handler is still eligible.
    ///
    /// The eligibility check and the increment happen under one lock, so concurrent
    /// dispatches never push the count past the limit.
    pub(crate) fn try_claim(&self) -> bool {
        let mut state = self.state();
        if state.response.is_some() && state.matched_count < state.limits.max {
            state.matched_count += 1;
            true
        } else {
            false
        }
    }

    /// Count a request the handler would have served if it were not exhausted.
    pub(crate) fn mark_matched(&self) {
        self.state().matched_count += 1;
    }

    pub(crate) fn record_unmatched(&self, request: &HttpRequest, diff: RestrictionDiff) {
        let saving = self
            .inner
            .client
            .upgrade()
            .is_some_and(|client| client.should_save_requests());
        if saving {
            self.state().unmatched_groups.push(UnmatchedRequestGroup {
                request: request.clone(),
                diff,
            });
        }
    }

    /// Produce the declaration for a matched request.
    pub async fn apply_response_declaration(
        &self,
        request: &HttpRequest,
    ) -> Result<ResponseDeclaration, InterceptorError> {
        let source = self.state().response.clone();
        match source {
            Some(ResponseSource::Static(declaration)) => Ok(declaration),
            Some(ResponseSource::Factory(factory)) => Ok(factory(request).await),
            None => Err(InterceptorError::NoResponseDeclaration {
                method: self.method(),
                path: self.path().to_string(),
            }),
        }
    }

    pub(crate) fn save_intercepted_request(&self, request: HttpRequest, response: HttpResponse) {
        self.state()
            .intercepted_requests
            .push(InterceptedRequest { request, response });
        if let Some(client) = self.inner.client.upgrade() {
            client.increment_number_of_saved_requests(1);
        }
    }

    /// Requests answered by this handler since the last `respond()` or `clear()`.
    pub fn requests(&self) -> Result<Vec<InterceptedRequest>, InterceptorError> {
        let client = self.client()?;
        if !client.should_save_requests() {
            return Err(InterceptorError::RequestSavingDisabled {
                base_url: client.base_url().to_string(),
            });
        }
        Ok(self.state().intercepted_requests.clone())
    }

    /// Verify that the number of served requests is within the declared limits.
    pub fn check_times(&self) -> Result<(), TimesCheckError> {
        let saving_enabled = self
            .inner
            .client
            .upgrade()
            .is_some_and(|client| client.should_save_requests());

        let state = self.state();
        if state.limits.contains(state.matched_count) {
            return Ok(());
        }

        Err(TimesCheckError {
            limits: state.limits,
            actual: state.matched_count,
            unmatched: if saving_enabled {
                state.unmatched_groups.clone()
            } else {
                Vec::new()
            },
            saving_enabled,
            declared_at: state.limits_declared_at,
        })
    }

    /// Reset the handler to its just-created state.
    ///
    /// The handler stays registered but answers nothing until a new response is declared.
    pub fn clear(&self) -> &Self {
        let discarded = std::mem::take(&mut *self.state()).intercepted_requests.len();
        if let Some(client) = self.inner.client.upgrade() {
            client.increment_number_of_saved_requests(-(discarded as isize));
        }
        self
    }
}
