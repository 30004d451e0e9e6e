//! In-process transport that routes captured requests to interceptor handlers.

use crate::http::{CapturedRequest, HttpMethod, HttpRequest, HttpResponse, ResponseAction};
use crate::interceptor::unhandled::{
    find_owner, UnhandledDefaults, UnhandledRequestResolver, UnhandledRequestStrategy,
    UnhandledSource,
};
use crate::interceptor::{InterceptorError, InterceptorId, InterceptorMode};
use crate::matching::url_matches;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// What a dispatch callback produced for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResponse {
    Response(HttpResponse),
    Action(ResponseAction),
}

pub type DispatchCallback = Arc<
    dyn Fn(Arc<CapturedRequest>) -> BoxFuture<'static, Result<Option<HandlerResponse>, InterceptorError>>
        + Send
        + Sync,
>;

/// Transport-level subscription point used by interceptors.
pub trait TransportHook: Send + Sync {
    /// Route requests with `method` whose URL matches `url_pattern` to `callback`.
    fn use_handler(
        &self,
        interceptor: InterceptorId,
        method: HttpMethod,
        url_pattern: String,
        callback: DispatchCallback,
    );

    fn clear_handlers(&self);

    fn clear_interceptor_handlers(&self, interceptor: InterceptorId);
}

/// Whether a handler or the unhandled-request strategy decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrigin {
    Declared,
    Unhandled(UnhandledSource),
}

/// Result of [`InterceptorWorker::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A handler answered with a mocked response
    Responded(HttpResponse),
    /// The request should reach the network unchanged
    Bypassed {
        request: Arc<CapturedRequest>,
        origin: ResolutionOrigin,
    },
    /// The request fails with a network error
    Rejected { origin: ResolutionOrigin },
}

/// Interceptor known to the worker while it is running.
#[derive(Debug, Clone)]
pub struct RunningInterceptor {
    pub id: InterceptorId,
    pub base_url: String,
    pub mode: InterceptorMode,
    pub strategy: Option<UnhandledRequestStrategy>,
    /// Start order; larger is more recent
    pub started: u64,
}

struct Subscription {
    interceptor: InterceptorId,
    method: HttpMethod,
    url_pattern: String,
    callback: DispatchCallback,
}

/// Dispatches captured requests to the callbacks subscribed by running interceptors.
#[derive(Default)]
pub struct InterceptorWorker {
    subscriptions: Mutex<Vec<Subscription>>,
    interceptors: Mutex<Vec<RunningInterceptor>>,
    resolver: UnhandledRequestResolver,
    next_interceptor_id: AtomicU64,
    start_sequence: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InterceptorWorker {
    pub fn new(defaults: UnhandledDefaults) -> Arc<Self> {
        Arc::new(Self {
            resolver: UnhandledRequestResolver::new(defaults),
            ..Self::default()
        })
    }

    pub fn defaults(&self) -> UnhandledDefaults {
        self.resolver.defaults()
    }

    pub(crate) fn allocate_interceptor_id(&self) -> InterceptorId {
        InterceptorId(self.next_interceptor_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn start_interceptor(
        &self,
        id: InterceptorId,
        base_url: &str,
        mode: InterceptorMode,
        strategy: Option<UnhandledRequestStrategy>,
    ) {
        let started = self.start_sequence.fetch_add(1, Ordering::Relaxed);
        let mut interceptors = lock(&self.interceptors);
        interceptors.retain(|interceptor| interceptor.id != id);
        interceptors.push(RunningInterceptor {
            id,
            base_url: base_url.to_string(),
            mode,
            strategy,
            started,
        });
    }

    pub(crate) fn stop_interceptor(&self, id: InterceptorId) {
        lock(&self.interceptors).retain(|interceptor| interceptor.id != id);
        self.clear_interceptor_handlers(id);
    }

    pub(crate) fn set_unhandled_strategy(
        &self,
        id: InterceptorId,
        strategy: Option<UnhandledRequestStrategy>,
    ) {
        if let Some(interceptor) = lock(&self.interceptors)
            .iter_mut()
            .find(|interceptor| interceptor.id == id)
        {
            interceptor.strategy = strategy;
        }
    }

    pub fn running_interceptors(&self) -> usize {
        lock(&self.interceptors).len()
    }

    /// Dispatch a captured request.
    ///
    /// Subscribed callbacks run newest first until one produces a response. Callback
    /// errors are logged and treated as no response. Requests nobody answered go to the
    /// unhandled-request strategy of the interceptor owning their URL.
    pub async fn fetch(&self, request: CapturedRequest) -> FetchOutcome {
        let request = Arc::new(request);

        let callbacks: Vec<DispatchCallback> = lock(&self.subscriptions)
            .iter()
            .rev()
            .filter(|subscription| {
                subscription.method == request.method
                    && url_matches(&subscription.url_pattern, &request.url).matched
            })
            .map(|subscription| subscription.callback.clone())
            .collect();

        let source = if callbacks.is_empty() {
            UnhandledSource::NothingRegistered
        } else {
            UnhandledSource::NoHandlerMatched
        };

        for callback in callbacks {
            match callback(request.clone()).await {
                Ok(Some(HandlerResponse::Response(response))) => {
                    return FetchOutcome::Responded(response);
                }
                Ok(Some(HandlerResponse::Action(ResponseAction::Bypass))) => {
                    return FetchOutcome::Bypassed {
                        request,
                        origin: ResolutionOrigin::Declared,
                    };
                }
                Ok(Some(HandlerResponse::Action(ResponseAction::Reject))) => {
                    return FetchOutcome::Rejected {
                        origin: ResolutionOrigin::Declared,
                    };
                }
                Ok(None) => {}
                Err(dispatch_error) => error!(
                    method = %request.method,
                    url = %request.url,
                    error = %dispatch_error,
                    "failed to dispatch request to handlers"
                ),
            }
        }

        let owner = {
            let interceptors = lock(&self.interceptors);
            find_owner(&interceptors, &request.url).cloned()
        };
        let parsed = HttpRequest::parse(request.clone(), HashMap::new());
        let resolution = self.resolver.resolve(&parsed, owner.as_ref(), source).await;

        debug!(
            method = %request.method,
            url = %request.url,
            action = ?resolution.action,
            "resolved unhandled request"
        );

        let origin = ResolutionOrigin::Unhandled(resolution.source);
        match resolution.action {
            ResponseAction::Bypass => FetchOutcome::Bypassed { request, origin },
            ResponseAction::Reject => FetchOutcome::Rejected { origin },
        }
    }
}

impl TransportHook for InterceptorWorker {
    fn use_handler(
        &self,
        interceptor: InterceptorId,
        method: HttpMethod,
        url_pattern: String,
        callback: DispatchCallback,
    ) {
        lock(&self.subscriptions).push(Subscription {
            interceptor,
            method,
            url_pattern,
            callback,
        });
    }

    fn clear_handlers(&self) {
        lock(&self.subscriptions).clear();
    }

    fn clear_interceptor_handlers(&self, interceptor: InterceptorId) {
        lock(&self.subscriptions).retain(|subscription| subscription.interceptor != interceptor);
    }
}
