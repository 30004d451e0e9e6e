//! Per-interceptor dispatch engine.

use crate::config::RequestSavingOptions;
use crate::handler::{Handler, HandlerId, TimesCheckError, WeakHandler};
use crate::http::{CapturedRequest, HttpMethod, HttpRequest, HttpResponse, ResponseDeclaration};
use crate::interceptor::registry::{find_matching_handler, HandlerRegistry};
use crate::interceptor::worker::{DispatchCallback, HandlerResponse, TransportHook};
use crate::interceptor::{InterceptorError, InterceptorId, InterceptorMode};
use crate::matching::{join_url, url_matches};
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// Owns the handler registry of one interceptor and answers the requests routed to it.
pub struct InterceptorClient {
    id: InterceptorId,
    base_url: String,
    mode: InterceptorMode,
    request_saving: RequestSavingOptions,
    saved_requests: Mutex<usize>,
    running: AtomicBool,
    registry: Mutex<HandlerRegistry>,
    /// Every handler created here, registered or not, in creation order
    created: Mutex<Vec<WeakHandler>>,
    hook: Arc<dyn TransportHook>,
    next_sequence: AtomicU64,
    this: Weak<InterceptorClient>,
}

impl InterceptorClient {
    pub fn new(
        id: InterceptorId,
        base_url: impl Into<String>,
        mode: InterceptorMode,
        request_saving: RequestSavingOptions,
        hook: Arc<dyn TransportHook>,
    ) -> Arc<Self> {
        let base_url = base_url.into();
        Arc::new_cyclic(|this| Self {
            id,
            base_url,
            mode,
            request_saving,
            saved_requests: Mutex::new(0),
            running: AtomicBool::new(false),
            registry: Mutex::new(HandlerRegistry::new()),
            created: Mutex::new(Vec::new()),
            hook,
            next_sequence: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub fn id(&self) -> InterceptorId {
        self.id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn mode(&self) -> InterceptorMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn ensure_running(&self) -> Result<(), InterceptorError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(InterceptorError::NotRunning {
                base_url: self.base_url.clone(),
            })
        }
    }

    pub fn should_save_requests(&self) -> bool {
        self.request_saving.enabled
    }

    pub fn number_of_saved_requests(&self) -> usize {
        *self.saved()
    }

    fn saved(&self) -> MutexGuard<'_, usize> {
        self.saved_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn created(&self) -> MutexGuard<'_, Vec<WeakHandler>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live handlers created by this client, oldest first.
    fn live_handlers(&self) -> Vec<Handler> {
        self.created()
            .iter()
            .filter_map(WeakHandler::upgrade)
            .collect()
    }

    /// New handler for `method` and `path`; it is registered on its first `respond()`.
    pub fn create_handler(
        &self,
        method: HttpMethod,
        path: impl Into<String>,
    ) -> Result<Handler, InterceptorError> {
        self.ensure_running()?;
        let id = HandlerId {
            method,
            path: path.into(),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };
        let handler = Handler::new(id, self.this.clone());

        let mut created = self.created();
        created.retain(WeakHandler::is_alive);
        created.push(handler.downgrade());
        drop(created);

        Ok(handler)
    }

    /// Add a handler to its bucket. The first handler of a bucket subscribes the bucket
    /// to the transport.
    pub fn register_request_handler(&self, handler: &Handler) -> Result<(), InterceptorError> {
        self.ensure_running()?;
        let first_in_bucket = self.registry().register(handler);
        if !first_in_bucket {
            return Ok(());
        }

        let method = handler.method();
        let path = handler.path().to_string();
        let url_pattern = join_url(&self.base_url, &path);
        let client = self.this.clone();

        let callback: DispatchCallback = Arc::new(move |captured: Arc<CapturedRequest>| {
            let client = client.clone();
            let path = path.clone();
            async move {
                let client = client.upgrade().ok_or(InterceptorError::Detached)?;
                client
                    .handle_intercepted_request(method, &path, captured)
                    .await
            }
            .boxed()
        });

        debug!(
            base_url = %self.base_url,
            method = %method,
            url_pattern = %url_pattern,
            "subscribed handler bucket"
        );
        self.hook.use_handler(self.id, method, url_pattern, callback);
        Ok(())
    }

    /// Answer a request routed to the (method, path) bucket.
    ///
    /// Returns `None` when no handler of the bucket serves the request.
    pub async fn handle_intercepted_request(
        &self,
        method: HttpMethod,
        path: &str,
        captured: Arc<CapturedRequest>,
    ) -> Result<Option<HandlerResponse>, InterceptorError> {
        let path_params = url_matches(&join_url(&self.base_url, path), &captured.url).params;
        let request = HttpRequest::parse(captured, path_params);

        let handlers = self.registry().bucket(method, path);
        let Some(handler) = find_matching_handler(&handlers, &request).await? else {
            return Ok(None);
        };

        match handler.apply_response_declaration(&request).await? {
            ResponseDeclaration::Action { action } => Ok(Some(HandlerResponse::Action(action))),
            ResponseDeclaration::Response(declaration) => {
                let response = HttpResponse::synthesize(request.method, &declaration);
                if self.should_save_requests() {
                    handler.save_intercepted_request(request, response.clone());
                }
                Ok(Some(HandlerResponse::Response(response)))
            }
        }
    }

    /// Adjust the saved-request count, warning when it grows past the safe limit.
    pub fn increment_number_of_saved_requests(&self, delta: isize) {
        let safe_limit = self.request_saving.safe_limit;
        let mut saved = self.saved();
        let previous = *saved;
        *saved = previous.saturating_add_signed(delta);

        if previous <= safe_limit && *saved > safe_limit {
            warn!(
                base_url = %self.base_url,
                saved_requests = *saved,
                safe_limit,
                "interceptor saved more requests than its safe limit; \
                 call clear() on the interceptor or its handlers to release them"
            );
        }
    }

    /// First times-check failure among all handlers, if any, in creation order.
    ///
    /// Handlers that never declared a response are checked too.
    pub fn check_times(&self) -> Result<(), TimesCheckError> {
        self.live_handlers()
            .iter()
            .try_for_each(Handler::check_times)
    }

    /// Clear every handler and unsubscribe from the transport.
    pub fn clear(&self) {
        // Drained handlers must stay alive until cleared
        let registered = self.registry().drain();
        for handler in self.live_handlers() {
            handler.clear();
        }
        drop(registered);
        self.hook.clear_interceptor_handlers(self.id);
    }
}
