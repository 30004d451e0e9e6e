//! HTTP interceptors: handler factories bound to a base URL.
//!
//! ```ignore
//! let worker = InterceptorWorker::new(UnhandledDefaults::default());
//! let interceptor = HttpInterceptor::new(worker.clone(), InterceptorOptions::new("http://localhost:3000"));
//! interceptor.start();
//!
//! interceptor
//!     .post("/users")?
//!     .with(StaticRestriction::new().json(json!({"name": "User"})))
//!     .respond(MockResponse::new(201))?
//!     .times(1);
//! ```

mod client;
mod error;
mod registry;
pub mod unhandled;
pub mod worker;

pub use client::InterceptorClient;
pub use error::InterceptorError;
pub use registry::{find_matching_handler, HandlerRegistry};
pub use unhandled::{
    StrategyError, UnhandledDeclaration, UnhandledDefaults, UnhandledRequestResolver,
    UnhandledRequestStrategy, UnhandledResolution, UnhandledSource,
};
pub use worker::{
    DispatchCallback, FetchOutcome, HandlerResponse, InterceptorWorker, ResolutionOrigin,
    TransportHook,
};

use crate::config::{HandlerFixture, InterceptorOptions};
use crate::handler::{Handler, TimesCheckError};
use crate::http::HttpMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Identifier of an interceptor within its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(pub u64);

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interceptor-{}", self.0)
    }
}

/// Where handlers live: in this process, or mirrored to a remote mock server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptorMode {
    #[default]
    Local,
    Remote,
}

/// Interceptor bound to a base URL, creating handlers for paths under it.
pub struct HttpInterceptor {
    worker: Arc<InterceptorWorker>,
    client: Arc<InterceptorClient>,
    strategy: Mutex<Option<UnhandledRequestStrategy>>,
}

impl HttpInterceptor {
    pub fn new(worker: Arc<InterceptorWorker>, options: InterceptorOptions) -> Self {
        let client = InterceptorClient::new(
            worker.allocate_interceptor_id(),
            options.base_url,
            options.mode,
            options.request_saving,
            worker.clone(),
        );
        Self {
            worker,
            client,
            strategy: Mutex::new(options.on_unhandled_request.map(Into::into)),
        }
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn mode(&self) -> InterceptorMode {
        self.client.mode()
    }

    pub fn client(&self) -> &Arc<InterceptorClient> {
        &self.client
    }

    pub fn is_running(&self) -> bool {
        self.client.is_running()
    }

    /// Replace the strategy used for requests under this interceptor's base URL that no
    /// handler answers.
    pub fn on_unhandled_request(&self, strategy: impl Into<UnhandledRequestStrategy>) {
        let strategy = Some(strategy.into());
        *self
            .strategy
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = strategy.clone();
        self.worker.set_unhandled_strategy(self.client.id(), strategy);
    }

    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        let strategy = self
            .strategy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.worker.start_interceptor(
            self.client.id(),
            self.client.base_url(),
            self.client.mode(),
            strategy,
        );
        self.client.set_running(true);
    }

    /// Stop intercepting; every handler is cleared.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        self.client.clear();
        self.client.set_running(false);
        self.worker.stop_interceptor(self.client.id());
    }

    pub fn handler(&self, method: HttpMethod, path: &str) -> Result<Handler, InterceptorError> {
        self.client.create_handler(method, path)
    }

    pub fn get(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Get, path)
    }

    pub fn post(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Post, path)
    }

    pub fn put(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Put, path)
    }

    pub fn patch(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Patch, path)
    }

    pub fn delete(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Delete, path)
    }

    pub fn head(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Head, path)
    }

    pub fn options(&self, path: &str) -> Result<Handler, InterceptorError> {
        self.handler(HttpMethod::Options, path)
    }

    pub fn check_times(&self) -> Result<(), TimesCheckError> {
        self.client.check_times()
    }

    pub fn clear(&self) -> Result<(), InterceptorError> {
        self.client.ensure_running()?;
        self.client.clear();
        Ok(())
    }

    /// Declare one handler per fixture, in order.
    #[track_caller]
    pub fn apply_fixtures(
        &self,
        fixtures: &[HandlerFixture],
    ) -> Result<Vec<Handler>, InterceptorError> {
        let mut handlers = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let handler = self.handler(fixture.method, &fixture.path)?;
            for restriction in fixture.build_restrictions()? {
                handler.with(restriction);
            }
            handler.respond(fixture.response.clone())?;
            if let Some(limits) = fixture.times {
                let limits = limits.into_limits();
                handler.times_between(limits.min, limits.max);
            }
            handlers.push(handler);
        }
        Ok(handlers)
    }
}

impl Drop for HttpInterceptor {
    fn drop(&mut self) {
        self.stop();
    }
}
