//! Decision taken for requests that no handler answered.

use crate::http::{HttpRequest, ResponseAction};
use crate::interceptor::worker::RunningInterceptor;
use crate::interceptor::InterceptorMode;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Error returned by a dynamic unhandled-request strategy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unhandled request strategy failed: {0}")]
pub struct StrategyError(pub String);

/// Action for unhandled requests and whether to log them.
///
/// An unset `log` defers to the next, less specific declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhandledDeclaration {
    pub action: ResponseAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,
}

impl UnhandledDeclaration {
    pub fn bypass() -> Self {
        Self {
            action: ResponseAction::Bypass,
            log: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            action: ResponseAction::Reject,
            log: None,
        }
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = Some(log);
        self
    }
}

pub type UnhandledStrategyFn = Arc<
    dyn Fn(&HttpRequest) -> BoxFuture<'static, Result<UnhandledDeclaration, StrategyError>>
        + Send
        + Sync,
>;

/// How an interceptor treats requests none of its handlers answered.
#[derive(Clone)]
pub enum UnhandledRequestStrategy {
    Declaration(UnhandledDeclaration),
    Dynamic(UnhandledStrategyFn),
}

impl UnhandledRequestStrategy {
    /// Strategy computed per request.
    pub fn dynamic<F, Fut>(strategy: F) -> Self
    where
        F: Fn(&HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UnhandledDeclaration, StrategyError>> + Send + 'static,
    {
        UnhandledRequestStrategy::Dynamic(Arc::new(move |request: &HttpRequest| {
            strategy(request).boxed()
        }))
    }

    async fn declaration(
        &self,
        request: &HttpRequest,
    ) -> Result<UnhandledDeclaration, StrategyError> {
        match self {
            UnhandledRequestStrategy::Declaration(declaration) => Ok(*declaration),
            UnhandledRequestStrategy::Dynamic(strategy) => strategy(request).await,
        }
    }
}

impl fmt::Debug for UnhandledRequestStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnhandledRequestStrategy::Declaration(declaration) => {
                f.debug_tuple("Declaration").field(declaration).finish()
            }
            UnhandledRequestStrategy::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<UnhandledDeclaration> for UnhandledRequestStrategy {
    fn from(declaration: UnhandledDeclaration) -> Self {
        UnhandledRequestStrategy::Declaration(declaration)
    }
}

/// Process-wide fallback declarations per interceptor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhandledDefaults {
    pub local: UnhandledDeclaration,
    pub remote: UnhandledDeclaration,
}

impl Default for UnhandledDefaults {
    fn default() -> Self {
        Self {
            local: UnhandledDeclaration::reject().log(true),
            remote: UnhandledDeclaration::reject().log(true),
        }
    }
}

impl UnhandledDefaults {
    pub fn for_mode(&self, mode: InterceptorMode) -> UnhandledDeclaration {
        match mode {
            InterceptorMode::Local => self.local,
            InterceptorMode::Remote => self.remote,
        }
    }
}

/// Whether any handler was subscribed for the request's method and URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnhandledSource {
    NoHandlerMatched,
    NothingRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnhandledResolution {
    pub action: ResponseAction,
    pub log: bool,
    pub source: UnhandledSource,
}

/// The running interceptor responsible for `url`: the most recently started one whose
/// base URL prefixes it.
pub fn find_owner<'a>(
    interceptors: &'a [RunningInterceptor],
    url: &str,
) -> Option<&'a RunningInterceptor> {
    interceptors
        .iter()
        .filter(|interceptor| url.starts_with(interceptor.base_url.trim_end_matches('/')))
        .max_by_key(|interceptor| interceptor.started)
}

#[derive(Debug, Clone, Default)]
pub struct UnhandledRequestResolver {
    defaults: UnhandledDefaults,
}

impl UnhandledRequestResolver {
    pub fn new(defaults: UnhandledDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> UnhandledDefaults {
        self.defaults
    }

    /// Merge the owner's strategy with the default of its mode and log the outcome.
    pub async fn resolve(
        &self,
        request: &HttpRequest,
        owner: Option<&RunningInterceptor>,
        source: UnhandledSource,
    ) -> UnhandledResolution {
        let mode = owner.map_or(InterceptorMode::Local, |owner| owner.mode);
        let default = self.defaults.for_mode(mode);

        let mut candidates = Vec::with_capacity(2);
        if let Some(strategy) = owner.and_then(|owner| owner.strategy.as_ref()) {
            match strategy.declaration(request).await {
                Ok(declaration) => candidates.push(declaration),
                Err(strategy_error) => error!(
                    method = %request.method,
                    url = %request.url,
                    error = %strategy_error,
                    "unhandled request strategy failed; using the default"
                ),
            }
        }
        candidates.push(default);

        let action = candidates[0].action;
        let log = candidates
            .iter()
            .find_map(|declaration| declaration.log)
            .unwrap_or(false);

        let resolution = UnhandledResolution {
            action,
            log,
            source,
        };
        if log {
            log_unhandled(request, &resolution);
        }
        resolution
    }
}

fn log_unhandled(request: &HttpRequest, resolution: &UnhandledResolution) {
    let headers = request.headers.to_value().to_string();
    let search_params = request.search_params.to_value().to_string();
    let body = request.body.to_value().to_string();

    match resolution.action {
        ResponseAction::Bypass => warn!(
            method = %request.method,
            url = %request.url,
            headers = %headers,
            search_params = %search_params,
            body = %body,
            source = ?resolution.source,
            "request was not handled and was bypassed"
        ),
        ResponseAction::Reject => error!(
            method = %request.method,
            url = %request.url,
            headers = %headers,
            search_params = %search_params,
            body = %body,
            source = ?resolution.source,
            "request was not handled and was rejected"
        ),
    }
}
