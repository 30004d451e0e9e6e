//! Rule engine for mocked HTTP interceptors.
//!
//! Interceptors bound to a base URL create [`Handler`]s per method and path. Handlers
//! carry restrictions, a response declaration and an expected request count. Captured
//! requests are dispatched through an [`InterceptorWorker`], which picks the newest
//! eligible handler or falls back to the unhandled-request strategy.

pub mod config;
pub mod handler;
pub mod http;
pub mod interceptor;
pub mod matching;

pub use config::{load_fixtures, ConfigError, HandlerFixture, InterceptorOptions, RequestSavingOptions};
pub use handler::remote::{
    HandlerCommit, PendingHandler, RemoteHandler, RemoteHandlerChannel, RemoteHttpInterceptor,
    SyncError, SyncState, SyncedHandler,
};
pub use handler::{
    Handler, HandlerId, HandlerMatch, InterceptedRequest, MatchFailure, RequestLimits,
    TimesCheckError,
};
pub use http::{
    CapturedRequest, HttpBody, HttpMethod, HttpMultiMap, HttpRequest, HttpResponse, MockResponse,
    ResponseAction, ResponseDeclaration,
};
pub use interceptor::{
    FetchOutcome, HttpInterceptor, InterceptorError, InterceptorMode, InterceptorWorker,
    ResolutionOrigin, StrategyError, UnhandledDeclaration, UnhandledDefaults,
    UnhandledRequestStrategy, UnhandledSource,
};
pub use matching::{Restriction, RestrictionDiff, RestrictionError, StaticRestriction};
