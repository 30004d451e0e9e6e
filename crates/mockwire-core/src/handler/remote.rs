//! Handlers mirrored to a remote mock server.
//!
//! Every mutating call applies locally at once and queues an acknowledgement from the
//! [`RemoteHandlerChannel`]. [`RemoteHandler::sync_state`] tells whether acknowledgements
//! are still pending, and [`RemoteHandler::synced`] waits until none are.

use crate::handler::{Handler, HandlerId, InterceptedRequest, RequestLimits, TimesCheckError};
use crate::http::{HttpMethod, HttpRequest, ResponseDeclaration};
use crate::interceptor::{
    HttpInterceptor, InterceptorError, InterceptorMode, InterceptorWorker,
    UnhandledRequestStrategy,
};
use crate::config::InterceptorOptions;
use crate::matching::{Restriction, StaticRestriction};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Failure to acknowledge a handler operation remotely
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("remote rejected handler operation: {0}")]
    Rejected(String),
    #[error("remote channel is closed")]
    Closed,
    #[error("acknowledgement task aborted: {0}")]
    Aborted(String),
}

/// Restriction as sent to the remote side; computed predicates only travel as a
/// description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RestrictionSummary {
    Static(StaticRestriction),
    Computed { description: Option<String> },
}

impl From<&Restriction> for RestrictionSummary {
    fn from(restriction: &Restriction) -> Self {
        match restriction {
            Restriction::Static(restriction) => RestrictionSummary::Static(restriction.clone()),
            Restriction::Computed(computed) => RestrictionSummary::Computed {
                description: computed.description().map(str::to_string),
            },
        }
    }
}

/// Handler mutation committed to the remote side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HandlerCommit {
    Restrict {
        handler: HandlerId,
        restriction: RestrictionSummary,
    },
    /// `declaration` is `None` for responses computed per request
    Respond {
        handler: HandlerId,
        declaration: Option<ResponseDeclaration>,
    },
    Times {
        handler: HandlerId,
        limits: RequestLimits,
    },
    Clear {
        handler: HandlerId,
    },
}

/// Transport carrying handler commits to the remote mock server.
#[async_trait]
pub trait RemoteHandlerChannel: Send + Sync {
    async fn commit(&self, commit: HandlerCommit) -> Result<(), SyncError>;
}

type PendingAck = Shared<BoxFuture<'static, Result<(), SyncError>>>;

#[derive(Default)]
struct SyncTracker {
    next_id: AtomicU64,
    pending: Mutex<Vec<(u64, PendingAck)>>,
}

impl SyncTracker {
    fn pending(&self) -> MutexGuard<'_, Vec<(u64, PendingAck)>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `commit` after the previously queued one and track its acknowledgement.
    ///
    /// The send starts right away on the current tokio runtime, if any; otherwise it
    /// runs when first awaited. The queue stays locked from reading the predecessor to
    /// pushing the new acknowledgement.
    fn enqueue(&self, channel: Arc<dyn RemoteHandlerChannel>, commit: HandlerCommit) {
        debug!(commit = ?commit, "queued remote handler commit");
        let mut pending = self.pending();
        let previous = pending.last().map(|(_, ack)| ack.clone());
        let send = async move {
            if let Some(previous) = previous {
                // Its outcome is reported by its own acknowledgement
                let _ = previous.await;
            }
            channel.commit(commit).await
        };

        let ack: BoxFuture<'static, Result<(), SyncError>> =
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let task = runtime.spawn(send);
                    async move {
                        match task.await {
                            Ok(result) => result,
                            Err(join_error) => Err(SyncError::Aborted(join_error.to_string())),
                        }
                    }
                    .boxed()
                }
                Err(_) => send.boxed(),
            };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pending.push((id, ack.shared()));
    }

    fn snapshot(&self) -> Vec<(u64, PendingAck)> {
        self.pending().clone()
    }

    fn remove(&self, ids: &[u64]) {
        self.pending().retain(|(id, _)| !ids.contains(id));
    }
}

/// Handler whose mutations are mirrored to a remote mock server.
#[derive(Clone)]
pub struct RemoteHandler {
    handler: Handler,
    channel: Arc<dyn RemoteHandlerChannel>,
    tracker: Arc<SyncTracker>,
}

impl RemoteHandler {
    pub fn new(handler: Handler, channel: Arc<dyn RemoteHandlerChannel>) -> Self {
        Self {
            handler,
            channel,
            tracker: Arc::new(SyncTracker::default()),
        }
    }

    fn commit(&self, commit: HandlerCommit) {
        self.tracker.enqueue(self.channel.clone(), commit);
    }

    pub fn id(&self) -> &HandlerId {
        self.handler.id()
    }

    pub fn with(&self, restriction: impl Into<Restriction>) -> &Self {
        let restriction = restriction.into();
        let summary = RestrictionSummary::from(&restriction);
        self.handler.with(restriction);
        self.commit(HandlerCommit::Restrict {
            handler: self.id().clone(),
            restriction: summary,
        });
        self
    }

    pub fn respond(
        &self,
        declaration: impl Into<ResponseDeclaration>,
    ) -> Result<&Self, InterceptorError> {
        let declaration = declaration.into();
        self.handler.respond(declaration.clone())?;
        self.commit(HandlerCommit::Respond {
            handler: self.id().clone(),
            declaration: Some(declaration),
        });
        Ok(self)
    }

    pub fn respond_with<F, Fut>(&self, factory: F) -> Result<&Self, InterceptorError>
    where
        F: Fn(&HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseDeclaration> + Send + 'static,
    {
        self.handler.respond_with(factory)?;
        self.commit(HandlerCommit::Respond {
            handler: self.id().clone(),
            declaration: None,
        });
        Ok(self)
    }

    #[track_caller]
    pub fn times(&self, count: usize) -> &Self {
        self.handler.times(count);
        self.commit_limits()
    }

    #[track_caller]
    pub fn times_between(&self, min: usize, max: usize) -> &Self {
        self.handler.times_between(min, max);
        self.commit_limits()
    }

    fn commit_limits(&self) -> &Self {
        self.commit(HandlerCommit::Times {
            handler: self.id().clone(),
            limits: self.handler.limits(),
        });
        self
    }

    pub fn clear(&self) -> &Self {
        self.handler.clear();
        self.commit(HandlerCommit::Clear {
            handler: self.id().clone(),
        });
        self
    }

    pub fn sync_state(&self) -> SyncState {
        let pending = self.tracker.snapshot();
        if pending.is_empty() {
            SyncState::Synced(SyncedHandler {
                handler: self.handler.clone(),
            })
        } else {
            SyncState::Pending(PendingHandler {
                remote: self.clone(),
                pending,
            })
        }
    }

    /// Wait until every queued operation, including ones queued while waiting, is
    /// acknowledged.
    pub async fn synced(&self) -> Result<SyncedHandler, SyncError> {
        let mut state = self.sync_state();
        loop {
            match state {
                SyncState::Synced(handler) => return Ok(handler),
                SyncState::Pending(pending) => state = pending.settle().await?,
            }
        }
    }
}

/// Remote handler with acknowledgements still in flight.
pub struct PendingHandler {
    remote: RemoteHandler,
    pending: Vec<(u64, PendingAck)>,
}

impl PendingHandler {
    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the acknowledgements pending when this state was taken.
    ///
    /// Settled acknowledgements are forgotten even when one of them failed; the first
    /// failure is returned.
    pub async fn settle(self) -> Result<SyncState, SyncError> {
        let (ids, acks): (Vec<u64>, Vec<PendingAck>) = self.pending.into_iter().unzip();
        let results = join_all(acks).await;
        self.remote.tracker.remove(&ids);

        results.into_iter().collect::<Result<Vec<()>, SyncError>>()?;
        Ok(self.remote.sync_state())
    }
}

/// Read-only view of a remote handler whose operations are all acknowledged.
#[derive(Debug, Clone)]
pub struct SyncedHandler {
    handler: Handler,
}

impl SyncedHandler {
    pub fn id(&self) -> &HandlerId {
        self.handler.id()
    }

    pub fn matched_count(&self) -> usize {
        self.handler.matched_count()
    }

    pub fn requests(&self) -> Result<Vec<InterceptedRequest>, InterceptorError> {
        self.handler.requests()
    }

    pub fn check_times(&self) -> Result<(), TimesCheckError> {
        self.handler.check_times()
    }
}

pub enum SyncState {
    Pending(PendingHandler),
    Synced(SyncedHandler),
}

impl SyncState {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced(_))
    }
}

/// Interceptor in remote mode whose handlers commit through a channel.
pub struct RemoteHttpInterceptor {
    interceptor: HttpInterceptor,
    channel: Arc<dyn RemoteHandlerChannel>,
    handlers: Mutex<Vec<RemoteHandler>>,
}

impl RemoteHttpInterceptor {
    pub fn new(
        worker: Arc<InterceptorWorker>,
        options: InterceptorOptions,
        channel: Arc<dyn RemoteHandlerChannel>,
    ) -> Self {
        Self {
            interceptor: HttpInterceptor::new(worker, options.mode(InterceptorMode::Remote)),
            channel,
            handlers: Mutex::new(Vec::new()),
        }
    }

    fn handlers(&self) -> MutexGuard<'_, Vec<RemoteHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit a clear for every handler created by this interceptor.
    fn clear_remote_handlers(&self) {
        for handler in self.handlers().iter() {
            handler.clear();
        }
    }

    pub fn base_url(&self) -> &str {
        self.interceptor.base_url()
    }

    pub fn is_running(&self) -> bool {
        self.interceptor.is_running()
    }

    pub fn start(&self) {
        self.interceptor.start();
    }

    /// Stop intercepting; handlers are cleared here and on the remote side.
    pub fn stop(&self) {
        if self.interceptor.is_running() {
            self.clear_remote_handlers();
        }
        self.interceptor.stop();
    }

    pub fn on_unhandled_request(&self, strategy: impl Into<UnhandledRequestStrategy>) {
        self.interceptor.on_unhandled_request(strategy);
    }

    pub fn handler(
        &self,
        method: HttpMethod,
        path: &str,
    ) -> Result<RemoteHandler, InterceptorError> {
        let handler = self.interceptor.handler(method, path)?;
        let remote = RemoteHandler::new(handler, self.channel.clone());
        self.handlers().push(remote.clone());
        Ok(remote)
    }

    pub fn get(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Get, path)
    }

    pub fn post(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Post, path)
    }

    pub fn put(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Put, path)
    }

    pub fn patch(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Patch, path)
    }

    pub fn delete(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Delete, path)
    }

    pub fn head(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Head, path)
    }

    pub fn options(&self, path: &str) -> Result<RemoteHandler, InterceptorError> {
        self.handler(HttpMethod::Options, path)
    }

    pub fn check_times(&self) -> Result<(), TimesCheckError> {
        self.interceptor.check_times()
    }

    /// Clear every handler locally and queue a clear commit for each one.
    ///
    /// Use [`RemoteHttpInterceptor::synced`] to wait for the remote side.
    pub fn clear(&self) -> Result<(), InterceptorError> {
        self.interceptor.clear()?;
        self.clear_remote_handlers();
        Ok(())
    }

    /// Wait until every handler created by this interceptor is synced.
    ///
    /// All handlers are awaited; the first failure is returned.
    pub async fn synced(&self) -> Result<(), SyncError> {
        let handlers = self.handlers().clone();
        let results = join_all(handlers.iter().map(RemoteHandler::synced)).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}
