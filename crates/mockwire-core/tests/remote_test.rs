use async_trait::async_trait;
use mockwire_core::{
    CapturedRequest, FetchOutcome, HandlerCommit, HttpMethod, InterceptorOptions,
    InterceptorWorker, MockResponse, RemoteHandlerChannel, RemoteHttpInterceptor,
    StaticRestriction, SyncError, SyncState, UnhandledDefaults,
};
use rstest::rstest;
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockServer {
    commits: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl RemoteHandlerChannel for MockServer {
    async fn commit(&self, commit: HandlerCommit) -> Result<(), SyncError> {
        let value = serde_json::to_value(&commit).map_err(|e| SyncError::Rejected(e.to_string()))?;
        tokio::task::yield_now().await;
        self.commits.lock().unwrap().push(value);
        Ok(())
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_handler_syncs_and_serves() {
    let server = Arc::new(MockServer::default());
    let worker = InterceptorWorker::new(UnhandledDefaults::default());
    let interceptor = RemoteHttpInterceptor::new(
        worker.clone(),
        InterceptorOptions::new("http://localhost:4000").save_requests(true),
        server.clone(),
    );
    interceptor.start();

    let handler = interceptor.get("/users").unwrap();
    handler
        .with(StaticRestriction::new().header("Accept", "application/json"))
        .respond(MockResponse::new(200))
        .unwrap()
        .times(1);

    assert!(matches!(handler.sync_state(), SyncState::Pending(_)));
    let synced = handler.synced().await.unwrap();

    let kinds: Vec<String> = server
        .commits
        .lock()
        .unwrap()
        .iter()
        .map(|commit| commit["type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, ["restrict", "respond", "times"]);

    let outcome = worker
        .fetch(
            CapturedRequest::new(HttpMethod::Get, "http://localhost:4000/users")
                .header("accept", "application/json"),
        )
        .await;
    assert!(matches!(outcome, FetchOutcome::Responded(response) if response.status == 200));

    assert!(synced.check_times().is_ok());
    assert_eq!(synced.requests().unwrap().len(), 1);
    assert_eq!(synced.matched_count(), 1);
}

#[rstest]
#[tokio::test]
async fn test_clear_is_committed() {
    let server = Arc::new(MockServer::default());
    let worker = InterceptorWorker::new(UnhandledDefaults::default());
    let interceptor = RemoteHttpInterceptor::new(
        worker,
        InterceptorOptions::new("http://localhost:4000"),
        server.clone(),
    );
    interceptor.start();

    let handler = interceptor.delete("/users/:id").unwrap();
    handler.clear();
    handler.synced().await.unwrap();

    let commits = server.commits.lock().unwrap().clone();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0]["type"], "clear");
    assert_eq!(commits[0]["handler"]["method"], "DELETE");
    assert_eq!(commits[0]["handler"]["path"], "/users/:id");
}

#[rstest]
#[tokio::test]
async fn test_interceptor_clear_reaches_remote() {
    let server = Arc::new(MockServer::default());
    let worker = InterceptorWorker::new(UnhandledDefaults::default());
    let interceptor = RemoteHttpInterceptor::new(
        worker.clone(),
        InterceptorOptions::new("http://localhost:4000"),
        server.clone(),
    );
    interceptor.start();

    let handler = interceptor.get("/users").unwrap();
    handler.respond(MockResponse::new(200)).unwrap();
    handler.synced().await.unwrap();

    interceptor.clear().unwrap();
    interceptor.synced().await.unwrap();

    let kinds: Vec<serde_json::Value> = server
        .commits
        .lock()
        .unwrap()
        .iter()
        .map(|commit| commit["type"].clone())
        .collect();
    assert_eq!(kinds, [json!("respond"), json!("clear")]);

    let outcome = worker
        .fetch(CapturedRequest::new(HttpMethod::Get, "http://localhost:4000/users"))
        .await;
    assert!(matches!(outcome, FetchOutcome::Rejected { .. }));
}
