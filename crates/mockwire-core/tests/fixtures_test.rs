use mockwire_core::{
    load_fixtures, CapturedRequest, ConfigError, FetchOutcome, HttpInterceptor, HttpMethod,
    InterceptorOptions, InterceptorWorker, UnhandledDefaults,
};
use rstest::rstest;
use serde_json::json;
use std::fs;

const USERS: &str = r#"
- method: POST
  path: /users
  restrictions:
    - body:
        name: User
  response:
    status: 201
    body:
      id: 1
  times: 1
- method: GET
  path: /users/:id
  restrictions:
    - searchParams: "${pathParams.id == '7'}"
  response:
    status: 200
    body:
      id: "7"
"#;

const HEALTH: &str = r#"
// health checks go to the network
{
  "method": "GET",
  "path": "/health",
  "response": { "action": "bypass" } /* declared action */
}
"#;

#[rstest]
#[tokio::test]
async fn test_load_and_apply_fixtures() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("users.yaml"), USERS).unwrap();
    fs::write(dir.path().join("health.jsonc"), HEALTH).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut fixtures = load_fixtures(&format!("{}/*.jsonc", dir.path().display()))
        .await
        .unwrap();
    fixtures.extend(
        load_fixtures(&format!("{}/*.yaml", dir.path().display()))
            .await
            .unwrap(),
    );
    assert_eq!(fixtures.len(), 3);

    let worker = InterceptorWorker::new(UnhandledDefaults::default());
    let interceptor = HttpInterceptor::new(
        worker.clone(),
        InterceptorOptions::new("http://localhost:3000"),
    );
    interceptor.start();
    let handlers = interceptor.apply_fixtures(&fixtures).unwrap();
    assert_eq!(handlers.len(), 3);

    let outcome = worker
        .fetch(CapturedRequest::new(HttpMethod::Get, "http://localhost:3000/health"))
        .await;
    assert!(matches!(outcome, FetchOutcome::Bypassed { .. }));

    let outcome = worker
        .fetch(
            CapturedRequest::new(HttpMethod::Post, "http://localhost:3000/users")
                .json(json!({"name": "User", "email": "user@example.com"})),
        )
        .await;
    assert!(matches!(outcome, FetchOutcome::Responded(response) if response.status == 201));

    let outcome = worker
        .fetch(CapturedRequest::new(HttpMethod::Get, "http://localhost:3000/users/7"))
        .await;
    assert!(matches!(outcome, FetchOutcome::Responded(response) if response.status == 200));
    let outcome = worker
        .fetch(CapturedRequest::new(HttpMethod::Get, "http://localhost:3000/users/8"))
        .await;
    assert!(matches!(outcome, FetchOutcome::Rejected { .. }));

    assert!(interceptor.check_times().is_ok());
}

#[rstest]
#[tokio::test]
async fn test_load_fixtures_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    let result = load_fixtures(&format!("{}/*.json", dir.path().display())).await;
    assert!(matches!(result, Err(ConfigError::Json(_))));
}

#[rstest]
#[tokio::test]
async fn test_load_fixtures_without_matches_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let fixtures = load_fixtures(&format!("{}/*.yaml", dir.path().display()))
        .await
        .unwrap();
    assert!(fixtures.is_empty());
}
