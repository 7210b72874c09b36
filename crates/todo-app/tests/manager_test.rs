//! Integration tests for the shared client manager.

mod common;

use backend_client::schema::Todos;
use backend_client::{FlowType, MemoryStorage, Session, SessionStorage};
use backend_config::ConfigError;
use common::{TestEnv, TEST_KEY};
use std::sync::Arc;
use std::time::Duration;
use todo_app::manager::{CLIENT_INFO, DB_SCHEMA, REALTIME_EVENTS_PER_SECOND};
use todo_app::{AppError, AppState, AppStateEvents, ClientManager, RefreshOutcome};
use tokio::sync::Barrier;
use tokio::time::timeout;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOCAL_URL: &str = "http://localhost:54321";

fn manager_for(env: &TestEnv) -> ClientManager {
    ClientManager::new(
        env.source(),
        Arc::new(MemoryStorage::new()),
        AppStateEvents::new(),
    )
}

#[tokio::test]
async fn test_same_instance_and_single_load() {
    let env = TestEnv::valid(LOCAL_URL);
    let manager = manager_for(&env);

    let first = manager.get_client().await.unwrap();
    let second = manager.get_client().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.loads(), 1);
    assert!(manager.is_initialized());
    assert!(manager.listener_registered());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_calls_build_once() {
    const CALLERS: usize = 4;

    let env = TestEnv::valid(LOCAL_URL);
    let load = env.source();
    // A slow load keeps construction in flight while the other callers arrive.
    let slow_source = move || {
        std::thread::sleep(Duration::from_millis(200));
        load()
    };
    let manager = Arc::new(ClientManager::new(
        slow_source,
        Arc::new(MemoryStorage::new()),
        AppStateEvents::new(),
    ));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let tasks: Vec<_> = (0..CALLERS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                manager.get_client().await
            })
        })
        .collect();

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap().unwrap());
    }

    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    assert_eq!(env.loads(), 1);
    assert_eq!(manager.app_state().listener_count(), 1);
}

#[tokio::test]
async fn test_missing_endpoint_then_recovery() {
    let env = TestEnv::new(&[("PUBLIC_API_KEY", TEST_KEY)]);
    let manager = manager_for(&env);

    let result = manager.get_client().await;
    assert!(matches!(
        result,
        Err(AppError::Config(ConfigError::MissingEndpoint))
    ));
    assert!(!manager.is_initialized());
    assert!(!manager.listener_registered());
    assert_eq!(manager.app_state().listener_count(), 0);

    env.set("ENDPOINT_URL", LOCAL_URL);
    let client = manager.get_client().await.unwrap();

    assert_eq!(client.url().as_str(), "http://localhost:54321/");
    assert_eq!(env.loads(), 2);
    assert!(manager.listener_registered());
}

#[tokio::test]
async fn test_missing_key_builds_nothing() {
    let env = TestEnv::new(&[("ENDPOINT_URL", LOCAL_URL)]);
    let manager = manager_for(&env);

    let result = manager.get_client().await;
    assert!(matches!(
        result,
        Err(AppError::Config(ConfigError::MissingPublicKey))
    ));
    assert!(!manager.is_initialized());
}

#[tokio::test]
async fn test_short_key_still_builds() {
    let env = TestEnv::new(&[("ENDPOINT_URL", LOCAL_URL), ("PUBLIC_API_KEY", "0123456789")]);
    let manager = manager_for(&env);

    tokio_test::assert_ok!(manager.get_client().await);
}

#[tokio::test]
async fn test_client_is_configured_for_the_app() {
    let env = TestEnv::valid(LOCAL_URL);
    let manager = manager_for(&env);
    let client = manager.get_client().await.unwrap();

    let options = client.options();
    assert!(options.auth.auto_refresh_token);
    assert!(options.auth.persist_session);
    assert!(!options.auth.detect_session_in_url);
    assert_eq!(options.auth.flow_type, FlowType::Pkce);
    assert_eq!(client.schema(), DB_SCHEMA);
    assert_eq!(options.realtime.events_per_second, REALTIME_EVENTS_PER_SECOND);
    assert!(options
        .global
        .headers
        .iter()
        .any(|(k, v)| k == "X-Client-Info" && v == CLIENT_INFO));
}

#[tokio::test]
async fn test_requests_identify_the_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/todos"))
        .and(header("X-Client-Info", CLIENT_INFO))
        .and(header("apikey", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let env = TestEnv::valid(&mock_server.uri());
    let manager = manager_for(&env);
    let client = manager.get_client().await.unwrap();

    let rows = client.from::<Todos>().select_all().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_foreground_refreshes_persisted_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = MemoryStorage::new();
    let expiring = Session {
        access_token: "old-access".into(),
        refresh_token: "old-refresh".into(),
        token_type: "bearer".into(),
        expires_in: 10,
        expires_at: Some(chrono::Utc::now().timestamp() + 10),
        user: None,
    };
    storage
        .set_item(
            "sb-127-auth-token",
            &serde_json::to_string(&expiring).unwrap(),
        )
        .await
        .unwrap();

    let env = TestEnv::valid(&mock_server.uri());
    let app_state = AppStateEvents::new();
    let manager = ClientManager::new(env.source(), Arc::new(storage), app_state.clone());
    let mut outcomes = manager.refresh_events();

    let client = manager.get_client().await.unwrap();
    assert_eq!(app_state.publish(AppState::Active), 1);

    let outcome = timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::Resumed);
    assert_eq!(client.auth().access_token().await.as_deref(), Some("new-access"));
    assert!(client.auth().is_auto_refreshing());

    manager.shutdown();
    assert!(!manager.listener_registered());
    assert!(!client.auth().is_auto_refreshing());
}

#[tokio::test]
async fn test_failed_foreground_refresh_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let storage = MemoryStorage::new();
    let expiring = Session {
        access_token: "old-access".into(),
        refresh_token: "old-refresh".into(),
        token_type: "bearer".into(),
        expires_in: 10,
        expires_at: Some(chrono::Utc::now().timestamp() + 10),
        user: None,
    };
    storage
        .set_item(
            "sb-127-auth-token",
            &serde_json::to_string(&expiring).unwrap(),
        )
        .await
        .unwrap();

    let env = TestEnv::valid(&mock_server.uri());
    let manager = ClientManager::new(env.source(), Arc::new(storage), AppStateEvents::new());
    let mut outcomes = manager.refresh_events();

    let client = manager.get_client().await.unwrap();
    manager.app_state().publish(AppState::Active);

    let outcome = timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, RefreshOutcome::Failed(_)));

    // The client and listener survive the failure.
    assert!(manager.listener_registered());
    let again = manager.get_client().await.unwrap();
    assert!(Arc::ptr_eq(&client, &again));
}

#[tokio::test]
async fn test_refresh_outcome_stream() {
    use tokio_stream::StreamExt;

    let env = TestEnv::valid(LOCAL_URL);
    let manager = manager_for(&env);
    let mut stream = Box::pin(manager.refresh_outcomes());

    manager.get_client().await.unwrap();
    manager.app_state().publish(AppState::Active);

    // No stored session, so resuming succeeds without a network call.
    let outcome = timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::Resumed);
}
