use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use codeguard_archive::ArchiveStore;
use codeguard_gateway::http::{router_with_state, AppState};
use codeguard_gateway::review::ReviewClient;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn spawn_server(app: Router) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server should run");
    });

    (addr, shutdown_tx, task)
}

fn stub_review_client(provider_addr: SocketAddr) -> ReviewClient {
    ReviewClient::new(
        format!("http://{}", provider_addr),
        "gemini-1.5-flash".to_string(),
        "test-key".to_string(),
    )
    .expect("review client should build")
}

async fn generate_ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "candidates": [
            {"content": {"parts": [{"text": "No issues found."}]}}
        ]
    }))
}

async fn generate_denied() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": {"code": 400, "message": "invalid API key", "status": "INVALID_ARGUMENT"}
        })),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn liveness_and_offline_history() {
    let app = router_with_state(AppState {
        review: None,
        archive: ArchiveStore::offline(),
    });
    let (addr, shutdown, task) = spawn_server(app).await;

    let root = reqwest::get(format!("http://{}/", addr))
        .await
        .expect("liveness request should succeed");
    assert_eq!(root.status(), reqwest::StatusCode::OK);
    let body = root
        .json::<serde_json::Value>()
        .await
        .expect("liveness body should be JSON");
    assert_eq!(body, serde_json::json!({"message": "CodeGuard is active!"}));

    let history = reqwest::get(format!("http://{}/history", addr))
        .await
        .expect("history request should succeed");
    assert_eq!(history.status(), reqwest::StatusCode::OK);
    let body = history
        .json::<serde_json::Value>()
        .await
        .expect("history body should be JSON");
    assert_eq!(body, serde_json::json!({"history": []}));

    // Browser clients from any origin may call the API.
    let preflight = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("http://{}/analyze", addr))
        .header("origin", "http://example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .expect("preflight request should succeed");
    assert_eq!(
        preflight
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let _ = shutdown.send(());
    let _ = task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_with_offline_store_reports_review_and_offline_status() {
    let provider = Router::new().route(
        "/v1beta/models/gemini-1.5-flash:generateContent",
        post(generate_ok),
    );
    let (provider_addr, provider_shutdown, provider_task) = spawn_server(provider).await;

    let app = router_with_state(AppState {
        review: Some(stub_review_client(provider_addr)),
        archive: ArchiveStore::offline(),
    });
    let (addr, shutdown, task) = spawn_server(app).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .json(&serde_json::json!({"code": "print(1)"}))
        .send()
        .await
        .expect("analyze request should succeed");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let body = resp
        .json::<serde_json::Value>()
        .await
        .expect("analyze body should be JSON");
    assert_eq!(
        body,
        serde_json::json!({
            "audit_report": "No issues found.",
            "db_status": "Analysis complete (DB offline)",
        })
    );

    let _ = shutdown.send(());
    let _ = provider_shutdown.send(());
    let _ = task.await;
    let _ = provider_task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_surfaces_the_provider_error_verbatim() {
    let provider = Router::new().route(
        "/v1beta/models/gemini-1.5-flash:generateContent",
        post(generate_denied),
    );
    let (provider_addr, provider_shutdown, provider_task) = spawn_server(provider).await;

    let app = router_with_state(AppState {
        review: Some(stub_review_client(provider_addr)),
        archive: ArchiveStore::offline(),
    });
    let (addr, shutdown, task) = spawn_server(app).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .json(&serde_json::json!({"code": "print(1)"}))
        .send()
        .await
        .expect("analyze request should succeed");

    // Failures still ride on a 200 status; the payload carries the error.
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = resp
        .json::<serde_json::Value>()
        .await
        .expect("analyze body should be JSON");
    assert_eq!(body, serde_json::json!({"error": "invalid API key"}));

    let _ = shutdown.send(());
    let _ = provider_shutdown.send(());
    let _ = task.await;
    let _ = provider_task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_without_credential_fails_closed() {
    let app = router_with_state(AppState {
        review: None,
        archive: ArchiveStore::offline(),
    });
    let (addr, shutdown, task) = spawn_server(app).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .json(&serde_json::json!({"code": "print(1)"}))
        .send()
        .await
        .expect("analyze request should succeed");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let body = resp
        .json::<serde_json::Value>()
        .await
        .expect("analyze body should be JSON");
    let error = body
        .get("error")
        .and_then(|v| v.as_str())
        .expect("payload should carry an error");
    assert!(error.contains("GEMINI_API_KEY"));

    let _ = shutdown.send(());
    let _ = task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_body_yields_an_error_payload() {
    let app = router_with_state(AppState {
        review: None,
        archive: ArchiveStore::offline(),
    });
    let (addr, shutdown, task) = spawn_server(app).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("analyze request should succeed");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let body = resp
        .json::<serde_json::Value>()
        .await
        .expect("analyze body should be JSON");
    assert_eq!(body, serde_json::json!({"error": "invalid JSON body"}));

    let _ = shutdown.send(());
    let _ = task.await;
}
