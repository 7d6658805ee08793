//! HTTP surface tests against the real router on an ephemeral port.
//!
//! Run with: cargo test --test http_routes

use std::net::SocketAddr;

use reqwest::StatusCode;
use valencloud::create_router;

/// Serve the router on 127.0.0.1:0 and return its base URL.
///
/// The server task belongs to the test's runtime and stops with it.
async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, create_router())
            .await
            .expect("server error");
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn root_returns_greeting() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{}/", base)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "Hello from ValenCloud!");
}

#[tokio::test]
async fn root_ignores_query_and_headers() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/?name=someone&debug=1", base))
        .header("accept", "application/json")
        .header("x-custom", "value")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Hello from ValenCloud!");
}

#[tokio::test]
async fn health_returns_status_ok() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"));
    assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn health_body_is_structured() {
    let base = spawn_server().await;
    let body: serde_json::Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn unknown_paths_are_404() {
    let base = spawn_server().await;
    for path in ["/nonexistent", "/health/", "/HEALTH", "/api/v1/health"] {
        let response = reqwest::get(format!("{}{}", base, path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {}", path);
    }
}

#[tokio::test]
async fn other_methods_are_404() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client.post(format!("{}/", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.delete(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeated_calls_are_identical() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    for path in ["/", "/health"] {
        let mut bodies = Vec::new();
        for _ in 0..5 {
            let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            bodies.push(response.text().await.unwrap());
        }
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]), "path {}", path);
    }
}

#[tokio::test]
async fn concurrent_requests_are_served() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let requests = (0..32).map(|i| {
        let client = client.clone();
        let url = if i % 2 == 0 {
            format!("{}/", base)
        } else {
            format!("{}/health", base)
        };
        async move { client.get(url).send().await.map(|r| r.status()) }
    });

    for status in futures::future::join_all(requests).await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }
}
