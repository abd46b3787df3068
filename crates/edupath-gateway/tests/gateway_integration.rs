#![allow(clippy::unwrap_used, clippy::expect_used)]

use edupath_auth::TokenService;
use edupath_core::UserProfile;
use edupath_discovery::{RegistryClient, RegistryConfig, ServiceResolver, StaticResolver};
use edupath_gateway::{
    AppState, AuthConfig, GatewayServer, ProxyClient, RouteRule, RouteTable, SessionManager,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestGateway {
    addr: String,
    sessions: Arc<SessionManager>,
    tokens: Arc<TokenService>,
}

fn rule(prefix: &str, service: &str) -> RouteRule {
    RouteRule {
        prefix: prefix.to_string(),
        service: service.to_string(),
        strip_prefix: true,
    }
}

fn authority(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

/// Helper: serve a gateway on a random port with a static resolver.
async fn start_gateway(
    routes: Vec<RouteRule>,
    addresses: HashMap<String, String>,
    auth_enabled: bool,
) -> TestGateway {
    start_gateway_with_resolver(routes, Arc::new(StaticResolver::new(addresses)), auth_enabled)
        .await
}

async fn start_gateway_with_resolver(
    routes: Vec<RouteRule>,
    resolver: Arc<dyn ServiceResolver>,
    auth_enabled: bool,
) -> TestGateway {
    let sessions = SessionManager::new();
    let tokens = Arc::new(TokenService::new("test-secret", 24));
    let state = Arc::new(AppState {
        sessions: sessions.clone(),
        routes: RouteTable::new(routes),
        resolver,
        proxy: ProxyClient::new(Duration::from_secs(1)).unwrap(),
        tokens: tokens.clone(),
        auth: AuthConfig::new(auth_enabled),
    });
    let app = GatewayServer::build(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestGateway {
        addr,
        sessions,
        tokens,
    }
}

fn bearer(tokens: &TokenService) -> String {
    let user = UserProfile {
        id: "1".to_string(),
        name: "amina".to_string(),
        role: "teacher".to_string(),
    };
    tokens.issue(&user).unwrap()
}

#[tokio::test]
async fn health_requires_no_credential() {
    let gw = start_gateway(vec![], HashMap::new(), true).await;
    let resp = reqwest::get(format!("http://{}/health", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "edupath-gateway");
}

#[tokio::test]
async fn login_issues_a_verifiable_token() {
    let gw = start_gateway(vec![], HashMap::new(), true).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/login", gw.addr))
        .json(&serde_json::json!({"username": "amina", "password": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["name"], "amina");

    let claims = gw
        .tokens
        .verify(body["accessToken"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.name, "amina");
}

#[tokio::test]
async fn login_rejects_empty_username() {
    let gw = start_gateway(vec![], HashMap::new(), true).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{}/login", gw.addr))
        .json(&serde_json::json!({"username": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn missing_token_is_rejected_before_any_proxying() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let mut addresses = HashMap::new();
    addresses.insert("student-profiler".to_string(), authority(&upstream));
    let gw = start_gateway(
        vec![rule("/api/profiler", "student-profiler")],
        addresses,
        true,
    )
    .await;

    let resp = reqwest::get(format!("http://{}/api/profiler/summary", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");
    // Dropping `upstream` verifies the zero-call expectation.
}

#[tokio::test]
async fn forged_and_expired_tokens_get_distinct_rejections() {
    let gw = start_gateway(
        vec![rule("/api/profiler", "student-profiler")],
        HashMap::new(),
        true,
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/profiler/summary", gw.addr);

    let forged = TokenService::new("other-secret", 24);
    let resp = client
        .get(&url)
        .bearer_auth(bearer(&forged))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credential");
    assert_eq!(body["detail"], "token verification failed");

    let expired = TokenService::new("test-secret", -1);
    let resp = client
        .get(&url)
        .bearer_auth(bearer(&expired))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "token expired");
}

#[tokio::test]
async fn valid_token_is_proxied_with_prefix_stripped() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"students": 150})),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let mut addresses = HashMap::new();
    addresses.insert("student-profiler".to_string(), authority(&upstream));
    let gw = start_gateway(
        vec![rule("/api/profiler", "student-profiler")],
        addresses,
        true,
    )
    .await;

    let resp = reqwest::Client::new()
        .get(format!("http://{}/api/profiler/summary", gw.addr))
        .bearer_auth(bearer(&gw.tokens))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["students"], 150);
}

#[tokio::test]
async fn overlapping_prefixes_route_in_declared_order() {
    let reports = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weekly"))
        .respond_with(ResponseTemplate::new(200).set_body_string("reports"))
        .expect(1)
        .mount(&reports)
        .await;
    let profiler = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports/weekly"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&profiler)
        .await;

    let mut addresses = HashMap::new();
    addresses.insert("report-builder".to_string(), authority(&reports));
    addresses.insert("student-profiler".to_string(), authority(&profiler));
    let gw = start_gateway(
        vec![
            rule("/api/profiler/reports", "report-builder"),
            rule("/api/profiler", "student-profiler"),
        ],
        addresses,
        false,
    )
    .await;

    let resp = reqwest::get(format!("http://{}/api/profiler/reports/weekly", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "reports");
}

#[tokio::test]
async fn empty_discovery_result_routes_to_the_fallback_target() {
    let registry = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/student-profiler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&registry)
        .await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from-fallback"))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut fallbacks = HashMap::new();
    fallbacks.insert("student-profiler".to_string(), authority(&upstream));
    let resolver =
        RegistryClient::new(RegistryConfig::new(registry.uri()), fallbacks).unwrap();

    let gw = start_gateway_with_resolver(
        vec![rule("/api/profiler", "student-profiler")],
        Arc::new(resolver),
        false,
    )
    .await;

    let resp = reqwest::get(format!("http://{}/api/profiler/summary", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "from-fallback");
}

#[tokio::test]
async fn unmatched_route_echoes_the_attempted_path() {
    let gw = start_gateway(
        vec![rule("/api/profiler", "student-profiler")],
        HashMap::new(),
        false,
    )
    .await;
    let resp = reqwest::get(format!("http://{}/api/nothing/here", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "route_not_found");
    assert_eq!(body["path"], "/api/nothing/here");
}

#[tokio::test]
async fn unreachable_upstream_yields_uniform_error_naming_the_service() {
    let mut addresses = HashMap::new();
    addresses.insert("student-profiler".to_string(), "127.0.0.1:1".to_string());
    let gw = start_gateway(
        vec![rule("/api/profiler", "student-profiler")],
        addresses,
        false,
    )
    .await;

    let resp = reqwest::get(format!("http://{}/api/profiler/summary", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "upstream_unreachable");
    assert_eq!(body["service"], "student-profiler");
    assert!(!body["detail"].as_str().unwrap().contains("127.0.0.1"));
}

#[tokio::test]
async fn cors_headers_are_added_uniformly() {
    let gw = start_gateway(vec![], HashMap::new(), false).await;
    let resp = reqwest::Client::new()
        .get(format!("http://{}/health", gw.addr))
        .header("origin", "http://console.edupath.local")
        .send()
        .await
        .unwrap();
    assert!(resp
        .headers()
        .contains_key("access-control-allow-origin"));
}

/// Connect a realtime client, skipping the welcome event.
async fn connect_realtime(
    addr: &str,
    token: Option<&str>,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = match token {
        Some(t) => format!("ws://{addr}/ws?token={t}"),
        None => format!("ws://{addr}/ws"),
    };
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let welcome = ws.next().await.unwrap().unwrap();
    let welcome: serde_json::Value =
        serde_json::from_str(&welcome.into_text().unwrap()).unwrap();
    assert_eq!(welcome["event"], "connected");
    ws
}

#[tokio::test]
async fn broadcast_reaches_every_session_in_order() {
    let gw = start_gateway(vec![], HashMap::new(), true).await;
    let token = bearer(&gw.tokens);
    let mut first = connect_realtime(&gw.addr, Some(&token)).await;
    let mut second = connect_realtime(&gw.addr, Some(&token)).await;
    assert_eq!(gw.sessions.session_count().await, 2);

    gw.sessions
        .broadcast(
            "profile_alert",
            &serde_json::json!({"studentId": 42, "riskLevel": "High"}),
        )
        .await;
    gw.sessions
        .broadcast("profile_alert", &serde_json::json!({"studentId": 7}))
        .await;

    for ws in [&mut first, &mut second] {
        let msg = ws.next().await.unwrap().unwrap();
        let event: serde_json::Value =
            serde_json::from_str(&msg.into_text().unwrap()).unwrap();
        assert_eq!(event["event"], "profile_alert");
        assert_eq!(event["payload"]["riskLevel"], "High");

        let msg = ws.next().await.unwrap().unwrap();
        let event: serde_json::Value =
            serde_json::from_str(&msg.into_text().unwrap()).unwrap();
        assert_eq!(event["payload"]["studentId"], 7);
    }
}

#[tokio::test]
async fn realtime_endpoint_requires_a_token_when_auth_is_enabled() {
    let gw = start_gateway(vec![], HashMap::new(), true).await;
    let url = format!("ws://{}/ws", gw.addr);
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn disconnected_client_is_removed_from_the_session_set() {
    let gw = start_gateway(vec![], HashMap::new(), false).await;
    let ws = connect_realtime(&gw.addr, None).await;
    assert_eq!(gw.sessions.session_count().await, 1);

    drop(ws);
    // Give the connection task a moment to observe the close.
    for _ in 0..50 {
        if gw.sessions.session_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(gw.sessions.session_count().await, 0);
}
