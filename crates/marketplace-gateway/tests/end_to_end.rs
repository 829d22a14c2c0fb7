//! Issuer, gateway and a downstream service wired together over real sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    routing::get,
};
use http_body_util::BodyExt;
use marketplace_gateway::{Gateway, GatewayConfig, RouteConfig, TrustedIdentity};
use marketplace_issuer::{IdentityIssuer, IssuerConfig, IssuerServer, SledStore};
use marketplace_token::{SigningSecret, TokenCodec};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "end-to-end-shared-secret-0123456789abcdef";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start_issuer(dir: &TempDir) -> String {
    let store = SledStore::open(dir.path()).unwrap();
    let codec = TokenCodec::hs256(&SigningSecret::parse(SECRET).unwrap());
    let issuer = IdentityIssuer::new(Arc::new(store), codec, Duration::from_secs(3600));
    let config = IssuerConfig::builder().jwt_secret(SECRET).build();
    serve(IssuerServer::with_issuer(config, issuer).router()).await
}

async fn inquiries(State(hits): State<Arc<AtomicUsize>>, identity: TrustedIdentity) -> String {
    hits.fetch_add(1, Ordering::SeqCst);
    format!("inquiries for {}", identity.subject())
}

async fn start_inquiry_service(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new()
        .route("/api/inquiries", get(inquiries))
        .with_state(hits);
    serve(app).await
}

struct Harness {
    _dir: TempDir,
    app: Router,
    hits: Arc<AtomicUsize>,
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let issuer = start_issuer(&dir).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let inquiry_service = start_inquiry_service(Arc::clone(&hits)).await;

        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .routes(vec![
                RouteConfig::new("/api/auth/**", issuer),
                RouteConfig::new("/api/inquiries", inquiry_service.clone()),
                RouteConfig::new("/api/inquiries/**", inquiry_service),
            ])
            .build();
        let app = Gateway::new(config).unwrap().app().unwrap();

        Self {
            _dir: dir,
            app,
            hits,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    async fn get_inquiries(&self, authorization: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/api/inquiries");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        let (status, bytes) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, String::from_utf8(bytes).unwrap())
    }
}

fn flip_signature_char(token: &str) -> String {
    let (head, signature) = token.rsplit_once('.').unwrap();
    let mut chars: Vec<char> = signature.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    format!("{head}.{}", chars.into_iter().collect::<String>())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_register_login_and_access_protected_route() {
    let harness = Harness::start().await;

    let (status, created) = harness
        .post_json(
            "/api/auth/register",
            serde_json::json!({
                "username": "alice",
                "email": "alice@x.com",
                "password": "password123",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["username"], "alice");

    let (status, login) = harness
        .post_json(
            "/api/auth/login",
            serde_json::json!({"username": "alice", "password": "password123"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap().to_string();

    let (status, body) = harness
        .get_inquiries(Some(&format!("Bearer {token}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "inquiries for alice");
    assert_eq!(harness.hits.load(Ordering::SeqCst), 1);

    let tampered = flip_signature_char(&token);
    let (status, body) = harness
        .get_inquiries(Some(&format!("Bearer {tampered}")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_empty());

    let (status, body) = harness.get_inquiries(None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_empty());

    assert_eq!(harness.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_password_through_gateway() {
    let harness = Harness::start().await;

    harness
        .post_json(
            "/api/auth/register",
            serde_json::json!({
                "username": "bob",
                "email": "bob@x.com",
                "password": "password123",
            }),
        )
        .await;

    let (status, body) = harness
        .post_json(
            "/api/auth/login",
            serde_json::json!({"username": "bob", "password": "wrong-password"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid username or password");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_registration_through_gateway() {
    let harness = Harness::start().await;
    let alice = serde_json::json!({
        "username": "alice",
        "email": "alice@x.com",
        "password": "password123",
    });

    let (first, _) = harness.post_json("/api/auth/register", alice.clone()).await;
    let (second, body) = harness.post_json("/api/auth/register", alice).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username is already registered");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_token_from_other_secret_is_rejected() {
    let harness = Harness::start().await;
    let foreign = TokenCodec::hs256(&SigningSecret::generate())
        .sign("alice", &["user".to_string()], Duration::from_secs(60))
        .unwrap();

    let (status, _) = harness
        .get_inquiries(Some(&format!("Bearer {}", foreign.token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dot_segments_cannot_escape_public_prefix() {
    let harness = Harness::start().await;

    for path in [
        "/api/auth/../inquiries",
        "/api/auth/%2e%2e/inquiries",
        "/api/auth/..%2finquiries",
    ] {
        let request = Request::builder()
            .uri(path)
            .header("x-user-id", "alice")
            .body(Body::empty())
            .unwrap();
        let (status, body) = harness.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert!(body.is_empty());
    }

    assert_eq!(harness.hits.load(Ordering::SeqCst), 0);
}
