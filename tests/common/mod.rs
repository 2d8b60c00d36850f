//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use edge_gateway::config::GatewayConfig;
use edge_gateway::http::{ForwardError, Forwarder, HttpServer};
use edge_gateway::lifecycle::{build_verifier, Shutdown};
use edge_gateway::observability::{PipelineObserver, SecurityOutcome, TraceInfo};
use edge_gateway::pipeline::FilterPipeline;

pub const PUBLIC_KEY: &str = include_str!("../fixtures/gateway_signing.pub");
pub const PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/gateway_signing.pem");

/// Gateway config with the fixture key, a login whitelist and a profile
/// path exempt from menu checks.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.public_key = Some(PUBLIC_KEY.to_string());
    config.auth.whitelist = vec!["/auth/**".into(), "/public/*".into()];
    config.auth.menu_permission_whitelist = vec!["/api/profile/**".into()];
    config.observability.metrics_enabled = false;
    config
}

pub fn claims_with_menus(menus: Value) -> Value {
    json!({
        "sub": "1001",
        "username": "alice",
        "roles": ["admin", {"name": "auditor"}],
        "menus": menus,
        "exp": get_current_timestamp() + 600,
    })
}

pub fn mint_token(claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap(),
    )
    .unwrap()
}

pub fn bearer(claims: &Value) -> String {
    format!("Bearer {}", mint_token(claims))
}

/// Forwarder that answers 200 and mirrors the request headers it received.
pub struct EchoForwarder;

impl Forwarder for EchoForwarder {
    fn forward(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response, ForwardError>> {
        Box::pin(async move {
            let mut response = Response::new(Body::empty());
            *response.headers_mut() = request.headers().clone();
            Ok(response)
        })
    }
}

/// Forwarder that never answers.
pub struct PendingForwarder;

impl Forwarder for PendingForwarder {
    fn forward(&self, _request: Request<Body>) -> BoxFuture<'_, Result<Response, ForwardError>> {
        Box::pin(std::future::pending::<Result<Response, ForwardError>>())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub outcomes: Mutex<Vec<SecurityOutcome>>,
    pub finished: Mutex<Vec<Option<StatusCode>>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_security_outcome(&self, _trace: &TraceInfo, outcome: SecurityOutcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }

    fn on_request_finished(
        &self,
        _trace: &TraceInfo,
        _method: &Method,
        status: Option<StatusCode>,
        _elapsed: Duration,
    ) {
        self.finished.lock().unwrap().push(status);
    }
}

pub fn pipeline_with(
    config: &GatewayConfig,
    forwarder: Arc<dyn Forwarder>,
    observer: Arc<dyn PipelineObserver>,
) -> FilterPipeline {
    FilterPipeline::from_config(config, build_verifier(config).unwrap(), forwarder, observer)
}

/// Full router (middleware layers included) over an echo forwarder.
pub fn router_with(config: GatewayConfig, observer: Arc<dyn PipelineObserver>) -> Router {
    let pipeline = pipeline_with(&config, Arc::new(EchoForwarder), observer);
    HttpServer::new(config, pipeline).router()
}

/// Start an upstream that answers with the path and headers it received.
pub async fn start_echo_upstream() -> SocketAddr {
    async fn echo(request: Request<Body>) -> Json<Value> {
        Json(json!({
            "path": request.uri().path(),
            "headers": header_json(request.headers()),
        }))
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/{*path}", any(echo)).route("/", any(echo));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn header_json(headers: &HeaderMap) -> Value {
    let map: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.to_string(), Value::String(value))
        })
        .collect();
    Value::Object(map)
}

/// Start the gateway on an ephemeral port. Returns its address and the
/// handle that stops it.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let pipeline = edge_gateway::lifecycle::build_pipeline(&config, Arc::new(RecordingObserver::default()))
        .unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, pipeline);
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.run(listener, &shutdown).await.unwrap();
        })
    };
    (addr, shutdown, handle)
}
