//! REST API server for CertChain
//!
//! Thin HTTP layer over [`Service`]. Mining is CPU-bound, so issuance and
//! chain validation run on the blocking thread pool.

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

use crate::certificate::{Certificate, IssueRequest};
use crate::config::ServerConfig;
use crate::error::ChainError;
use crate::service::{Service, Verification};

/// Shared state handed to every handler.
pub struct ApiNode {
    pub service: Service,
    api_stats: RwLock<ApiStats>,
}

#[derive(Debug)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    certificates_issued: u64,
    start_time: Instant,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            certificates_issued: 0,
            start_time: Instant::now(),
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl ApiNode {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            api_stats: RwLock::new(ApiStats::new()),
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            certificates_issued: stats.certificates_issued,
            uptime_seconds: stats.start_time.elapsed().as_secs(),
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Chain(ChainError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Chain(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Chain(e) => {
                tracing::error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Chain(err)
    }
}

/// A body axum cannot decode is bad input like any other: 400 with `{error}`.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Chain(ChainError::InvalidInput(rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub success: bool,
    pub message: String,
    pub certificate: Certificate,
    pub block_hash: String,
}

#[derive(Serialize)]
pub struct CertificateListResponse {
    pub certificates: Vec<Certificate>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub certificates_issued: u64,
    pub uptime_seconds: u64,
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(node): State<Arc<ApiNode>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    node.api_stats.write().await.record_request(success);

    response
}

/// Logs method, path, status and duration of every API request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router. Unknown paths fall through to files in `static_dir`.
pub fn build_api_router(node: Arc<ApiNode>, static_dir: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/issue", post(issue_certificate))
        .route("/verify/:id", get(verify_certificate))
        .route("/certificates", get(list_certificates))
        .route("/chain", get(get_chain))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .with_state(node);

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
}

/// Serve the API until the process is stopped.
pub async fn run_api_server(
    node: Arc<ApiNode>,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(node, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn issue_certificate(
    State(node): State<Arc<ApiNode>>,
    body: Result<Json<IssueRequest>, JsonRejection>,
) -> Result<Json<IssueResponse>, ApiError> {
    let Json(req) = body?;
    let service = node.service.clone();
    let issued = tokio::task::spawn_blocking(move || service.issue(req))
        .await
        .map_err(|e| ApiError::Internal(format!("Issuance task failed: {}", e)))??;

    node.api_stats.write().await.certificates_issued += 1;

    Ok(Json(IssueResponse {
        success: true,
        message: "Certificate issued and recorded on local chain".to_string(),
        block_hash: issued.block.hash,
        certificate: issued.certificate,
    }))
}

async fn verify_certificate(
    State(node): State<Arc<ApiNode>>,
    Path(id): Path<String>,
) -> Result<Json<Verification>, ApiError> {
    let service = node.service.clone();
    let verification = tokio::task::spawn_blocking(move || service.verify(&id))
        .await
        .map_err(|e| ApiError::Internal(format!("Verification task failed: {}", e)))?;

    Ok(Json(verification))
}

async fn list_certificates(State(node): State<Arc<ApiNode>>) -> impl IntoResponse {
    let certificates = node.service.certificates();
    Json(CertificateListResponse {
        count: certificates.len(),
        certificates,
    })
}

async fn get_chain(State(node): State<Arc<ApiNode>>) -> Result<impl IntoResponse, ApiError> {
    let service = node.service.clone();
    let (chain, valid) = tokio::task::spawn_blocking(move || service.chain_report())
        .await
        .map_err(|e| ApiError::Internal(format!("Chain task failed: {}", e)))?;

    Ok(Json(serde_json::json!({
        "chain": chain,
        "valid": valid
    })))
}

async fn health_check(State(node): State<Arc<ApiNode>>) -> Result<impl IntoResponse, ApiError> {
    let service = node.service.clone();
    let (height, difficulty) =
        tokio::task::spawn_blocking(move || (service.height(), service.difficulty()))
            .await
            .map_err(|e| ApiError::Internal(format!("Health task failed: {}", e)))?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "height": height,
        "difficulty": difficulty,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn get_api_stats(State(node): State<Arc<ApiNode>>) -> impl IntoResponse {
    Json(node.get_stats().await)
}
