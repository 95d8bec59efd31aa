//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::identity::IdentityProvider;
use crate::routes;
use crate::services::CodeDelivery;
use crate::store::{IssueRepository, LeaseRepository, ProfileRepository};
use crate::types::CivicError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted callable body
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub issues: Arc<dyn IssueRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub leases: Arc<dyn LeaseRepository>,
    pub identities: Arc<dyn IdentityProvider>,
    /// Channel for verification mail
    pub delivery: Arc<dyn CodeDelivery>,
    pub jwt: JwtValidator,
    /// Which store backs the repositories, for health output
    pub store_backend: &'static str,
}

impl AppState {
    /// Build state over a single store implementing every repository
    pub fn new<S>(
        args: Args,
        store: Arc<S>,
        identities: Arc<dyn IdentityProvider>,
        delivery: Arc<dyn CodeDelivery>,
        jwt: JwtValidator,
    ) -> Self
    where
        S: IssueRepository + ProfileRepository + LeaseRepository + 'static,
    {
        Self {
            args,
            issues: store.clone(),
            profiles: store.clone(),
            leases: store,
            identities,
            delivery,
            jwt,
            store_backend: "memory",
        }
    }

    pub fn with_store_backend(mut self, backend: &'static str) -> Self {
        self.store_backend = backend;
        self
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), CivicError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Civic Watch listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory fallbacks and log-only mail");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(&state))
        }

        (Method::GET, "/version") => to_boxed(routes::version_info()),

        // CORS preflight
        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        (Method::POST, p) if procedure_name(p).is_some() => {
            let procedure = procedure_name(p).unwrap_or_default().to_string();
            let auth_header = req
                .headers()
                .get(hyper::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string);

            let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!("Rejected request body from {}: {}", addr, e);
                    return Ok(to_boxed(payload_too_large_response()));
                }
            };

            to_boxed(
                routes::handle_callable(&state, &procedure, auth_header.as_deref(), &body).await,
            )
        }

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

/// Procedure named by a callable path, `/api/<name>`
fn procedure_name(path: &str) -> Option<&str> {
    path.strip_prefix("/api/").filter(|name| !name.is_empty())
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Authorization, Content-Type")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": {
            "status": "NOT_FOUND",
            "message": format!("No route for {}", path),
        }
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn payload_too_large_response() -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": {
            "status": "INVALID_ARGUMENT",
            "message": "Request body is too large or unreadable.",
        }
    });

    Response::builder()
        .status(StatusCode::PAYLOAD_TOO_LARGE)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
