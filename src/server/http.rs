//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::auth::tokens::TokenCodec;
use crate::config::Args;
use crate::db::store::UserStore;
use crate::routes;
use crate::session::SessionManager;
use crate::types::WicketError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn UserStore>,
    pub codec: TokenCodec,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(args: Args, store: Arc<dyn UserStore>) -> Result<Self, WicketError> {
        let codec = TokenCodec::new(
            args.access_token_secret.clone(),
            args.access_token_ttl_secs,
            args.refresh_token_secret.clone(),
            args.refresh_token_ttl_secs,
        )?;
        let sessions = SessionManager::new(Arc::clone(&store), codec.clone());

        Ok(Self {
            args,
            store,
            codec,
            sessions,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), WicketError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Wicket listening on {}", state.args.listen);

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
                        .preserve_header_case(true)
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

    // Auth routes (/auth/*) consume the request
    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => to_boxed(routes::health_check()),

        (Method::GET, "/version") => to_boxed(routes::version_info()),

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(format!(
            r#"{{"error":"not found: {}"}}"#,
            path
        ))))
        .unwrap()
}
