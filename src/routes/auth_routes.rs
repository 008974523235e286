//! HTTP Routes for Authentication
//!
//! REST API endpoints for the credential and session lifecycle:
//! - POST /auth/register        - Create an account
//! - POST /auth/login           - Authenticate and receive a token pair
//! - POST /auth/refresh         - Rotate the refresh token for a new pair
//! - POST /auth/logout          - Revoke the stored refresh token
//! - POST /auth/change-password - Verify old password, store a new hash
//! - GET  /auth/me              - Current principal from the access token
//!
//! Tokens travel two ways: httpOnly cookies (set on login/refresh, cleared
//! on logout) for browser clients, and the response body plus Authorization
//! header for programmatic clients. The refresh endpoint prefers the cookie
//! and falls back to a `refreshToken` body field.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{authenticate, password, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::db::schemas::PublicUser;
use crate::db::store::NewUser;
use crate::server::AppState;
use crate::session::Session;
use crate::types::WicketError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Username or email; either field name is accepted
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: PublicUser,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

// =============================================================================
// Response Helpers
// =============================================================================

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Map an internal error onto the wire. Every unauthorized-class failure
/// gets the same body so callers cannot distinguish a bad signature from an
/// expired or replayed token; the real cause goes to the log.
fn error_response(err: WicketError) -> Response<BoxBody> {
    let status = err.status_code();

    if status == StatusCode::UNAUTHORIZED {
        warn!("request rejected: {}", err);
        return json_response(
            status,
            &ErrorResponse {
                error: "unauthorized".into(),
                code: Some("UNAUTHORIZED".into()),
            },
        );
    }

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("request failed: {}", err);
        return json_response(
            status,
            &ErrorResponse {
                error: "internal error".into(),
                code: Some("INTERNAL_ERROR".into()),
            },
        );
    }

    json_response(
        status,
        &ErrorResponse {
            error: err.to_string(),
            code: None,
        },
    )
}

/// Largest JSON body any auth endpoint accepts.
const MAX_BODY_BYTES: usize = 10240;

async fn parse_json_body<T, B>(req: Request<B>) -> Result<T, WicketError>
where
    T: for<'de> Deserialize<'de>,
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    // Reject a declared-oversize body before buffering anything.
    if let Some(len) = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if len > MAX_BODY_BYTES {
            return Err(WicketError::BadRequest("request body too large".into()));
        }
    }

    // Chunked bodies carry no length up front; Limited aborts collection
    // the moment the cap is crossed instead of buffering the whole body.
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| WicketError::BadRequest(format!("failed to read body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| WicketError::BadRequest(format!("invalid JSON: {}", e)))
}

fn get_auth_header(req: &Request<hyper::body::Incoming>) -> Option<String> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn get_cookie_header(req: &Request<hyper::body::Incoming>) -> Option<String> {
    req.headers()
        .get(hyper::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn session_cookie(name: &str, value: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; Secure; SameSite=Strict",
        name, value, max_age_secs
    )
}

fn clear_cookie(name: &str) -> String {
    format!("{}=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Strict", name)
}

/// Session response with both tokens as httpOnly cookies.
fn session_response(state: &AppState, session: Session) -> Response<BoxBody> {
    let access_cookie = session_cookie(
        ACCESS_COOKIE,
        &session.access_token,
        state.args.access_token_ttl_secs,
    );
    let refresh_cookie = session_cookie(
        REFRESH_COOKIE,
        &session.refresh_token,
        state.args.refresh_token_ttl_secs,
    );

    let body = SessionResponse {
        user: session.user,
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header(hyper::header::SET_COOKIE, access_cookie)
        .header(hyper::header::SET_COOKIE, refresh_cookie)
        .body(full_body(json))
        .unwrap()
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/register
///
/// Create an account. The password is hashed before anything is stored;
/// no tokens are issued here, the client logs in afterwards.
async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, WicketError> {
    let body: RegisterRequest = parse_json_body(req).await?;

    if body.username.trim().is_empty()
        || body.email.trim().is_empty()
        || body.full_name.trim().is_empty()
        || body.password.is_empty()
    {
        return Err(WicketError::BadRequest(
            "missing required fields: username, email, fullName, password".into(),
        ));
    }

    if body.password.len() < 8 {
        return Err(WicketError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }

    let plaintext = body.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash(&plaintext))
        .await
        .map_err(|e| WicketError::Internal(format!("hashing task failed: {}", e)))??;

    let user = state
        .store
        .create(NewUser {
            username: body.username,
            email: body.email,
            full_name: body.full_name,
            password_hash,
        })
        .await?;

    info!("registered new user: {}", user.username);

    Ok(json_response(
        StatusCode::CREATED,
        &RegisterResponse {
            user: user.to_public(),
            message: "account created".into(),
        },
    ))
}

/// POST /auth/login
async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, WicketError> {
    let body: LoginRequest = parse_json_body(req).await?;

    let identifier = if !body.username.trim().is_empty() {
        body.username.as_str()
    } else {
        body.email.as_str()
    };

    let session = state.sessions.login(identifier, &body.password).await?;
    Ok(session_response(&state, session))
}

/// POST /auth/refresh
///
/// Cookie first, JSON body as fallback. An empty request with no cookie is
/// a plain 401.
async fn handle_refresh(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, WicketError> {
    let cookie_header = get_cookie_header(&req);
    let from_cookie = crate::auth::gate::cookie_value(cookie_header.as_deref(), REFRESH_COOKIE);

    let presented = match from_cookie {
        Some(token) => token.to_string(),
        None => {
            let body: RefreshRequest = parse_json_body(req).await.unwrap_or_default();
            body.refresh_token
        }
    };

    let session = state.sessions.refresh(&presented).await?;
    Ok(session_response(&state, session))
}

/// POST /auth/logout
///
/// Requires a valid access token. Clears the stored refresh token and both
/// cookies; repeating the call is harmless.
async fn handle_logout(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, WicketError> {
    let principal = gate(&req, &state).await?;
    let id = parse_principal_id(&principal)?;

    state.sessions.logout(&id).await?;

    let body = SuccessResponse {
        success: true,
        message: "logged out".into(),
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header(hyper::header::SET_COOKIE, clear_cookie(ACCESS_COOKIE))
        .header(hyper::header::SET_COOKIE, clear_cookie(REFRESH_COOKIE))
        .body(full_body(json))
        .unwrap())
}

/// POST /auth/change-password
async fn handle_change_password(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, WicketError> {
    let principal = gate(&req, &state).await?;
    let id = parse_principal_id(&principal)?;

    let body: ChangePasswordRequest = parse_json_body(req).await?;

    state
        .sessions
        .change_password(
            &id,
            &body.old_password,
            &body.new_password,
            &body.confirm_new_password,
        )
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "password changed".into(),
        },
    ))
}

/// GET /auth/me
async fn handle_me(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, WicketError> {
    let principal = gate(&req, &state).await?;
    Ok(json_response(StatusCode::OK, &principal))
}

/// Run the auth gate against this request's cookie and Authorization headers.
async fn gate(
    req: &Request<hyper::body::Incoming>,
    state: &AppState,
) -> Result<PublicUser, WicketError> {
    let cookie_header = get_cookie_header(req);
    let auth_header = get_auth_header(req);
    authenticate(
        state.store.as_ref(),
        &state.codec,
        cookie_header.as_deref(),
        auth_header.as_deref(),
    )
    .await
}

fn parse_principal_id(principal: &PublicUser) -> Result<ObjectId, WicketError> {
    ObjectId::parse_str(&principal.id)
        .map_err(|_| WicketError::Unauthorized("invalid access token".into()))
}

// =============================================================================
// Router
// =============================================================================

/// Route an /auth/* request. Returns None for paths outside /auth so the
/// caller can try other routers.
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/auth") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path);

    let response = match (method, path) {
        (&Method::POST, "/auth/register") => handle_register(req, state).await,
        (&Method::POST, "/auth/login") => handle_login(req, state).await,
        (&Method::POST, "/auth/refresh") => handle_refresh(req, state).await,
        (&Method::POST, "/auth/logout") => handle_logout(req, state).await,
        (&Method::POST, "/auth/change-password") => handle_change_password(req, state).await,
        (&Method::GET, "/auth/me") => handle_me(req, state).await,

        // Method not allowed
        (_, "/auth/register")
        | (_, "/auth/login")
        | (_, "/auth/refresh")
        | (_, "/auth/logout")
        | (_, "/auth/change-password")
        | (_, "/auth/me") => {
            return Some(json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorResponse {
                    error: "method not allowed".into(),
                    code: None,
                },
            ))
        }

        _ => {
            return Some(json_response(
                StatusCode::NOT_FOUND,
                &ErrorResponse {
                    error: "not found".into(),
                    code: None,
                },
            ))
        }
    };

    Some(response.unwrap_or_else(error_response))
}
