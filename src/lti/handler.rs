//! HTTP handlers for the LTI endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`/`POST` | `/lti/login` | OIDC third-party initiated login |
//! | `POST` | `/lti/callback` | Launch (`id_token` + `state`, form post) |
//! | `GET` | `/lti/jwks` | The tool's public key set |
//! | `GET` | `/health` | Liveness probe |
//!
//! All errors are JSON: `{"error": "<code>", "message": "<text>"}`.

use std::{net::IpAddr, sync::Arc};

use axum::{
    Form, Json, Router,
    extract::{Query, State, rejection::{FormRejection, QueryRejection}},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{
    LtiTool,
    audit::{self, AuditEvent},
    login::LoginRequest,
};

/// Launch form posted by the platform (`response_mode=form_post`).
#[derive(Debug, Default, Deserialize)]
pub struct CallbackForm {
    /// Signed OIDC `id_token`.
    #[serde(default)]
    pub id_token: Option<String>,
    /// The `state` issued at login.
    #[serde(default)]
    pub state: Option<String>,
    /// OIDC error code when the platform refused the login.
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable detail for `error`.
    #[serde(default)]
    pub error_description: Option<String>,
}

// ── Route builder ─────────────────────────────────────────────────────────

/// Build the LTI routes.
pub fn lti_routes(tool: Arc<LtiTool>) -> Router {
    Router::new()
        .route("/lti/login", get(login_get).post(login_post))
        .route("/lti/callback", post(callback))
        .route("/lti/jwks", get(jwks))
        .route("/health", get(health))
        .with_state(tool)
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// Extract client IP from `X-Forwarded-For` or `X-Real-IP` headers.
fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        })
}

/// `GET /lti/login`: login initiation with query parameters.
async fn login_get(
    State(tool): State<Arc<LtiTool>>,
    headers: HeaderMap,
    request: Result<Query<LoginRequest>, QueryRejection>,
) -> Response {
    match request {
        Ok(Query(request)) => initiate(&tool, &request, extract_client_ip(&headers)).await,
        Err(e) => invalid_login(&e.body_text(), extract_client_ip(&headers)),
    }
}

/// `POST /lti/login`: login initiation with a form body.
async fn login_post(
    State(tool): State<Arc<LtiTool>>,
    headers: HeaderMap,
    request: Result<Form<LoginRequest>, FormRejection>,
) -> Response {
    match request {
        Ok(Form(request)) => initiate(&tool, &request, extract_client_ip(&headers)).await,
        Err(e) => invalid_login(&e.body_text(), extract_client_ip(&headers)),
    }
}

async fn initiate(tool: &LtiTool, request: &LoginRequest, client_ip: Option<IpAddr>) -> Response {
    match tool.initiate_login(request).await {
        Ok(redirect) => {
            let ev = AuditEvent::login_initiated(
                &redirect.state,
                &request.iss,
                request.lti_deployment_id.as_deref(),
                client_ip,
            );
            audit::emit(&ev);
            Redirect::to(redirect.url.as_str()).into_response()
        }
        Err(e) => {
            let ev = AuditEvent::login_rejected(&request.iss, &e, client_ip);
            audit::emit(&ev);
            e.into_response()
        }
    }
}

fn invalid_login(detail: &str, client_ip: Option<IpAddr>) -> Response {
    warn!(detail = %detail, "Malformed login initiation request");
    audit::emit(&AuditEvent::login_malformed(detail, client_ip));
    error_response(
        StatusCode::BAD_REQUEST,
        "invalid_request",
        "iss, login_hint and target_link_uri are required",
    )
}

/// `POST /lti/callback`: validate the launch and redirect to its landing path.
///
/// A missing `state` is treated like an unknown one; a missing `id_token`
/// still burns the supplied `state`.
async fn callback(
    State(tool): State<Arc<LtiTool>>,
    headers: HeaderMap,
    form: Result<Form<CallbackForm>, FormRejection>,
) -> Response {
    let client_ip = extract_client_ip(&headers);
    let form = match form {
        Ok(Form(form)) => form,
        Err(e) => {
            warn!(detail = %e.body_text(), "Malformed launch request");
            CallbackForm::default()
        }
    };

    if let Some(ref error) = form.error {
        warn!(
            error = %error,
            description = form.error_description.as_deref().unwrap_or("-"),
            state = form.state.as_deref().unwrap_or("-"),
            "Platform returned an authentication error"
        );
        if let Some(ref state) = form.state {
            let _ = tool.states().consume(state).await;
        }
        let ev = AuditEvent::platform_error(
            form.state.as_deref(),
            error,
            form.error_description.as_deref(),
            client_ip,
        );
        audit::emit(&ev);
        return error_response(
            StatusCode::BAD_REQUEST,
            "platform_error",
            "The platform did not complete the login",
        );
    }

    let state = form.state.unwrap_or_default();
    let id_token = form.id_token.unwrap_or_default();

    match tool.complete_launch(&id_token, &state).await {
        Ok(outcome) => {
            let ev = AuditEvent::launch_accepted(&state, &outcome.claims, &outcome.target, client_ip);
            audit::emit(&ev);
            Redirect::to(&outcome.target).into_response()
        }
        Err(e) => {
            let ev = AuditEvent::launch_rejected(&state, &e, client_ip);
            audit::emit(&ev);
            e.into_response()
        }
    }
}

/// `GET /lti/jwks`: the tool's public keys.
async fn jwks(State(tool): State<Arc<LtiTool>>) -> Response {
    Json(tool.public_jwks().clone()).into_response()
}

/// `GET /health`
async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Create a JSON error response.
fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({"error": error, "message": message}))).into_response()
}
