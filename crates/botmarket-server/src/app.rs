use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use botmarket_api::{BotmarketError, Principal};
use botmarket_auth::{
    CookieOptions, GateDecision, SessionGate, build_clear_cookie, build_set_cookie, read_cookie,
};
use botmarket_runtime::AppRuntime;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::routes;

pub type AppState = Arc<AppRuntime>;

pub const OAUTH_STATE_COOKIE: &str = "botmarket_oauth_state";
const OAUTH_STATE_MAX_AGE: u64 = 10 * 60;

pub fn build_router(runtime: AppState) -> Result<Router, BotmarketError> {
    let gate = Arc::new(runtime.session_gate()?);
    let timeout = Duration::from_secs(runtime.config().server.request_timeout_secs);
    let max_body = runtime.config().server.max_body_bytes;

    Ok(Router::new()
        .route("/health", get(health))
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::market::router())
        .merge(routes::dashboard::router())
        .with_state(runtime)
        .layer(middleware::from_fn_with_state(gate, session_gate))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        )))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Redirect anonymous requests for protected paths to the login page.
async fn session_gate(State(gate): State<Arc<SessionGate>>, req: Request, next: Next) -> Response {
    let cookies = cookie_header(req.headers());
    match gate.decide(req.uri().path(), cookies.as_deref()) {
        GateDecision::Pass => next.run(req).await,
        GateDecision::Redirect(to) => {
            tracing::debug!(path = req.uri().path(), "gate redirect to login");
            Redirect::to(&to).into_response()
        }
    }
}

/// All `Cookie` headers folded into one, as HTTP/2 clients may split them.
pub fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let parts: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    (!parts.is_empty()).then(|| parts.join("; "))
}

pub fn read_request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let all = cookie_header(headers)?;
    read_cookie(&all, name).map(str::to_string)
}

fn cookie_error(e: &botmarket_auth::Error) -> BotmarketError {
    BotmarketError::Internal(format!("cookie: {e}"))
}

pub fn session_cookie(runtime: &AppRuntime, token: &str) -> Result<String, BotmarketError> {
    build_set_cookie(token, &runtime.config().session.cookie_options()).map_err(|e| cookie_error(&e))
}

pub fn clear_session_cookie(runtime: &AppRuntime) -> Result<String, BotmarketError> {
    build_clear_cookie(&runtime.config().session.cookie_options()).map_err(|e| cookie_error(&e))
}

fn oauth_state_options(runtime: &AppRuntime) -> CookieOptions {
    CookieOptions {
        name: OAUTH_STATE_COOKIE.to_string(),
        path: "/api/auth/oauth".to_string(),
        secure: runtime.config().session.cookie_secure,
        max_age_seconds: Some(OAUTH_STATE_MAX_AGE),
        use_host_prefix: false,
        ..CookieOptions::default()
    }
}

pub fn oauth_state_cookie(runtime: &AppRuntime, state: &str) -> Result<String, BotmarketError> {
    build_set_cookie(state, &oauth_state_options(runtime)).map_err(|e| cookie_error(&e))
}

pub fn clear_oauth_state_cookie(runtime: &AppRuntime) -> Result<String, BotmarketError> {
    build_clear_cookie(&oauth_state_options(runtime)).map_err(|e| cookie_error(&e))
}

/// Error response: `{"error": "..."}` with the mapped status code.
#[derive(Debug)]
pub struct HttpError(pub BotmarketError);

impl From<BotmarketError> for HttpError {
    fn from(e: BotmarketError) -> Self {
        Self(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &self.0 {
            BotmarketError::Internal(detail) => tracing::error!(%detail, "internal error"),
            BotmarketError::Connection { provider, detail } => {
                tracing::warn!(%provider, %detail, "upstream failure");
            }
            _ => {}
        }
        (status, Json(serde_json::json!({"error": self.0.public_message()}))).into_response()
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

/// The signed-in caller. Anonymous requests are rejected with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = cookie_header(&parts.headers);
        let principal = state.resolver().resolve_header(cookies.as_deref()).require()?;
        Ok(Self(principal))
    }
}

/// `Json` whose rejections use the same error body as everything else.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(HttpError(BotmarketError::Validation(rejection.body_text()))),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let reply = send(&app, "GET", "/health", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["status"], "ok");
    }

    #[tokio::test]
    async fn protected_path_without_cookie_redirects_to_login() {
        let app = app();
        let reply = send(&app, "GET", "/dashboard/bots", None, None).await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.headers[header::LOCATION], "/login");

        let reply = send(&app, "GET", "/dashboard", Some("botmarket_session=garbage"), None).await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn unprotected_paths_pass_through() {
        let app = app();
        assert_eq!(send(&app, "GET", "/dashboardx", None, None).await.status, StatusCode::NOT_FOUND);
        assert_eq!(send(&app, "GET", "/api/projects", None, None).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn signed_in_user_reaches_dashboard() {
        let app = app();
        let cookie = sign_up(&app, "ada@example.com").await;
        let reply = send(&app, "GET", "/dashboard", Some(&cookie), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["bots"], 0);
    }

    #[tokio::test]
    async fn malformed_json_uses_error_body() {
        let app = app();
        let cookie = sign_up(&app, "ada@example.com").await;
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/api/projects")
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cookie_headers_are_folded() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "a=1".parse().unwrap());
        headers.append(header::COOKIE, "botmarket_session=tok".parse().unwrap());
        assert_eq!(read_request_cookie(&headers, "botmarket_session").as_deref(), Some("tok"));
        assert!(read_request_cookie(&HeaderMap::new(), "a").is_none());
    }

    #[test]
    fn internal_error_body_is_generic() {
        let resp = HttpError(BotmarketError::Internal("disk on fire".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
