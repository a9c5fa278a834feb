use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use botmarket_api::BotmarketError;
use botmarket_auth::Identity;
use botmarket_runtime::{LoginInput, RegisterInput, SessionGrant};
use serde::Deserialize;

use crate::app::{
    AppState, HttpResult, JsonBody, OAUTH_STATE_COOKIE, clear_oauth_state_cookie,
    clear_session_cookie, cookie_header, oauth_state_cookie, read_request_cookie, session_cookie,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session))
        .route("/api/auth/oauth/{provider}", get(oauth_start))
        .route("/api/auth/oauth/{provider}/callback", get(oauth_callback))
}

fn with_session(
    state: &AppState,
    status: StatusCode,
    grant: &SessionGrant,
) -> HttpResult<Response> {
    let cookie = session_cookie(state, &grant.token)?;
    Ok((status, [(header::SET_COOKIE, cookie)], Json(grant)).into_response())
}

async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> HttpResult<Response> {
    let grant = state.register(input)?;
    with_session(&state, StatusCode::CREATED, &grant)
}

async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> HttpResult<Response> {
    let grant = state.login(input)?;
    with_session(&state, StatusCode::OK, &grant)
}

async fn logout(State(state): State<AppState>) -> HttpResult<Response> {
    let cookie = clear_session_cookie(&state)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({"ok": true})),
    )
        .into_response())
}

async fn session(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let cookies = cookie_header(&headers);
    let body = match state.resolver().resolve_header(cookies.as_deref()) {
        Identity::Authenticated(principal) => {
            serde_json::json!({"authenticated": true, "user": principal})
        }
        Identity::Anonymous => serde_json::json!({"authenticated": false, "user": null}),
    };
    Json(body)
}

async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> HttpResult<Response> {
    let start = state.authorize_redirect(&provider)?;
    let cookie = oauth_state_cookie(&state, &start.state)?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&start.url)).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> HttpResult<Response> {
    if let Some(error) = params.error {
        tracing::warn!(%provider, %error, "oauth provider returned an error");
        return Err(BotmarketError::Validation(format!("{provider} login was not completed: {error}")).into());
    }
    let (Some(code), Some(returned_state)) = (params.code, params.state) else {
        return Err(BotmarketError::Validation("missing code or state".to_string()).into());
    };
    let expected = read_request_cookie(&headers, OAUTH_STATE_COOKIE);

    let grant = state
        .complete_oauth(&provider, &code, &returned_state, expected.as_deref())
        .await?;
    tracing::info!(%provider, user_id = %grant.principal.id, "oauth login completed");

    let session = session_cookie(&state, &grant.token)?;
    let clear_state = clear_oauth_state_cookie(&state)?;
    Ok((
        AppendHeaders([(header::SET_COOKIE, session), (header::SET_COOKIE, clear_state)]),
        Redirect::to(&state.config().session.dashboard_path),
    )
        .into_response())
}
