//! Private per-user resources: credentials, bots and chatlogs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use botmarket_api::{Bot, Chatlog, Credential};
use botmarket_runtime::{
    BotPatch, CredentialPatch, DashboardSummary, NewBot, NewChatlog, NewCredential, NewMessage,
};
use serde::Deserialize;

use crate::app::{AppState, CurrentUser, HttpResult, JsonBody};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(summary))
        .route("/api/credentials", get(list_credentials).post(create_credential))
        .route(
            "/api/credentials/{id}",
            get(get_credential)
                .patch(update_credential)
                .delete(delete_credential),
        )
        .route("/api/bots", get(list_bots).post(create_bot))
        .route(
            "/api/bots/{id}",
            get(get_bot).patch(update_bot).delete(delete_bot),
        )
        .route("/api/chatlogs", get(list_chatlogs).post(create_chatlog))
        .route("/api/chatlogs/{id}", get(get_chatlog).delete(delete_chatlog))
        .route("/api/chatlogs/{id}/messages", post(append_message))
}

async fn summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> HttpResult<Json<DashboardSummary>> {
    Ok(Json(state.dashboard_summary(&user)?))
}

async fn list_credentials(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> HttpResult<Json<Vec<Credential>>> {
    Ok(Json(state.list_credentials(&user)?))
}

async fn get_credential(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<Json<Credential>> {
    Ok(Json(state.get_credential(&user, &id)?))
}

async fn create_credential(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<NewCredential>,
) -> HttpResult<(StatusCode, Json<Credential>)> {
    Ok((StatusCode::CREATED, Json(state.create_credential(&user, input)?)))
}

async fn update_credential(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<CredentialPatch>,
) -> HttpResult<Json<Credential>> {
    Ok(Json(state.update_credential(&user, &id, patch)?))
}

async fn delete_credential(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    state.delete_credential(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_bots(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> HttpResult<Json<Vec<Bot>>> {
    Ok(Json(state.list_bots(&user)?))
}

async fn get_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<Json<Bot>> {
    Ok(Json(state.get_bot(&user, &id)?))
}

async fn create_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<NewBot>,
) -> HttpResult<(StatusCode, Json<Bot>)> {
    Ok((StatusCode::CREATED, Json(state.create_bot(&user, input)?)))
}

async fn update_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<BotPatch>,
) -> HttpResult<Json<Bot>> {
    Ok(Json(state.update_bot(&user, &id, patch)?))
}

async fn delete_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    state.delete_bot(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ChatlogQuery {
    bot_id: Option<String>,
}

async fn list_chatlogs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<ChatlogQuery>,
) -> HttpResult<Json<Vec<Chatlog>>> {
    Ok(Json(state.list_chatlogs(&user, q.bot_id.as_deref())?))
}

async fn get_chatlog(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<Json<Chatlog>> {
    Ok(Json(state.get_chatlog(&user, &id)?))
}

async fn create_chatlog(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<NewChatlog>,
) -> HttpResult<(StatusCode, Json<Chatlog>)> {
    Ok((StatusCode::CREATED, Json(state.create_chatlog(&user, input)?)))
}

async fn append_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewMessage>,
) -> HttpResult<Json<Chatlog>> {
    Ok(Json(state.append_message(&user, &id, input)?))
}

async fn delete_chatlog(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    state.delete_chatlog(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
