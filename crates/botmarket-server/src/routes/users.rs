use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use botmarket_api::{Account, PublicUser};
use botmarket_runtime::ProfilePatch;

use crate::app::{AppState, CurrentUser, HttpResult, JsonBody};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(me).patch(update_me))
        .route("/api/users/{id}", get(profile))
}

async fn me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> HttpResult<Json<Account>> {
    Ok(Json(state.me(&user)?))
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(patch): JsonBody<ProfilePatch>,
) -> HttpResult<Json<Account>> {
    Ok(Json(state.update_profile(&user, patch)?))
}

async fn profile(State(state): State<AppState>, Path(id): Path<String>) -> HttpResult<Json<PublicUser>> {
    Ok(Json(state.get_user(&id)?))
}

#[cfg(test)]
mod tests {
    use crate::app::testing::{app, send, sign_up};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn me_requires_session() {
        let app = app();
        let reply = send(&app, "GET", "/api/users/me", None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"], "authentication required");
    }

    #[tokio::test]
    async fn update_profile_then_view_publicly() {
        let app = app();
        let cookie = sign_up(&app, "ada@example.com").await;
        let me = send(
            &app,
            "PATCH",
            "/api/users/me",
            Some(&cookie),
            Some(json!({"name": "Ada Lovelace"})),
        )
        .await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["email"], "ada@example.com");

        let id = me.body["id"].as_str().unwrap().to_string();
        let public = send(&app, "GET", &format!("/api/users/{id}"), None, None).await;
        assert_eq!(public.body["name"], "Ada Lovelace");
        assert!(public.body.get("email").is_none());
        assert!(public.body.get("password_hash").is_none());
        assert!(public.body.get("provider_token").is_none());
    }
}
