//! Public marketplace: projects, the SaaS directory, and comments on both.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use botmarket_api::{Comment, CommentTarget, Project};
use botmarket_runtime::{CommentInput, NewProject, NewSaas, ProjectPatch, SaasPatch, SaasView};
use serde::Deserialize;

use crate::app::{AppState, CurrentUser, HttpResult, JsonBody};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route(
            "/api/projects/{id}/comments",
            get(project_comments).post(comment_on_project),
        )
        .route("/api/saas", get(list_saas).post(create_saas))
        .route(
            "/api/saas/{id}",
            get(get_saas).patch(update_saas).delete(delete_saas),
        )
        .route("/api/saas/{id}/vote", post(vote_saas))
        .route("/api/saas/{id}/comments", get(saas_comments).post(comment_on_saas))
        .route("/api/comments/{id}", patch(update_comment).delete(delete_comment))
}

#[derive(Debug, Deserialize)]
struct ProjectQuery {
    owner: Option<String>,
}

async fn list_projects(
    State(state): State<AppState>,
    Query(q): Query<ProjectQuery>,
) -> HttpResult<Json<Vec<Project>>> {
    Ok(Json(state.list_projects(q.owner.as_deref())?))
}

async fn get_project(State(state): State<AppState>, Path(id): Path<String>) -> HttpResult<Json<Project>> {
    Ok(Json(state.get_project(&id)?))
}

async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<NewProject>,
) -> HttpResult<(StatusCode, Json<Project>)> {
    Ok((StatusCode::CREATED, Json(state.create_project(&user, input)?)))
}

async fn update_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<ProjectPatch>,
) -> HttpResult<Json<Project>> {
    Ok(Json(state.update_project(&user, &id, patch)?))
}

async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    state.delete_project(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn project_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<Vec<Comment>>> {
    Ok(Json(state.list_comments(CommentTarget::Project, &id)?))
}

async fn comment_on_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<CommentInput>,
) -> HttpResult<(StatusCode, Json<Comment>)> {
    let comment = state.add_comment(&user, CommentTarget::Project, &id, input)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Debug, Deserialize)]
struct SaasQuery {
    category: Option<String>,
}

async fn list_saas(
    State(state): State<AppState>,
    Query(q): Query<SaasQuery>,
) -> HttpResult<Json<Vec<SaasView>>> {
    Ok(Json(state.list_saas(q.category.as_deref())?))
}

async fn get_saas(State(state): State<AppState>, Path(id): Path<String>) -> HttpResult<Json<SaasView>> {
    Ok(Json(state.get_saas(&id)?))
}

async fn create_saas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<NewSaas>,
) -> HttpResult<(StatusCode, Json<SaasView>)> {
    Ok((StatusCode::CREATED, Json(state.create_saas(&user, input)?)))
}

async fn update_saas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<SaasPatch>,
) -> HttpResult<Json<SaasView>> {
    Ok(Json(state.update_saas(&user, &id, patch)?))
}

async fn delete_saas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    state.delete_saas(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct VoteBody {
    value: i8,
}

async fn vote_saas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(vote): JsonBody<VoteBody>,
) -> HttpResult<Json<SaasView>> {
    Ok(Json(state.vote_saas(&user, &id, vote.value)?))
}

async fn saas_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Json<Vec<Comment>>> {
    Ok(Json(state.list_comments(CommentTarget::Saas, &id)?))
}

async fn comment_on_saas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<CommentInput>,
) -> HttpResult<(StatusCode, Json<Comment>)> {
    let comment = state.add_comment(&user, CommentTarget::Saas, &id, input)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<CommentInput>,
) -> HttpResult<Json<Comment>> {
    Ok(Json(state.update_comment(&user, &id, input)?))
}

async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    state.delete_comment(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::app::testing::{app, send, sign_up};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn anonymous_cannot_create() {
        let app = app();
        let reply = send(&app, "POST", "/api/projects", None, Some(json!({"title": "x"}))).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_owner_mutation_is_forbidden_and_harmless() {
        let app = app();
        let ada = sign_up(&app, "ada@example.com").await;
        let bob = sign_up(&app, "bob@example.com").await;

        let created = send(
            &app,
            "POST",
            "/api/projects",
            Some(&ada),
            Some(json!({"title": "Helpdesk bot", "price": 4900, "tags": ["support"]})),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let id = created.body["id"].as_str().unwrap().to_string();
        let uri = format!("/api/projects/{id}");

        let hijack = send(&app, "PATCH", &uri, Some(&bob), Some(json!({"title": "mine now"}))).await;
        assert_eq!(hijack.status, StatusCode::FORBIDDEN);
        let delete = send(&app, "DELETE", &uri, Some(&bob), None).await;
        assert_eq!(delete.status, StatusCode::FORBIDDEN);

        let read = send(&app, "GET", &uri, None, None).await;
        assert_eq!(read.body["title"], "Helpdesk bot");

        let gone = send(&app, "DELETE", &uri, Some(&ada), None).await;
        assert_eq!(gone.status, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", &uri, None, None).await.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn comments_and_votes_on_saas() {
        let app = app();
        let ada = sign_up(&app, "ada@example.com").await;
        let bob = sign_up(&app, "bob@example.com").await;

        let entry = send(
            &app,
            "POST",
            "/api/saas",
            Some(&ada),
            Some(json!({"name": "Chatty", "url": "https://chatty.example.com", "category": "support"})),
        )
        .await;
        let id = entry.body["id"].as_str().unwrap().to_string();

        let voted = send(
            &app,
            "POST",
            &format!("/api/saas/{id}/vote"),
            Some(&bob),
            Some(json!({"value": 1})),
        )
        .await;
        assert_eq!(voted.body["score"], 1);

        let comment = send(
            &app,
            "POST",
            &format!("/api/saas/{id}/comments"),
            Some(&bob),
            Some(json!({"body": "works well"})),
        )
        .await;
        assert_eq!(comment.status, StatusCode::CREATED);
        let cid = comment.body["id"].as_str().unwrap().to_string();

        let by_ada = send(
            &app,
            "PATCH",
            &format!("/api/comments/{cid}"),
            Some(&ada),
            Some(json!({"body": "censored"})),
        )
        .await;
        assert_eq!(by_ada.status, StatusCode::FORBIDDEN);

        let listed = send(&app, "GET", &format!("/api/saas/{id}/comments"), None, None).await;
        assert_eq!(listed.body[0]["body"], "works well");

        let listing = send(&app, "GET", "/api/saas", None, None).await;
        assert_eq!(listing.body[0]["score"], 1);
    }
}
