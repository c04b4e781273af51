use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{repo_types::User, services::AuthUser},
    error::AppError,
    posts::{
        dto::{CreatePostRequest, Pagination, PostPage, UpdatePostRequest},
        repo,
        repo_types::Post,
        services::{ensure_owner, validate_post_fields},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/:id", get(get_post))
        .route("/users/:username/posts", get(list_user_posts))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/:id", axum::routing::put(update_post).delete(delete_post))
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<PostPage>, AppError> {
    let (page, per_page, limit, offset) = p.clamp();
    let posts = repo::list_recent(&state.db, limit, offset).await?;
    let total = repo::count(&state.db).await?;
    Ok(Json(PostPage {
        posts,
        total,
        page,
        per_page,
    }))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    let post = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("post not found".into()))?;
    Ok(Json(post))
}

#[instrument(skip(state))]
pub async fn list_user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(p): Query<Pagination>,
) -> Result<Json<PostPage>, AppError> {
    let author = User::find_by_username(&state.db, &username)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;

    let (page, per_page, limit, offset) = p.clamp();
    let posts = repo::list_by_author(&state.db, author.id, limit, offset).await?;
    let total = repo::count_by_author(&state.db, author.id).await?;
    Ok(Json(PostPage {
        posts,
        total,
        page,
        per_page,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_post_fields(&payload.title, &payload.body)?;
    let post = repo::insert(&state.db, user_id, payload.title.trim(), &payload.body).await?;
    info!(post_id = %post.id, author_id = %user_id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let post = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("post not found".into()))?;
    ensure_owner(&post, user_id)?;

    validate_post_fields(&payload.title, &payload.body)?;
    let updated = repo::update(&state.db, id, payload.title.trim(), &payload.body).await?;
    info!(post_id = %id, author_id = %user_id, "post updated");
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let post = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("post not found".into()))?;
    ensure_owner(&post, user_id)?;

    repo::delete(&state.db, id).await?;
    info!(post_id = %id, author_id = %user_id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}
