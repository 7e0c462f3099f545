//! Document endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use vault_sync::Document;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_create, handle_get, handle_list, handle_replace, CreateRequest, ListQuery,
    ListResponse, ReplaceRequest,
};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_handler).post(create_handler))
        .route("/documents/{uid}", get(get_handler).put(replace_handler))
}

/// GET /documents - List the caller's documents.
async fn list_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>> {
    let response = handle_list(
        state.repo.as_ref(),
        auth.owner(),
        query,
        state.config.max_list_limit,
    )
    .await?;
    Ok(Json(response))
}

/// POST /documents - Create a document.
async fn create_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<Document<Value>>)> {
    let document = handle_create(state.repo.as_ref(), auth.owner(), request).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /documents/{uid} - Fetch one document.
async fn get_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uid): Path<String>,
) -> Result<Json<Document<Value>>> {
    let document = handle_get(state.repo.as_ref(), auth.owner(), &uid).await?;
    Ok(Json(document))
}

/// PUT /documents/{uid} - Replace a document if the version matches.
async fn replace_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(uid): Path<String>,
    Json(request): Json<ReplaceRequest>,
) -> Result<Json<Document<Value>>> {
    let document = handle_replace(state.repo.as_ref(), auth.owner(), &uid, request).await?;
    Ok(Json(document))
}
