use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::categories::{
        CategoryList, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Category,
    response::ApiResponse,
    services::category_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/tree", get(category_tree))
        .route(
            "/{id}",
            axum::routing::put(update_category).delete(delete_category),
        )
}

#[utoipa::path(
    get,
    path = "/api/categories/tree",
    responses(
        (status = 200, description = "Category forest for navigation", body = ApiResponse<CategoryTree>)
    ),
    tag = "Categories"
)]
pub async fn category_tree(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryTree>>> {
    let resp = category_service::category_tree(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "Flat category list", body = ApiResponse<CategoryList>)
    ),
    tag = "Categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = category_service::list_categories(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Create category", body = ApiResponse<Category>),
        (status = 400, description = "Unknown parent"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let resp = category_service::create_category(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    params(
        ("id" = Uuid, Path, description = "Category ID")
    ),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Update category", body = ApiResponse<Category>),
        (status = 400, description = "Invalid parent"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let resp = category_service::update_category(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(
        ("id" = Uuid, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = category_service::delete_category(&state, &user, id).await?;
    Ok(Json(resp))
}
