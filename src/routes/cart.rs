use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, patch},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartList, UpdateCartItemRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::CartItem,
    response::ApiResponse,
    routes::params::Pagination,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cart_list).post(add_to_cart).delete(clear_cart))
        .route("/items/{id}", patch(update_cart_item))
        .route("/{product_id}", delete(remove_from_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List cart items for current user", body = ApiResponse<CartList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn cart_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CartList>>> {
    let resp = cart_service::list_cart(&state.pool, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Add or replace cart line", body = ApiResponse<CartItem>),
        (status = 400, description = "Bad request"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_service::add_to_cart(&state.pool, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart item ID")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Update line quantity", body = ApiResponse<CartItem>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_service::update_cart_item(&state.pool, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "OK"),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::remove_from_cart(&state.pool, &user, product_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart emptied"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::clear_cart(&state.pool, &user).await?;
    Ok(Json(resp))
}
