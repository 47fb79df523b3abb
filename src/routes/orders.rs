use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "asc or desc")
    ),
    responses(
        (status = 200, description = "List own orders", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order placed from cart", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Empty cart"),
        (status = 409, description = "Product missing or out of stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Own order with items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Order is past the point of cancellation"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::cancel_order(&state, &user, id).await?;
    Ok(Json(resp))
}
