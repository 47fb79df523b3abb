use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::faqs::{CreateFaqRequest, FaqList, UpdateFaqRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Faq,
    response::ApiResponse,
    services::faq_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_faqs).post(create_faq))
        .route("/{id}", axum::routing::put(update_faq).delete(delete_faq))
}

#[utoipa::path(
    get,
    path = "/api/faqs",
    responses(
        (status = 200, description = "FAQs in display order", body = ApiResponse<FaqList>)
    ),
    tag = "Faqs"
)]
pub async fn list_faqs(State(state): State<AppState>) -> AppResult<Json<ApiResponse<FaqList>>> {
    let resp = faq_service::list_faqs(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/faqs",
    request_body = CreateFaqRequest,
    responses(
        (status = 201, description = "FAQ created", body = ApiResponse<Faq>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Faqs"
)]
pub async fn create_faq(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateFaqRequest>,
) -> AppResult<Json<ApiResponse<Faq>>> {
    let resp = faq_service::create_faq(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/faqs/{id}",
    params(
        ("id" = Uuid, Path, description = "FAQ ID")
    ),
    request_body = UpdateFaqRequest,
    responses(
        (status = 200, description = "FAQ updated", body = ApiResponse<Faq>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Faqs"
)]
pub async fn update_faq(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateFaqRequest>,
) -> AppResult<Json<ApiResponse<Faq>>> {
    let resp = faq_service::update_faq(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/faqs/{id}",
    params(
        ("id" = Uuid, Path, description = "FAQ ID")
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Faqs"
)]
pub async fn delete_faq(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = faq_service::delete_faq(&state, &user, id).await?;
    Ok(Json(resp))
}
