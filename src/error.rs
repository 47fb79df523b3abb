use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;
use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} no longer exists")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for {name}")]
    InsufficientStock { product_id: Uuid, name: String },

    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable discriminant for client code that needs to branch on the
    /// failure without string-matching messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::EmptyCart => "empty_cart",
            AppError::ProductNotFound(_) => "product_not_found",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::DbError(_) => "db_error",
            AppError::OrmError(_) => "orm_error",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::EmptyCart => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::ProductNotFound(_)
            | AppError::InsufficientStock { .. }
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn product_id(&self) -> Option<Uuid> {
        match self {
            AppError::ProductNotFound(id) => Some(*id),
            AppError::InsufficientStock { product_id, .. } => Some(*product_id),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<Uuid>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                kind: self.kind(),
                product_id: self.product_id(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
