use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::addresses::{AddressList, CreateAddressRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
};

pub async fn list_addresses(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::success(
        "OK",
        AddressList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_address(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let address: Address = sqlx::query_as(
        r#"
        INSERT INTO addresses (id, user_id, recipient, line1, line2, city, postal_code, country)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.recipient)
    .bind(payload.line1)
    .bind(payload.line2)
    .bind(payload.city)
    .bind(payload.postal_code)
    .bind(payload.country)
    .fetch_one(pool)
    .await?;

    Ok(ApiResponse::success("Address created", address, None))
}

pub async fn delete_address(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    // Orders keep their rows; the schema nulls their address reference.
    let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
