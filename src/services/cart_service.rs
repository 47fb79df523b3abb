use chrono::DateTime;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartItemDto, CartList, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
};

#[derive(FromRow)]
struct CartWithProductRow {
    item_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
    category_id: Option<Uuid>,
    featured_rank: Option<i32>,
    created_at: DateTime<chrono::Utc>,
}

/// The cart row is created lazily on the first add and survives checkout;
/// only its items come and go.
async fn ensure_cart(pool: &DbPool, user_id: Uuid) -> AppResult<Cart> {
    if let Some(cart) = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(cart);
    }

    let inserted: Option<Cart> = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(cart) => Ok(cart),
        // Lost the insert race to another request of the same user.
        None => {
            let cart = sqlx::query_as("SELECT * FROM carts WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;
            Ok(cart)
        }
    }
}

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithProductRow>(
        r#"
        SELECT ci.id AS item_id, ci.quantity,
               p.id AS product_id, p.name, p.description, p.price, p.stock,
               p.category_id, p.featured_rank, p.created_at
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE c.user_id = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        WHERE c.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.item_id,
            product: Product {
                id: row.product_id,
                name: row.name,
                description: row.description,
                price: row.price,
                stock: row.stock,
                category_id: row.category_id,
                featured_rank: row.featured_rank,
                created_at: row.created_at,
            },
            quantity: row.quantity,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product_exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(pool)
        .await?;
    if product_exist.is_none() {
        return Err(AppError::BadRequest("product not found".to_string()));
    }

    let cart = ensure_cart(pool, user.user_id).await?;

    // Adding a product already in the cart replaces its quantity.
    let cart_item: CartItem = sqlx::query_as(
        r#"
        INSERT INTO cart_items (id, cart_id, product_id, quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (cart_id, product_id)
        DO UPDATE SET quantity = EXCLUDED.quantity
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(cart.id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn update_cart_item(
    pool: &DbPool,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let cart_item: Option<CartItem> = sqlx::query_as(
        r#"
        UPDATE cart_items ci
        SET quantity = $3
        FROM carts c
        WHERE ci.id = $1 AND ci.cart_id = c.id AND c.user_id = $2
        RETURNING ci.*
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .bind(payload.quantity)
    .fetch_optional(pool)
    .await?;

    let cart_item = cart_item.ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.product_id = $2
        "#,
    )
    .bind(user.user_id)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND c.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .execute(pool)
    .await?;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
