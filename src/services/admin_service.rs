use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders,
        },
        products::{
            ActiveModel as ProductActive, Column as ProdCol, Entity as Products,
        },
        users::{
            ActiveModel as UserActive, Column as UserCol, Entity as Users,
            Model as UserModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::admin::{
        InventoryAdjustRequest, LowStockQuery, ProductList, UpdateOrderStatusRequest,
        UpdateUserRoleRequest, UserList,
    },
    routes::params::{OrderListQuery, Pagination, SortOrder},
    services::order_service::{order_from_entity, order_item_from_entity},
    services::product_service::product_from_entity,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(order_from_entity)
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let data = OrderWithItems { order, items };
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

/// Back-office override: any known status may be set over any other. The
/// user-facing cancellation path is the only transition-guarded one.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: OrderActive = existing.into();
    active.status = Set(status.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Products::find().filter(ProdCol::Stock.lte(threshold));
    finder = finder
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let data = ProductList { items };
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", data, Some(meta)))
}

/// Manual stock correction (received shipments, shrinkage, cancelled
/// orders). Locks the row so the floor check holds against concurrent
/// checkouts.
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_stock = product.stock + payload.delta;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        Some("products"),
        Some(serde_json::json!({ "product_id": updated.id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Inventory updated",
        product_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(user_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn update_user_role(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    if payload.role != "user" && payload.role != "admin" {
        return Err(AppError::BadRequest("Unknown role".into()));
    }

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    active.role = Set(payload.role);
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_role_update",
        Some("users"),
        Some(serde_json::json!({ "user_id": updated.id, "role": updated.role })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User updated",
        user_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("Cannot delete your own account".into()));
    }

    // Order history is kept; accounts with orders stay.
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(id))
        .count(&state.orm)
        .await?;
    if orders > 0 {
        return Err(AppError::BadRequest(
            "User has orders and cannot be deleted".into(),
        ));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        created_at: model.created_at.with_timezone(&Utc),
        role: model.role,
    }
}
