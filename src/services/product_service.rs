use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{
        CreateProductRequest, FeatureProductRequest, ProductList, UpdateProductRequest,
    },
    entity::categories::Entity as Categories,
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(Column::CategoryId.eq(category_id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

/// Storefront shelf: every product with a rank, lowest rank first.
pub async fn list_featured(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    let items = Products::find()
        .filter(Column::FeaturedRank.is_not_null())
        .order_by_asc(Column::FeaturedRank)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Featured products",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let result = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(product_from_entity)
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product", result, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.price < 0 || payload.stock < 0 {
        return Err(AppError::BadRequest(
            "price and stock must not be negative".into(),
        ));
    }
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(state, category_id).await?;
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        category_id: Set(payload.category_id),
        featured_rank: Set(None),
        created_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        if price < 0 {
            return Err(AppError::BadRequest("price must not be negative".into()));
        }
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return Err(AppError::BadRequest("stock must not be negative".into()));
        }
        active.stock = Set(stock);
    }
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(state, category_id).await?;
        active.category_id = Set(Some(category_id));
    }

    let product = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

/// Places the product on (or removes it from) the storefront's featured
/// shelf. Ordering collisions are tolerated; the shelf sorts by rank.
pub async fn feature_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: FeatureProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    active.featured_rank = Set(payload.rank);
    let product = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_feature",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id, "rank": payload.rank })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
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

async fn ensure_category_exists(state: &AppState, id: Uuid) -> AppResult<()> {
    let found = Categories::find_by_id(id).one(&state.orm).await?;
    if found.is_none() {
        return Err(AppError::BadRequest("Category not found".into()));
    }
    Ok(())
}

pub(crate) fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        description: model.description,
        price: model.price,
        stock: model.stock,
        category_id: model.category_id,
        featured_rank: model.featured_rank,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
