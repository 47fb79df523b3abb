use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    entity::{
        addresses::{Column as AddressCol, Entity as Addresses},
        cart_items::{Column as CartItemCol, Entity as CartItems, Model as CartItemModel},
        carts::{Column as CartCol, Entity as Carts},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders,
            Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// One cart line priced from the authoritative product row.
#[derive(Debug, PartialEq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

/// Validates cart lines against the freshly loaded products and computes
/// the order total. Prices come from the product rows, never the client.
/// The stock comparison here is advisory under concurrency; the
/// conditioned decrement in [`checkout`] is the commit-time authority.
pub fn price_cart(
    items: &[CartItemModel],
    products: &HashMap<Uuid, ProductModel>,
) -> AppResult<(Vec<OrderLine>, i64)> {
    let mut lines = Vec::with_capacity(items.len());
    let mut total: i64 = 0;

    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        let product = product_for(products, item.product_id)?;
        if product.stock < item.quantity {
            return Err(AppError::InsufficientStock {
                product_id: product.id,
                name: product.name.clone(),
            });
        }
        total += product.price * i64::from(item.quantity);
        lines.push(OrderLine {
            product_id: product.id,
            name: product.name.clone(),
            quantity: item.quantity,
            unit_price: product.price,
        });
    }

    Ok((lines, total))
}

fn product_for(
    products: &HashMap<Uuid, ProductModel>,
    product_id: Uuid,
) -> AppResult<&ProductModel> {
    // A product deleted between add-to-cart and checkout surfaces here.
    products
        .get(&product_id)
        .ok_or(AppError::ProductNotFound(product_id))
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::EmptyCart)?;

    let cart_items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .all(&state.orm)
        .await?;
    if cart_items.is_empty() {
        return Err(AppError::EmptyCart);
    }

    if let Some(address_id) = payload.address_id {
        let owned = Addresses::find()
            .filter(
                Condition::all()
                    .add(AddressCol::Id.eq(address_id))
                    .add(AddressCol::UserId.eq(user.user_id)),
            )
            .one(&state.orm)
            .await?;
        if owned.is_none() {
            return Err(AppError::BadRequest("Unknown shipping address".into()));
        }
    }

    let product_ids: Vec<Uuid> = cart_items.iter().map(|item| item.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let (lines, total_amount) = price_cart(&cart_items, &products)?;

    let txn = state.orm.begin().await?;

    for line in &lines {
        // The decrement carries its own stock floor. Zero rows touched
        // means a concurrent order took the remaining units after the
        // pre-check; returning drops the transaction and rolls back every
        // decrement already applied.
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .filter(ProdCol::Stock.gte(line.quantity))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::InsufficientStock {
                product_id: line.product_id,
                name: line.name.clone(),
            });
        }
    }

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address_id: Set(payload.address_id),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    // The order stands regardless of what happens past this point; a cart
    // that survives checkout is cosmetic, not a correctness problem.
    if let Err(err) = CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await
    {
        tracing::warn!(error = %err, cart_id = %cart.id, "cart clear failed after checkout");
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = parse_status(&order)?;
    if current != OrderStatus::Pending {
        return Err(AppError::InvalidTransition {
            from: current,
            to: OrderStatus::Cancelled,
        });
    }

    // Cancelling does not return the units to stock; the back office
    // reconciles inventory through the manual adjustment endpoint.
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

fn parse_status(order: &OrderModel) -> AppResult<OrderStatus> {
    OrderStatus::parse(&order.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "order {} carries unknown status {:?}",
            order.id,
            order.status
        ))
    })
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        address_id: model.address_id,
        total_amount: model.total_amount,
        status: model.status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart_item(product_id: Uuid, quantity: i32) -> CartItemModel {
        CartItemModel {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id,
            quantity,
            created_at: Utc::now().into(),
        }
    }

    fn product(name: &str, price: i64, stock: i32) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            price,
            stock,
            category_id: None,
            featured_rank: None,
            created_at: Utc::now().into(),
        }
    }

    fn index(products: &[ProductModel]) -> HashMap<Uuid, ProductModel> {
        products.iter().cloned().map(|p| (p.id, p)).collect()
    }

    #[test]
    fn total_is_sum_of_quantity_times_unit_price() {
        let a = product("Walnut desk", 100, 5);
        let b = product("Desk lamp", 50, 9);
        let items = vec![cart_item(a.id, 2), cart_item(b.id, 3)];

        let (lines, total) = price_cart(&items, &index(&[a.clone(), b.clone()])).unwrap();

        assert_eq!(total, 2 * 100 + 3 * 50);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit_price, a.price);
        assert_eq!(lines[1].unit_price, b.price);
        assert_eq!(
            total,
            lines
                .iter()
                .map(|l| l.unit_price * i64::from(l.quantity))
                .sum::<i64>()
        );
    }

    #[test]
    fn missing_product_is_reported_with_its_id() {
        let a = product("Walnut desk", 100, 5);
        let ghost = Uuid::new_v4();
        let items = vec![cart_item(a.id, 1), cart_item(ghost, 1)];

        let err = price_cart(&items, &index(&[a])).unwrap_err();
        match err {
            AppError::ProductNotFound(id) => assert_eq!(id, ghost),
            other => panic!("expected ProductNotFound, got {other:?}"),
        }
    }

    #[test]
    fn short_stock_names_the_offending_product() {
        let a = product("Walnut desk", 100, 5);
        let b = product("Desk lamp", 50, 0);
        let items = vec![cart_item(a.id, 2), cart_item(b.id, 1)];

        let err = price_cart(&items, &index(&[a, b.clone()])).unwrap_err();
        match err {
            AppError::InsufficientStock { product_id, name } => {
                assert_eq!(product_id, b.id);
                assert_eq!(name, "Desk lamp");
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn quantity_equal_to_stock_is_allowed() {
        let a = product("Walnut desk", 100, 2);
        let items = vec![cart_item(a.id, 2)];
        let (_, total) = price_cart(&items, &index(&[a])).unwrap();
        assert_eq!(total, 200);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let a = product("Walnut desk", 100, 5);
        let items = vec![cart_item(a.id, 0)];
        assert!(matches!(
            price_cart(&items, &index(&[a])),
            Err(AppError::BadRequest(_))
        ));
    }
}
