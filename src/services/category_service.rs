use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::categories::{
        CategoryList, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest,
    },
    entity::categories::{
        ActiveModel as CategoryActive, Column, Entity as Categories, Model as CategoryModel,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, CategoryNode},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Builds the category forest from the flat table in one pass: bucket the
/// rows by parent id, then walk down from the roots. Each bucket is
/// consumed exactly once, so a row whose parent is dangling or part of a
/// cycle is simply never attached; it drops out instead of looping.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let mut buckets: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for category in categories {
        buckets
            .entry(category.parent_id)
            .or_default()
            .push(category);
    }
    attach(None, &mut buckets)
}

fn attach(
    parent_id: Option<Uuid>,
    buckets: &mut HashMap<Option<Uuid>, Vec<Category>>,
) -> Vec<CategoryNode> {
    let Some(children) = buckets.remove(&parent_id) else {
        return Vec::new();
    };
    children
        .into_iter()
        .map(|category| {
            let subcategories = attach(Some(category.id), buckets);
            CategoryNode {
                id: category.id,
                name: category.name,
                parent_id: category.parent_id,
                created_at: category.created_at,
                subcategories,
            }
        })
        .collect()
}

fn count_nodes(nodes: &[CategoryNode]) -> usize {
    nodes
        .iter()
        .map(|node| 1 + count_nodes(&node.subcategories))
        .sum()
}

pub async fn category_tree(state: &AppState) -> AppResult<ApiResponse<CategoryTree>> {
    let rows = Categories::find()
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?;
    let total = rows.len();

    let roots = build_tree(rows.into_iter().map(category_from_entity).collect());

    let attached = count_nodes(&roots);
    if attached < total {
        tracing::warn!(
            dropped = total - attached,
            "categories with unresolvable parents omitted from tree"
        );
    }

    Ok(ApiResponse::success(
        "Categories",
        CategoryTree { roots },
        Some(Meta::empty()),
    ))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items = Categories::find()
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;

    if let Some(parent_id) = payload.parent_id {
        ensure_category_exists(state, parent_id).await?;
    }

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        parent_id: Set(payload.parent_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;

    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: CategoryActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    match payload.parent_id {
        None => {}
        Some(None) => active.parent_id = Set(None),
        Some(Some(parent_id)) => {
            if parent_id == id {
                return Err(AppError::BadRequest(
                    "Category cannot be its own parent".into(),
                ));
            }
            ensure_category_exists(state, parent_id).await?;
            active.parent_id = Set(Some(parent_id));
        }
    }

    let category = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_update",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category updated",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    // Children and products are re-rooted by the schema (SET NULL).
    let result = Categories::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_delete",
        Some("categories"),
        Some(serde_json::json!({ "category_id": id })),
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
        return Err(AppError::BadRequest("Parent category not found".into()));
    }
    Ok(())
}

fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
        parent_id: model.parent_id,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent_id: Option<Uuid>) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            parent_id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn flat_rows_become_a_forest() {
        let electronics = category("Electronics", None);
        let phones = category("Phones", Some(electronics.id));
        let laptops = category("Laptops", Some(electronics.id));
        let garden = category("Garden", None);

        let roots = build_tree(vec![
            electronics.clone(),
            phones.clone(),
            laptops.clone(),
            garden.clone(),
        ]);

        assert_eq!(roots.len(), 2);
        let top = roots.iter().find(|n| n.id == electronics.id).unwrap();
        assert_eq!(top.subcategories.len(), 2);
        assert!(top.subcategories.iter().all(|n| n.parent_id == Some(electronics.id)));
        let other = roots.iter().find(|n| n.id == garden.id).unwrap();
        assert!(other.subcategories.is_empty());
    }

    #[test]
    fn node_count_matches_input_when_parents_resolve() {
        let a = category("A", None);
        let b = category("B", Some(a.id));
        let c = category("C", Some(b.id));
        let roots = build_tree(vec![a, b, c]);
        assert_eq!(count_nodes(&roots), 3);
    }

    #[test]
    fn dangling_parent_rows_are_dropped() {
        let a = category("A", None);
        let orphan = category("Orphan", Some(Uuid::new_v4()));

        let roots = build_tree(vec![a.clone(), orphan.clone()]);

        assert_eq!(count_nodes(&roots), 1);
        assert!(roots.iter().all(|n| n.id != orphan.id));
    }

    #[test]
    fn mutually_referencing_rows_terminate_and_are_dropped() {
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let mut a = category("A", None);
        a.id = a_id;
        a.parent_id = Some(b_id);
        let mut b = category("B", None);
        b.id = b_id;
        b.parent_id = Some(a_id);
        let root = category("Root", None);

        let roots = build_tree(vec![a, b, root.clone()]);

        assert_eq!(count_nodes(&roots), 1);
        assert_eq!(roots[0].id, root.id);
    }

    #[test]
    fn self_parenting_row_terminates_and_is_dropped() {
        let mut looper = category("Looper", None);
        looper.parent_id = Some(looper.id);

        let roots = build_tree(vec![looper]);
        assert!(roots.is_empty());
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        assert!(build_tree(Vec::new()).is_empty());
    }
}
