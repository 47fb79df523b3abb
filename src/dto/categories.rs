use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Category, CategoryNode};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    /// Present-and-null re-roots the category; absent leaves the parent
    /// untouched.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Uuid>)]
    pub parent_id: Option<Option<Uuid>>,
}

// Distinguishes `"parent_id": null` (Some(None)) from an absent key (None).
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<Category>)]
    pub items: Vec<Category>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryTree {
    #[schema(value_type = Vec<CategoryNode>)]
    pub roots: Vec<CategoryNode>,
}
