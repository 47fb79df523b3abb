use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Faq;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFaqRequest {
    pub question: String,
    pub answer: String,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct FaqList {
    #[schema(value_type = Vec<Faq>)]
    pub items: Vec<Faq>,
}
