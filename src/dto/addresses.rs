use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Address;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAddressRequest {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct AddressList {
    #[schema(value_type = Vec<Address>)]
    pub items: Vec<Address>,
}
