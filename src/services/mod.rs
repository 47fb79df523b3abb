pub mod address_service;
pub mod admin_service;
pub mod auth_service;
pub mod cart_service;
pub mod category_service;
pub mod faq_service;
pub mod favorite_service;
pub mod order_service;
pub mod product_service;
