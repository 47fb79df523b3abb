use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::AddressList,
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{CartItemDto, CartList},
        categories::{CategoryList, CategoryTree},
        faqs::FaqList,
        favorites::FavoriteProductList,
        orders::{OrderList, OrderWithItems},
        products,
    },
    models::{
        Address, Cart, CartItem, Category, CategoryNode, Faq, Favorite, Order, OrderItem,
        OrderStatus, Product, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        addresses, admin, auth, cart, categories, faqs, favorites, health, orders, params,
        products as product_routes,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        auth::me,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        product_routes::list_products,
        product_routes::list_featured,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::feature_product,
        product_routes::delete_product,
        categories::category_tree,
        categories::list_categories,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        addresses::list_addresses,
        addresses::create_address,
        addresses::delete_address,
        faqs::list_faqs,
        faqs::create_faq,
        faqs::update_faq,
        faqs::delete_faq,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_users,
        admin::update_user_role,
        admin::delete_user,
        favorites::add_favorite,
        favorites::remove_favorite,
        favorites::list_favorites
    ),
    components(
        schemas(
            User,
            Product,
            Category,
            CategoryNode,
            Favorite,
            Cart,
            CartItem,
            Order,
            OrderItem,
            OrderStatus,
            Address,
            Faq,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            admin::ProductList,
            admin::UserList,
            admin::UpdateOrderStatusRequest,
            admin::InventoryAdjustRequest,
            admin::UpdateUserRoleRequest,
            admin::LowStockQuery,
            CartList,
            CartItemDto,
            CategoryList,
            CategoryTree,
            AddressList,
            FaqList,
            FavoriteProductList,
            OrderList,
            OrderWithItems,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            products::ProductList,
            Meta,
            ApiResponse<Product>,
            ApiResponse<products::ProductList>,
            ApiResponse<CategoryTree>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<admin::ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Categories", description = "Category tree endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Addresses", description = "Shipping address endpoints"),
        (name = "Faqs", description = "FAQ content endpoints"),
        (name = "Admin", description = "Back-office endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Favorites", description = "Wishlist endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
