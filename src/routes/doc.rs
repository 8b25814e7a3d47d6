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
        auth as auth_dto,
        cart::{CartItemDto, CartList},
        categories as category_dto,
        orders as order_dto,
        products as product_dto,
        wishlist as wishlist_dto,
    },
    models::{CartItem, Category, Order, OrderItem, Product, Review, User, WishlistItem},
    response::{ApiResponse, Meta},
    routes::{auth, cart, categories, health, orders, params, products, users, wishlist},
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
        auth::register,
        auth::login,
        users::profile,
        users::become_seller,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::create_review,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
    ),
    components(
        schemas(
            User,
            Product,
            Category,
            CartItem,
            WishlistItem,
            Order,
            OrderItem,
            Review,
            auth_dto::RegisterRequest,
            auth_dto::LoginRequest,
            auth_dto::LoginResponse,
            product_dto::CreateProductRequest,
            product_dto::UpdateProductRequest,
            product_dto::CreateReviewRequest,
            product_dto::ProductList,
            product_dto::ProductDetail,
            product_dto::RatingSummary,
            category_dto::CreateCategoryRequest,
            category_dto::UpdateCategoryRequest,
            category_dto::CategoryNode,
            category_dto::CategoryTree,
            category_dto::CategoryWithProducts,
            CartItemDto,
            CartList,
            wishlist_dto::AddWishlistRequest,
            wishlist_dto::WishlistProductList,
            order_dto::OrderList,
            order_dto::OrderWithItems,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<product_dto::ProductList>,
            ApiResponse<order_dto::OrderWithItems>,
            ApiResponse<order_dto::OrderList>,
            ApiResponse<category_dto::CategoryTree>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User profile endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Orders", description = "Order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
