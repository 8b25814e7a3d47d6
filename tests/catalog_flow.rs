use axum_storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        categories::CreateCategoryRequest,
        products::{CreateProductRequest, CreateReviewRequest, UpdateProductRequest},
        wishlist::AddWishlistRequest,
    },
    entity::users::ActiveModel as UserActive,
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::{Pagination, ProductQuery},
    services::{category_service, product_service, wishlist_service},
    state::AppState,
};
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

// Tests in this binary truncate shared tables, so they must not interleave.
static DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

async fn db_guard() -> MutexGuard<'static, ()> {
    DB_LOCK.get_or_init(|| Mutex::new(())).lock().await
}

#[tokio::test]
async fn seller_creates_product_and_filters_find_it() -> anyhow::Result<()> {
    let _guard = db_guard().await;
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let admin = auth_user(create_user(&state, "ADMIN", "admin@catalog.test").await?, "ADMIN");
    let seller = auth_user(create_user(&state, "SELLER", "seller@catalog.test").await?, "SELLER");

    let category = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Shoes".into(),
            slug: "shoes".into(),
            gender: Some("women".into()),
            parent_id: None,
        },
    )
    .await?
    .data
    .unwrap();

    // Duplicate slug is rejected.
    let dup = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Shoes again".into(),
            slug: "shoes".into(),
            gender: None,
            parent_id: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(dup, AppError::BadRequest(_)));

    let product = product_service::create_product(
        &state,
        &seller,
        CreateProductRequest {
            name: "Trail Runner".into(),
            description: Some("Grippy shoe".into()),
            brand: Some("Ferris".into()),
            gender: Some("women".into()),
            price: dec!(89.90),
            stock: 4,
            category_id: Some(category.id),
            is_featured: Some(true),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(product.seller_id, seller.user_id);

    // Brand substring + featured filters find it.
    let listed = product_service::list_products(
        &state,
        None,
        ProductQuery {
            page: None,
            per_page: None,
            q: None,
            category_id: Some(category.id),
            gender: Some("women".into()),
            brand: Some("Ferr".into()),
            featured: Some(true),
            seller_id: Some(seller.user_id),
            min_price: None,
            max_price: None,
            include_inactive: None,
            sort_by: None,
            sort_order: None,
        },
    )
    .await?;
    let items = listed.data.unwrap().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, product.id);

    // Category detail lists the product.
    let with_products = category_service::get_category(
        &state,
        category.id,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(with_products.products.items.len(), 1);

    Ok(())
}

#[tokio::test]
async fn non_admin_product_update_is_forbidden() -> anyhow::Result<()> {
    let _guard = db_guard().await;
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let seller = auth_user(create_user(&state, "SELLER", "seller@guard.test").await?, "SELLER");
    let user = auth_user(create_user(&state, "USER", "user@guard.test").await?, "USER");

    let product = product_service::create_product(
        &state,
        &seller,
        CreateProductRequest {
            name: "Guarded".into(),
            description: None,
            brand: None,
            gender: None,
            price: dec!(10.00),
            stock: 1,
            category_id: None,
            is_featured: None,
        },
    )
    .await?
    .data
    .unwrap();

    let err = product_service::update_product(
        &state,
        &user,
        product.id,
        UpdateProductRequest {
            name: Some("Hijacked".into()),
            description: None,
            brand: None,
            gender: None,
            price: None,
            stock: None,
            category_id: None,
            is_active: None,
            is_featured: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Product unchanged.
    let detail = product_service::get_product(&state, product.id).await?;
    assert_eq!(detail.data.unwrap().product.name, "Guarded");

    Ok(())
}

#[tokio::test]
async fn wishlist_rejects_duplicates_and_reviews_aggregate() -> anyhow::Result<()> {
    let _guard = db_guard().await;
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let seller = auth_user(create_user(&state, "SELLER", "seller@wish.test").await?, "SELLER");
    let user = auth_user(create_user(&state, "USER", "user@wish.test").await?, "USER");
    let other = auth_user(create_user(&state, "USER", "other@wish.test").await?, "USER");

    let product = product_service::create_product(
        &state,
        &seller,
        CreateProductRequest {
            name: "Wishable".into(),
            description: None,
            brand: None,
            gender: None,
            price: dec!(30.00),
            stock: 3,
            category_id: None,
            is_featured: None,
        },
    )
    .await?
    .data
    .unwrap();

    wishlist_service::add_to_wishlist(
        &state,
        &user,
        AddWishlistRequest {
            product_id: product.id,
        },
    )
    .await?;

    let dup = wishlist_service::add_to_wishlist(
        &state,
        &user,
        AddWishlistRequest {
            product_id: product.id,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(dup, AppError::BadRequest(_)));

    let listed = wishlist_service::list_wishlist(
        &state,
        &user,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    assert_eq!(listed.data.unwrap().items.len(), 1);

    // Two reviews aggregate into the product detail.
    product_service::create_review(
        &state,
        &user,
        product.id,
        CreateReviewRequest {
            rating: 5,
            comment: Some("Great".into()),
        },
    )
    .await?;
    product_service::create_review(
        &state,
        &other,
        product.id,
        CreateReviewRequest {
            rating: 4,
            comment: None,
        },
    )
    .await?;

    // A second review from the same user is rejected.
    let dup_review = product_service::create_review(
        &state,
        &user,
        product.id,
        CreateReviewRequest {
            rating: 1,
            comment: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(dup_review, AppError::BadRequest(_)));

    let detail = product_service::get_product(&state, product.id).await?;
    let rating = detail.data.unwrap().rating;
    assert_eq!(rating.count, 2);
    assert_eq!(rating.average, Some(dec!(4.50)));

    Ok(())
}

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    let pool = create_pool(&database_url).await?;

    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, wishlist_items, reviews, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(Some(AppState { pool, orm }))
}

fn auth_user(user_id: Uuid, role: &str) -> AuthUser {
    AuthUser {
        user_id,
        role: role.into(),
    }
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        name: Set("Test".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
