use axum_storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{cart::AddToCartRequest, orders::PlaceOrderRequest},
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::AuthUser,
    services::{cart_service, order_service},
    state::AppState,
};
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

// Tests in this binary truncate shared tables, so they must not interleave.
static DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

async fn db_guard() -> MutexGuard<'static, ()> {
    DB_LOCK.get_or_init(|| Mutex::new(())).lock().await
}

// Integration flow: user fills a cart -> places an order -> stock decremented,
// cart emptied, total snapshotted from line prices.
#[tokio::test]
async fn place_order_decrements_stock_and_empties_cart() -> anyhow::Result<()> {
    let _guard = db_guard().await;
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let seller = create_user(&state, "SELLER", "seller@orders.test").await?;
    let user_id = create_user(&state, "USER", "buyer@orders.test").await?;

    let product = create_product(&state, seller, "Widget", dec!(10.00), 5).await?;

    let buyer = AuthUser {
        user_id,
        role: "USER".into(),
    };

    // Adding the same product twice merges into one line with summed quantity.
    cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product,
            quantity: 1,
        },
    )
    .await?;
    let merged = cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product,
            quantity: 1,
        },
    )
    .await?;
    let merged = merged.data.unwrap();
    assert_eq!(merged.quantity, 2);

    let line_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(line_count.0, 1);

    let resp = order_service::place_order(&state, &buyer, PlaceOrderRequest::default()).await?;
    let placed = resp.data.unwrap();

    assert_eq!(placed.order.total, dec!(20.00));
    assert_eq!(placed.order.status, "PENDING");
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].price, dec!(10.00));
    assert_eq!(placed.items[0].quantity, 2);

    // Decimal totals serialize as strings.
    let total_json = serde_json::to_value(placed.order.total)?;
    assert_eq!(total_json, serde_json::json!("20.00"));

    assert_eq!(product_stock(&state, product).await?, 3);

    let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(remaining.0, 0);

    // The placed order can be read back with its items.
    let fetched = order_service::get_order(&state, &buyer, placed.order.id).await?;
    assert_eq!(fetched.data.unwrap().items.len(), 1);

    Ok(())
}

#[tokio::test]
async fn insufficient_stock_aborts_without_writes() -> anyhow::Result<()> {
    let _guard = db_guard().await;
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let seller = create_user(&state, "SELLER", "seller@stock.test").await?;
    let user_id = create_user(&state, "USER", "buyer@stock.test").await?;
    let product = create_product(&state, seller, "Scarce", dec!(7.50), 2).await?;

    let buyer = AuthUser {
        user_id,
        role: "USER".into(),
    };

    cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product,
            quantity: 3,
        },
    )
    .await?;

    let err = order_service::place_order(&state, &buyer, PlaceOrderRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Nothing changed: stock intact, cart intact, no order rows.
    assert_eq!(product_stock(&state, product).await?, 2);
    let cart: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(cart.0, 1);
    let orders: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(orders.0, 0);

    Ok(())
}

#[tokio::test]
async fn empty_cart_is_rejected() -> anyhow::Result<()> {
    let _guard = db_guard().await;
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let user_id = create_user(&state, "USER", "empty@orders.test").await?;
    let buyer = AuthUser {
        user_id,
        role: "USER".into(),
    };

    let err = order_service::place_order(&state, &buyer, PlaceOrderRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let orders: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(orders.0, 0);

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

    // Clean tables between runs.
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, wishlist_items, reviews, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(Some(AppState { pool, orm }))
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

async fn create_product(
    state: &AppState,
    seller_id: Uuid,
    name: &str,
    price: rust_decimal::Decimal,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        description: Set(Some("A product for testing".into())),
        brand: Set(None),
        gender: Set(None),
        price: Set(price),
        stock: Set(stock),
        category_id: Set(None),
        seller_id: Set(seller_id),
        is_active: Set(true),
        is_featured: Set(false),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}

async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = axum_storefront_api::entity::Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.stock)
}
