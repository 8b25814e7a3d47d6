use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123!", "Admin", "ADMIN").await?;
    let seller_id =
        ensure_user(&pool, "seller@example.com", "seller123!", "Seller", "SELLER").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user1234!", "User", "USER").await?;

    let category_id = ensure_category(&pool, "Apparel", "apparel").await?;
    seed_products(&pool, seller_id, category_id).await?;

    println!("Seed completed. Admin: {admin_id}, Seller: {seller_id}, User: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_category(pool: &sqlx::PgPool, name: &str, slug: &str) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let (id,): (Uuid,) =
        sqlx::query_as("INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3) RETURNING id")
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(slug)
            .fetch_one(pool)
            .await?;

    println!("Created category {name}");
    Ok(id)
}

async fn seed_products(
    pool: &sqlx::PgPool,
    seller_id: Uuid,
    category_id: Uuid,
) -> anyhow::Result<()> {
    let products = vec![
        ("Axum Hoodie", "Warm hoodie for Rustaceans", "Ferris & Co", "55.00", 50),
        ("Ferris Mug", "Coffee tastes better with Ferris", "Ferris & Co", "12.00", 100),
        ("Rust Sticker Pack", "Decorate your laptop", "Ferris & Co", "5.00", 200),
        ("E-book: Async Rust", "Learn async Rust patterns", "Ferris & Co", "25.00", 75),
    ];

    for (name, desc, brand, price, stock) in products {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, brand, price, stock, category_id, seller_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(brand)
        .bind(Decimal::from_str(price)?)
        .bind(stock)
        .bind(category_id)
        .bind(seller_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
