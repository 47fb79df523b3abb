use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user123", "user").await?;
    seed_catalog(&pool).await?;
    seed_faqs(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let furniture = ensure_category(pool, "Furniture", None).await?;
    let desks = ensure_category(pool, "Desks", Some(furniture)).await?;
    let chairs = ensure_category(pool, "Chairs", Some(furniture)).await?;
    let lighting = ensure_category(pool, "Lighting", None).await?;

    let products = vec![
        ("Walnut Standing Desk", "Height adjustable, solid walnut top", 84900_i64, 12, Some(desks), Some(1)),
        ("Oak Writing Desk", "Compact desk for small rooms", 42900, 20, Some(desks), None),
        ("Mesh Office Chair", "Breathable back, adjustable arms", 19900, 35, Some(chairs), Some(2)),
        ("Leather Lounge Chair", "Full-grain leather, beech frame", 64900, 8, Some(chairs), None),
        ("Brass Desk Lamp", "Warm light, weighted base", 8900, 50, Some(lighting), Some(3)),
        ("Gift Card", "Redeemable storewide", 5000, 500, None, None),
    ];

    for (name, desc, price, stock, category_id, featured_rank) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock, category_id, featured_rank)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .bind(category_id)
        .bind(featured_rank)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}

async fn ensure_category(
    pool: &sqlx::PgPool,
    name: &str,
    parent_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, parent_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    let id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM categories WHERE name = $1")
                .bind(name)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };
    Ok(id)
}

async fn seed_faqs(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let faqs = vec![
        ("How long does delivery take?", "Orders ship within 2 business days.", 1),
        ("Can I cancel my order?", "Orders can be cancelled while they are still pending.", 2),
        ("Do you restock sold-out items?", "Most items are restocked monthly.", 3),
    ];

    for (question, answer, position) in faqs {
        sqlx::query(
            r#"
            INSERT INTO faqs (id, question, answer, position)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (SELECT 1 FROM faqs WHERE question = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(question)
        .bind(answer)
        .bind(position)
        .execute(pool)
        .await?;
    }

    println!("Seeded FAQs");
    Ok(())
}
