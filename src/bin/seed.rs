use axum_booking_api::{
    config::AppConfig,
    db::{create_orm_conn, pool_of, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

struct SeedUser<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    role: &'a str,
    business_name: Option<&'a str>,
    location: Option<(f64, f64)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;
    let pool = pool_of(&orm);

    let provider_id = ensure_user(
        &pool,
        SeedUser {
            name: "Salma Provider",
            email: "provider@example.com",
            password: "provider123",
            role: "provider",
            business_name: Some("Salma's Studio"),
            location: Some((-7.5898, 33.5731)),
        },
    )
    .await?;
    let client_id = ensure_user(
        &pool,
        SeedUser {
            name: "Karim Client",
            email: "client@example.com",
            password: "client123",
            role: "client",
            business_name: None,
            location: Some((-7.6114, 33.5883)),
        },
    )
    .await?;
    seed_services(&pool, provider_id).await?;

    println!("Seed completed. Provider ID: {provider_id}, Client ID: {client_id}");
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, user: SeedUser<'_>) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(user.password)?;
    let (longitude, latitude) = match user.location {
        Some((lng, lat)) => (Some(lng), Some(lat)),
        None => (None, None),
    };

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, email_verified, role, business_name, longitude, latitude)
        VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7, $8)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role, email_verified = TRUE
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.name)
    .bind(user.email)
    .bind(password_hash)
    .bind(user.role)
    .bind(user.business_name)
    .bind(longitude)
    .bind(latitude)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {} (role={})", user.email, user.role);
    Ok(user_id)
}

async fn seed_services(pool: &sqlx::PgPool, provider_id: Uuid) -> anyhow::Result<()> {
    // name, description, price, duration, preparation, cleanup, category
    let services = vec![
        ("Haircut", "Classic cut and style", 100_i64, 30, 10, 5, "hair"),
        ("Beard Trim", "Shape and line-up", 60, 20, 5, 5, "hair"),
        ("Deep Tissue Massage", "Sixty minutes of focused work", 350, 60, 15, 15, "wellness"),
        ("Manicure", "File, shape and polish", 120, 45, 5, 10, "nails"),
    ];

    for (name, desc, price, duration, prep, cleanup, category) in services {
        let images = serde_json::json!([format!(
            "/uploads/{}.jpg",
            name.to_lowercase().replace(' ', "-")
        )]);
        sqlx::query(
            r#"
            INSERT INTO services (id, provider_id, name, description, images, price,
                duration_minutes, preparation_time_minutes, cleanup_time_minutes, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (provider_id, name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider_id)
        .bind(name)
        .bind(desc)
        .bind(images)
        .bind(price)
        .bind(duration)
        .bind(prep)
        .bind(cleanup)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded services");
    Ok(())
}
