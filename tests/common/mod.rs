#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum_booking_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{services::ActiveModel as ServiceActive, users::ActiveModel as UserActive},
    error::AppResult,
    geocode::{Coordinates, Geocoder},
    mail::{EmailQueue, LogMailer},
    middleware::auth::AuthUser,
    models::Role,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::OnceCell;
use uuid::Uuid;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
            None
        }
    }
}

/// Knows a single city.
pub struct StubGeocoder;

pub const CASABLANCA: (f64, f64) = (-7.5898, 33.5731);

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode_city(&self, city: &str) -> AppResult<Option<Coordinates>> {
        Ok(city
            .eq_ignore_ascii_case("casablanca")
            .then(|| Coordinates::new(CASABLANCA.0, CASABLANCA.1)))
    }
}

pub async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    // Concurrent CREATE TABLE IF NOT EXISTS can still race in Postgres.
    MIGRATED
        .get_or_try_init(|| async {
            let orm = create_orm_conn(database_url).await?;
            run_migrations(&orm).await?;
            orm.close().await?;
            Ok::<(), anyhow::Error>(())
        })
        .await?;

    let orm = create_orm_conn(database_url).await?;
    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        jwt_expires_hours: 1,
        session_ttl_secs: 3600,
        otp_ttl_secs: 300,
        reset_token_ttl_mins: 10,
        public_url: "http://localhost".into(),
        email_from: "test@localhost".into(),
        email_queue_capacity: 64,
        mailgun_api_key: None,
        mailgun_domain: None,
        opencage_api_key: None,
    };
    let (emails, _worker) = EmailQueue::start(Arc::new(LogMailer), config.email_queue_capacity);
    Ok(AppState::new(config, orm, emails, Arc::new(StubGeocoder)))
}

/// Inserts a verified user with a unique email.
pub async fn create_user(
    state: &AppState,
    role: Role,
    location: Option<(f64, f64)>,
) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        name: Set(format!("{role} {id}")),
        email: Set(format!("{role}-{id}@example.com")),
        password_hash: Set("dummy".into()),
        email_verified: Set(true),
        role: Set(role.as_str().into()),
        contact_preference: Set("email".into()),
        reset_password_token: Set(None),
        reset_password_expires_at: Set(None),
        longitude: Set(location.map(|(lng, _)| lng)),
        latitude: Set(location.map(|(_, lat)| lat)),
        business_name: Set((role == Role::Provider).then(|| format!("Studio {id}"))),
        rating: Set(0.0),
        completed_appointments: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser { user_id: id, role })
}

/// A 30 minute service with 10 minutes of preparation and 5 of cleanup, priced 100.
pub async fn create_service(state: &AppState, provider: &AuthUser) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    ServiceActive {
        id: Set(id),
        provider_id: Set(provider.user_id),
        name: Set(format!("Haircut {id}")),
        description: Set("Classic cut".into()),
        images: Set(serde_json::json!(["/uploads/cut.png"])),
        price: Set(100),
        duration_minutes: Set(30),
        preparation_time_minutes: Set(10),
        cleanup_time_minutes: Set(5),
        category: Set(Some("hair".into())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}
