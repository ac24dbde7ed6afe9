use axum::Router;

use crate::state::AppState;

pub mod appointments;
pub mod auth;
pub mod doc;
pub mod health;
pub mod params;
pub mod services;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/services", services::router())
        .nest("/appointments", appointments::router())
}
