use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::services::{
        CreateServiceRequest, ServiceBookingList, ServiceList, ServiceWithProvider,
        UpdateServiceRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Service,
    response::ApiResponse,
    routes::params::{ProviderServicesQuery, ServiceSearchQuery},
    services::{appointment_service, catalog_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_service))
        .route("/search", get(search_services))
        .route("/provider/{provider_id}", get(list_provider_services))
        .route(
            "/{id}",
            get(get_service).put(update_service).delete(delete_service),
        )
        .route("/{id}/bookings", get(list_service_bookings))
}

#[utoipa::path(
    post,
    path = "/api/services",
    request_body = CreateServiceRequest,
    responses(
        (status = 201, description = "Service created", body = ApiResponse<Service>),
        (status = 400, description = "Validation failed or duplicate name"),
        (status = 403, description = "Caller is not a provider")
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn create_service(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateServiceRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Service>>)> {
    let resp = catalog_service::create_service(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/services/search",
    params(
        ("city" = Option<String>, Query, description = "Keep providers within 20 km of this city"),
        ("name" = Option<String>, Query, description = "Service name contains"),
        ("business_name" = Option<String>, Query, description = "Provider business name contains"),
        ("category" = Option<String>, Query, description = "Category contains"),
        ("min_price" = Option<i64>, Query, description = "Minimum price"),
        ("max_price" = Option<i64>, Query, description = "Maximum price"),
        ("min_duration" = Option<i32>, Query, description = "Minimum duration in minutes"),
        ("max_duration" = Option<i32>, Query, description = "Maximum duration in minutes"),
        ("rating" = Option<f64>, Query, description = "Minimum provider rating"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Matching services, best rated providers first", body = ApiResponse<ServiceList>),
        (status = 404, description = "City or services not found")
    ),
    tag = "Services"
)]
pub async fn search_services(
    State(state): State<AppState>,
    Query(query): Query<ServiceSearchQuery>,
) -> AppResult<Json<ApiResponse<ServiceList>>> {
    let resp = catalog_service::search_services(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/services/provider/{provider_id}",
    params(
        ("provider_id" = Uuid, Path, description = "Provider id"),
        ("name" = Option<String>, Query, description = "Service name contains"),
        ("category" = Option<String>, Query, description = "Category contains"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Services of a provider", body = ApiResponse<ServiceList>),
        (status = 404, description = "Provider not found")
    ),
    tag = "Services"
)]
pub async fn list_provider_services(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<ProviderServicesQuery>,
) -> AppResult<Json<ApiResponse<ServiceList>>> {
    let resp = catalog_service::list_provider_services(&state, provider_id, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/services/{id}",
    params(("id" = Uuid, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service with its provider", body = ApiResponse<ServiceWithProvider>),
        (status = 404, description = "Service not found")
    ),
    tag = "Services"
)]
pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ServiceWithProvider>>> {
    let resp = catalog_service::get_service(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/services/{id}",
    params(("id" = Uuid, Path, description = "Service id")),
    request_body = UpdateServiceRequest,
    responses(
        (status = 200, description = "Service updated", body = ApiResponse<Service>),
        (status = 403, description = "Not the owning provider"),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn update_service(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateServiceRequest>,
) -> AppResult<Json<ApiResponse<Service>>> {
    let resp = catalog_service::update_service(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/services/{id}",
    params(("id" = Uuid, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service deleted"),
        (status = 403, description = "Not the owning provider"),
        (status = 404, description = "Service not found"),
        (status = 409, description = "Service still has upcoming bookings")
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn delete_service(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = catalog_service::delete_service(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/services/{id}/bookings",
    params(("id" = Uuid, Path, description = "Service id")),
    responses(
        (status = 200, description = "Occupied intervals of the service", body = ApiResponse<ServiceBookingList>),
        (status = 404, description = "Service not found")
    ),
    tag = "Services"
)]
pub async fn list_service_bookings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ServiceBookingList>>> {
    let resp = appointment_service::list_service_bookings(&state, id).await?;
    Ok(Json(resp))
}
