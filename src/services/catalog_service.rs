use std::cmp::Ordering;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::services::{
        CreateServiceRequest, MAX_IMAGES, ServiceList, ServiceWithProvider, UpdateServiceRequest,
    },
    entity::{
        service_appointments::{Column as BookingCol, Entity as ServiceAppointments},
        services::{ActiveModel as ServiceActive, Column as ServiceCol, Entity as Services, Model as ServiceModel},
        users::{Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    geocode::Coordinates,
    mail::{EmailJob, templates},
    middleware::auth::{AuthUser, ensure_provider},
    models::{ProviderSummary, Role, Service, stored_list},
    response::{ApiResponse, Meta},
    routes::params::{ProviderServicesQuery, ServiceSearchQuery},
    state::AppState,
};

/// Providers farther than this from the searched city are dropped.
pub const SEARCH_RADIUS_METERS: f64 = 20_000.0;

pub async fn create_service(
    state: &AppState,
    user: &AuthUser,
    payload: CreateServiceRequest,
) -> AppResult<ApiResponse<Service>> {
    ensure_provider(user)?;
    payload.validate()?;

    let provider = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Provider"))?;

    let name = payload.name.trim().to_string();
    ensure_unique_name(state, user.user_id, &name, None).await?;

    let service = ServiceActive {
        id: Set(Uuid::new_v4()),
        provider_id: Set(user.user_id),
        name: Set(name),
        description: Set(payload.description.trim().to_string()),
        images: Set(images_json(&payload.images)?),
        price: Set(payload.price),
        duration_minutes: Set(payload.duration_minutes),
        preparation_time_minutes: Set(payload.preparation_time_minutes.unwrap_or(0)),
        cleanup_time_minutes: Set(payload.cleanup_time_minutes.unwrap_or(0)),
        category: Set(payload.category.map(|c| c.trim().to_string())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let service = Service::from(service);
    let (subject, html) = templates::new_service_email(&service, &provider.name);
    state
        .emails
        .enqueue(EmailJob::new(provider.email.clone(), subject, html));

    audit::record(
        &state.pool,
        Some(user.user_id),
        "create_service",
        "services",
        serde_json::json!({ "service_id": service.id, "name": service.name }),
    )
    .await;
    tracing::info!(service_id = %service.id, provider_id = %user.user_id, "service created");

    Ok(ApiResponse::success(
        "Service created successfully",
        service,
        Some(Meta::empty()),
    ))
}

pub async fn update_service(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateServiceRequest,
) -> AppResult<ApiResponse<Service>> {
    ensure_provider(user)?;
    payload.validate()?;

    let service = find_owned(state, user, id).await?;

    if let Some(name) = payload.name.as_deref() {
        ensure_unique_name(state, user.user_id, name.trim(), Some(service.id)).await?;
    }

    let images = match payload.images {
        Some(new_images) => {
            let mut images: Vec<String> = if payload.keep_old_images.unwrap_or(false) {
                stored_list(&service.images, "images")?
            } else {
                Vec::new()
            };
            images.extend(new_images.into_iter().map(|p| p.trim().to_string()));
            if images.is_empty() {
                return Err(AppError::BadRequest("At least one image is required".into()));
            }
            if images.len() > MAX_IMAGES {
                return Err(AppError::BadRequest(format!(
                    "A service can hold at most {MAX_IMAGES} images"
                )));
            }
            Some(images)
        }
        None => None,
    };

    let mut active: ServiceActive = service.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description.trim().to_string());
    }
    if let Some(images) = images {
        active.images = Set(images_json(&images)?);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(duration) = payload.duration_minutes {
        active.duration_minutes = Set(duration);
    }
    if let Some(prep) = payload.preparation_time_minutes {
        active.preparation_time_minutes = Set(prep);
    }
    if let Some(cleanup) = payload.cleanup_time_minutes {
        active.cleanup_time_minutes = Set(cleanup);
    }
    if let Some(category) = payload.category {
        active.category = Set(Some(category.trim().to_string()));
    }
    active.updated_at = Set(Utc::now().into());
    let service = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "update_service",
        "services",
        serde_json::json!({ "service_id": service.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Service updated successfully",
        Service::from(service),
        Some(Meta::empty()),
    ))
}

pub async fn get_service(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ServiceWithProvider>> {
    let result = Services::find_by_id(id)
        .find_also_related(Users)
        .one(&state.orm)
        .await?;
    let (service, provider) = match result {
        Some(row) => row,
        None => return Err(AppError::not_found("Service")),
    };

    Ok(ApiResponse::success(
        "Ok",
        with_provider(service, provider),
        Some(Meta::empty()),
    ))
}

pub async fn delete_service(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_provider(user)?;

    let txn = state.orm.begin().await?;

    let service = match Services::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    {
        Some(s) => s,
        None => return Err(AppError::not_found("Service")),
    };
    if service.provider_id != user.user_id {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this service".into(),
        ));
    }

    let upcoming = ServiceAppointments::find()
        .filter(BookingCol::ServiceId.eq(service.id))
        .filter(BookingCol::OccupiedUntil.gt(Utc::now()))
        .count(&txn)
        .await?;
    if upcoming > 0 {
        return Err(AppError::Conflict(format!(
            "Service has {upcoming} upcoming booking(s) and cannot be deleted"
        )));
    }

    Services::delete_by_id(service.id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "delete_service",
        "services",
        serde_json::json!({ "service_id": service.id, "name": service.name }),
    )
    .await;

    Ok(ApiResponse::success(
        "Service deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_provider_services(
    state: &AppState,
    provider_id: Uuid,
    query: ProviderServicesQuery,
) -> AppResult<ApiResponse<ServiceList>> {
    let (page, per_page, offset) = query.pagination().normalize();

    let provider = match Users::find_by_id(provider_id).one(&state.orm).await? {
        Some(u) if u.role == Role::Provider.as_str() => u,
        _ => return Err(AppError::not_found("Provider")),
    };

    let mut condition = Condition::all().add(ServiceCol::ProviderId.eq(provider.id));
    if let Some(name) = query.name.as_deref().filter(|s| !s.trim().is_empty()) {
        condition = condition.add(Expr::col(ServiceCol::Name).ilike(contains(name)));
    }
    if let Some(category) = query.category.as_deref().filter(|s| !s.trim().is_empty()) {
        condition = condition.add(Expr::col(ServiceCol::Category).ilike(contains(category)));
    }

    let finder = Services::find()
        .filter(condition)
        .order_by_desc(ServiceCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(per_page as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|service| with_provider(service, Some(provider.clone())))
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        ServiceList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn search_services(
    state: &AppState,
    query: ServiceSearchQuery,
) -> AppResult<ApiResponse<ServiceList>> {
    let (page, per_page, offset) = query.pagination().normalize();

    let center = match query.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => match state.geocoder.geocode_city(city).await? {
            Some(coords) => Some(coords),
            None => return Err(AppError::not_found("City")),
        },
        None => None,
    };

    let mut condition = Condition::all().add(UserCol::Role.eq(Role::Provider.as_str()));
    if let Some(name) = query.name.as_deref().filter(|s| !s.trim().is_empty()) {
        condition = condition.add(Expr::col((Services, ServiceCol::Name)).ilike(contains(name)));
    }
    if let Some(category) = query.category.as_deref().filter(|s| !s.trim().is_empty()) {
        condition =
            condition.add(Expr::col((Services, ServiceCol::Category)).ilike(contains(category)));
    }
    if let Some(business) = query.business_name.as_deref().filter(|s| !s.trim().is_empty()) {
        condition =
            condition.add(Expr::col((Users, UserCol::BusinessName)).ilike(contains(business)));
    }
    if let Some(min_price) = query.min_price {
        condition = condition.add(ServiceCol::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(ServiceCol::Price.lte(max_price));
    }
    if let Some(min_duration) = query.min_duration {
        condition = condition.add(ServiceCol::DurationMinutes.gte(min_duration));
    }
    if let Some(max_duration) = query.max_duration {
        condition = condition.add(ServiceCol::DurationMinutes.lte(max_duration));
    }
    if let Some(rating) = query.rating {
        condition = condition.add(UserCol::Rating.gte(rating));
    }
    if let Some(center) = center {
        let bbox = center.bounding_box(SEARCH_RADIUS_METERS);
        condition = condition
            .add(UserCol::Latitude.between(bbox.min_latitude, bbox.max_latitude))
            .add(UserCol::Longitude.between(bbox.min_longitude, bbox.max_longitude));
    }

    let rows = Services::find()
        .find_also_related(Users)
        .filter(condition)
        .all(&state.orm)
        .await?;

    let mut matches: Vec<(ServiceModel, UserModel)> = rows
        .into_iter()
        .filter_map(|(service, provider)| provider.map(|p| (service, p)))
        .filter(|(_, provider)| match center {
            Some(center) => within_radius(&center, provider),
            None => true,
        })
        .collect();

    if matches.is_empty() {
        return Err(AppError::NotFound(
            "No services found matching the criteria".into(),
        ));
    }

    matches.sort_by(|(_, a), (_, b)| rank_providers(a, b));

    let total = matches.len() as i64;
    let items = matches
        .into_iter()
        .skip(offset as usize)
        .take(per_page as usize)
        .map(|(service, provider)| with_provider(service, Some(provider)))
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        ServiceList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

async fn find_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ServiceModel> {
    let service = match Services::find_by_id(id).one(&state.orm).await? {
        Some(s) => s,
        None => return Err(AppError::not_found("Service")),
    };
    if service.provider_id != user.user_id {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this service".into(),
        ));
    }
    Ok(service)
}

async fn ensure_unique_name(
    state: &AppState,
    provider_id: Uuid,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let mut finder = Services::find()
        .filter(ServiceCol::ProviderId.eq(provider_id))
        .filter(ServiceCol::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(ServiceCol::Id.ne(id));
    }
    if finder.one(&state.orm).await?.is_some() {
        return Err(AppError::BadRequest(
            "You already have a service with this name".into(),
        ));
    }
    Ok(())
}

fn with_provider(service: ServiceModel, provider: Option<UserModel>) -> ServiceWithProvider {
    ServiceWithProvider {
        service: Service::from(service),
        provider: provider.map(ProviderSummary::from),
    }
}

fn within_radius(center: &Coordinates, provider: &UserModel) -> bool {
    match (provider.longitude, provider.latitude) {
        (Some(lng), Some(lat)) => {
            center.distance_meters(&Coordinates::new(lng, lat)) <= SEARCH_RADIUS_METERS
        }
        _ => false,
    }
}

/// Highest rated first, then the most completed appointments.
fn rank_providers(a: &UserModel, b: &UserModel) -> Ordering {
    b.rating
        .partial_cmp(&a.rating)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.completed_appointments.cmp(&a.completed_appointments))
}

fn contains(needle: &str) -> String {
    let escaped = needle
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn images_json(images: &[String]) -> AppResult<serde_json::Value> {
    serde_json::to_value(images).map_err(|e| AppError::Internal(e.into()))
}
