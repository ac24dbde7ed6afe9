use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::appointments::{
        AppointmentList, CreateAppointmentRequest, MAX_ATTACHMENTS, ReviewRequest,
        UpdateAppointmentRequest, UpdateStatusRequest,
    },
    dto::services::ServiceBookingList,
    entity::{
        appointments::{
            ActiveModel as AppointmentActive, Column as AppointmentCol, Entity as Appointments,
            Model as AppointmentModel,
        },
        service_appointments::{
            ActiveModel as BookingActive, Column as BookingCol, Entity as ServiceAppointments,
        },
        services::{Entity as Services, Model as ServiceModel},
        users::{ActiveModel as UserActive, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_role},
    models::{Appointment, AppointmentStatus, Attachment, Role, ServiceBooking, stored_list},
    response::{ApiResponse, Meta},
    routes::params::{AppointmentListQuery, SortOrder},
    scheduling::{BookedSlot, BookingSpan, Slot, ensure_price_matches, ensure_slot_available},
    state::AppState,
};

pub async fn create_appointment(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAppointmentRequest,
) -> AppResult<ApiResponse<Appointment>> {
    ensure_role(user, Role::Client)?;
    let now = Utc::now();
    let start = payload.validate(now)?;

    let txn = state.orm.begin().await?;

    let service = lock_service(&txn, payload.service_id).await?;
    ensure_price_matches(payload.service_price, service.price)?;

    let slot = BookingSpan::of(&service).slot_at(start)?;
    let booked = booked_slots(&txn, service.id).await?;
    ensure_slot_available(&booked, &slot, None)?;

    let attachments = stamp_attachments(payload.attachments.unwrap_or_default(), now);

    let appointment = AppointmentActive {
        id: Set(Uuid::new_v4()),
        client_id: Set(user.user_id),
        provider_id: Set(service.provider_id),
        service_id: Set(service.id),
        service_price: Set(service.price),
        appointment_date: Set(slot.start.into()),
        location: Set(payload.location.trim().to_string()),
        status: Set(AppointmentStatus::Pending.as_str().to_string()),
        attachments: Set(attachments_json(&attachments)?),
        additional_info: Set(payload.additional_info.unwrap_or_default()),
        rating: Set(None),
        review: Set(String::new()),
        confirmed_at: Set(None),
        cancelled_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    write_booking(&txn, &appointment, slot).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "create_appointment",
        "appointments",
        serde_json::json!({
            "appointment_id": appointment.id,
            "service_id": appointment.service_id,
            "appointment_date": slot.start,
        }),
    )
    .await;
    tracing::info!(
        appointment_id = %appointment.id,
        service_id = %appointment.service_id,
        start = %slot.start,
        end = %slot.end,
        "appointment booked"
    );

    Ok(ApiResponse::success(
        "Appointment created successfully",
        Appointment::from(appointment),
        Some(Meta::empty()),
    ))
}

pub async fn list_appointments(
    state: &AppState,
    user: &AuthUser,
    query: AppointmentListQuery,
) -> AppResult<ApiResponse<AppointmentList>> {
    let (page, per_page, offset) = query.pagination().normalize();

    let mut condition = Condition::all().add(
        Condition::any()
            .add(AppointmentCol::ClientId.eq(user.user_id))
            .add(AppointmentCol::ProviderId.eq(user.user_id)),
    );
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: AppointmentStatus = status
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid status {status}")))?;
        condition = condition.add(AppointmentCol::Status.eq(status.as_str()));
    }

    let mut finder = Appointments::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(AppointmentCol::AppointmentDate),
        SortOrder::Desc => finder.order_by_desc(AppointmentCol::AppointmentDate),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(per_page as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Appointment::from)
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        AppointmentList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn get_appointment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Appointment>> {
    let appointment = match Appointments::find_by_id(id).one(&state.orm).await? {
        Some(a) if is_participant(&a, user) => a,
        _ => return Err(AppError::not_found("Appointment")),
    };

    Ok(ApiResponse::success(
        "Ok",
        Appointment::from(appointment),
        Some(Meta::empty()),
    ))
}

pub async fn update_appointment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAppointmentRequest,
) -> AppResult<ApiResponse<Appointment>> {
    ensure_role(user, Role::Client)?;
    let now = Utc::now();
    let new_start = payload.validate(now)?;

    let txn = state.orm.begin().await?;
    let (appointment, service) = load_locked(&txn, id).await?;

    if appointment.client_id != user.user_id {
        return Err(AppError::not_found("Appointment"));
    }
    if !status_of(&appointment)?.is_live() {
        return Err(AppError::BadRequest(
            "Only pending or confirmed appointments can be updated".into(),
        ));
    }

    let mut attachments: Vec<Attachment> = if payload.keep_old_attachments.unwrap_or(false) {
        stored_list(&appointment.attachments, "attachments")?
    } else {
        Vec::new()
    };
    let replace_attachments = payload.attachments.is_some();
    if let Some(paths) = payload.attachments {
        attachments.extend(stamp_attachments(paths, now));
        if attachments.len() > MAX_ATTACHMENTS {
            return Err(AppError::BadRequest(format!(
                "An appointment can hold at most {MAX_ATTACHMENTS} attachments"
            )));
        }
    }

    // Re-submitting the booked date keeps the existing index row and its end.
    let current_start = appointment.appointment_date.with_timezone(&Utc);
    let rescheduled = match new_start.filter(|start| *start != current_start) {
        Some(start) => {
            let slot = BookingSpan::of(&service).slot_at(start)?;
            let booked = booked_slots(&txn, service.id).await?;
            ensure_slot_available(&booked, &slot, Some(appointment.id))?;
            Some(slot)
        }
        None => None,
    };

    let mut active: AppointmentActive = appointment.into();
    if let Some(slot) = rescheduled {
        active.appointment_date = Set(slot.start.into());
    }
    if let Some(location) = payload.location {
        active.location = Set(location.trim().to_string());
    }
    if let Some(info) = payload.additional_info {
        active.additional_info = Set(info);
    }
    if replace_attachments {
        active.attachments = Set(attachments_json(&attachments)?);
    }
    active.updated_at = Set(now.into());
    let appointment = active.update(&txn).await?;

    if let Some(slot) = rescheduled {
        write_booking(&txn, &appointment, slot).await?;
    }

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "update_appointment",
        "appointments",
        serde_json::json!({
            "appointment_id": appointment.id,
            "rescheduled_to": rescheduled.map(|slot| slot.start),
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Appointment updated successfully",
        Appointment::from(appointment),
        Some(Meta::empty()),
    ))
}

pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateStatusRequest,
) -> AppResult<ApiResponse<Appointment>> {
    let next = payload.status;
    let now = Utc::now();

    let txn = state.orm.begin().await?;
    let (appointment, _service) = load_locked(&txn, id).await?;

    // A provider booking their own service acts as the provider.
    let acting_as = if appointment.provider_id == user.user_id {
        Role::Provider
    } else if appointment.client_id == user.user_id {
        Role::Client
    } else {
        return Err(AppError::not_found("Appointment"));
    };

    let current = status_of(&appointment)?;
    if !current.can_transition(next, acting_as) {
        return Err(AppError::BadRequest(format!(
            "Cannot change appointment status from {current} to {next}"
        )));
    }

    let mut active: AppointmentActive = appointment.into();
    active.status = Set(next.as_str().to_string());
    match next {
        AppointmentStatus::Confirmed => active.confirmed_at = Set(Some(now.into())),
        AppointmentStatus::Cancelled => active.cancelled_at = Set(Some(now.into())),
        _ => {}
    }
    active.updated_at = Set(now.into());
    let appointment = active.update(&txn).await?;

    if !next.is_live() {
        ServiceAppointments::delete_by_id(appointment.id)
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "update_appointment_status",
        "appointments",
        serde_json::json!({
            "appointment_id": appointment.id,
            "from": current.as_str(),
            "to": next.as_str(),
        }),
    )
    .await;
    tracing::info!(appointment_id = %appointment.id, from = %current, to = %next, "appointment status changed");

    Ok(ApiResponse::success(
        "Appointment status updated successfully",
        Appointment::from(appointment),
        Some(Meta::empty()),
    ))
}

pub async fn review_appointment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ReviewRequest,
) -> AppResult<ApiResponse<Appointment>> {
    ensure_role(user, Role::Client)?;
    payload.validate()?;
    let now = Utc::now();

    let txn = state.orm.begin().await?;

    let appointment = match Appointments::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    {
        Some(a) if a.client_id == user.user_id => a,
        _ => return Err(AppError::not_found("Appointment")),
    };

    if status_of(&appointment)? != AppointmentStatus::Confirmed {
        return Err(AppError::BadRequest(
            "Only confirmed appointments can be reviewed".into(),
        ));
    }
    if appointment.appointment_date.with_timezone(&Utc) > now {
        return Err(AppError::BadRequest(
            "Appointment has not taken place yet".into(),
        ));
    }
    if appointment.rating.is_some() {
        return Err(AppError::BadRequest("Appointment already reviewed".into()));
    }

    let provider = Users::find_by_id(appointment.provider_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Provider"))?;

    let completed = provider.completed_appointments + 1;
    let rating = running_average(
        provider.rating,
        provider.completed_appointments,
        payload.rating,
    );

    let mut provider_active: UserActive = provider.into();
    provider_active.rating = Set(rating);
    provider_active.completed_appointments = Set(completed);
    provider_active.updated_at = Set(now.into());
    provider_active.update(&txn).await?;

    let mut active: AppointmentActive = appointment.into();
    active.rating = Set(Some(payload.rating));
    active.review = Set(payload.review.unwrap_or_default());
    active.updated_at = Set(now.into());
    let appointment = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "review_appointment",
        "appointments",
        serde_json::json!({ "appointment_id": appointment.id, "rating": payload.rating }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review submitted successfully",
        Appointment::from(appointment),
        Some(Meta::empty()),
    ))
}

pub async fn delete_appointment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let (appointment, _service) = load_locked(&txn, id).await?;

    if !is_participant(&appointment, user) {
        return Err(AppError::not_found("Appointment"));
    }

    ServiceAppointments::delete_by_id(appointment.id)
        .exec(&txn)
        .await?;
    Appointments::delete_by_id(appointment.id).exec(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "delete_appointment",
        "appointments",
        serde_json::json!({
            "appointment_id": appointment.id,
            "service_id": appointment.service_id,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Appointment deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_service_bookings(
    state: &AppState,
    service_id: Uuid,
) -> AppResult<ApiResponse<ServiceBookingList>> {
    if Services::find_by_id(service_id).one(&state.orm).await?.is_none() {
        return Err(AppError::not_found("Service"));
    }

    let items = ServiceAppointments::find()
        .filter(BookingCol::ServiceId.eq(service_id))
        .order_by_asc(BookingCol::AppointmentDate)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ServiceBooking::from)
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        ServiceBookingList { items },
        Some(Meta::empty()),
    ))
}

/// Takes the row lock that serializes every booking mutation on a service.
async fn lock_service<C: ConnectionTrait>(conn: &C, service_id: Uuid) -> AppResult<ServiceModel> {
    Services::find_by_id(service_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Service"))
}

/// Locks the appointment's service, then reads the appointment under that lock.
async fn load_locked<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<(AppointmentModel, ServiceModel)> {
    let service_id = Appointments::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Appointment"))?
        .service_id;

    let service = lock_service(conn, service_id).await?;

    let appointment = Appointments::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Appointment"))?;

    Ok((appointment, service))
}

async fn booked_slots<C: ConnectionTrait>(conn: &C, service_id: Uuid) -> AppResult<Vec<BookedSlot>> {
    Ok(ServiceAppointments::find()
        .filter(BookingCol::ServiceId.eq(service_id))
        .all(conn)
        .await?
        .into_iter()
        .map(BookedSlot::from)
        .collect())
}

/// Replaces the appointment's index entry with `slot`.
async fn write_booking<C: ConnectionTrait>(
    conn: &C,
    appointment: &AppointmentModel,
    slot: Slot,
) -> AppResult<()> {
    ServiceAppointments::delete_by_id(appointment.id)
        .exec(conn)
        .await?;

    BookingActive {
        appointment_id: Set(appointment.id),
        service_id: Set(appointment.service_id),
        appointment_date: Set(slot.start.into()),
        occupied_until: Set(slot.end.into()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

fn is_participant(appointment: &AppointmentModel, user: &AuthUser) -> bool {
    appointment.client_id == user.user_id || appointment.provider_id == user.user_id
}

fn status_of(appointment: &AppointmentModel) -> AppResult<AppointmentStatus> {
    appointment
        .status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

fn stamp_attachments(paths: Vec<String>, now: DateTime<Utc>) -> Vec<Attachment> {
    paths
        .into_iter()
        .map(|url| Attachment {
            url: url.trim().to_string(),
            uploaded_at: now,
        })
        .collect()
}

fn attachments_json(attachments: &[Attachment]) -> AppResult<serde_json::Value> {
    serde_json::to_value(attachments).map_err(|e| AppError::Internal(e.into()))
}

fn running_average(current: f64, count: i32, rating: i16) -> f64 {
    let count = f64::from(count.max(0));
    (current * count + f64::from(rating)) / (count + 1.0)
}
