mod common;

use axum_booking_api::{
    dto::{
        appointments::{
            CreateAppointmentRequest, ReviewRequest, UpdateAppointmentRequest, UpdateStatusRequest,
        },
        services::UpdateServiceRequest,
    },
    entity::{
        appointments::{ActiveModel as AppointmentActive, Entity as Appointments},
        audit_logs::{Column as AuditCol, Entity as AuditLogs},
        users::Entity as Users,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::{AppointmentStatus, Role, ServiceBooking},
    routes::params::ServiceSearchQuery,
    services::{appointment_service, catalog_service},
    state::AppState,
};
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use common::{CASABLANCA, create_service, create_user, database_url, setup_state};

fn booking(service_id: Uuid, price: i64, date: &str) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        service_id,
        service_price: price,
        appointment_date: date.into(),
        location: "12 Main St".into(),
        additional_info: None,
        attachments: None,
    }
}

async fn book(
    state: &AppState,
    client: &AuthUser,
    service_id: Uuid,
    date: &str,
) -> Result<Uuid, AppError> {
    let resp =
        appointment_service::create_appointment(state, client, booking(service_id, 100, date))
            .await?;
    Ok(resp.data.map(|a| a.id).unwrap_or_default())
}

async fn index(state: &AppState, service_id: Uuid) -> anyhow::Result<Vec<ServiceBooking>> {
    let resp = appointment_service::list_service_bookings(state, service_id).await?;
    Ok(resp.data.map(|list| list.items).unwrap_or_default())
}

async fn index_len(state: &AppState, service_id: Uuid) -> anyhow::Result<usize> {
    Ok(index(state, service_id).await?.len())
}

fn reschedule(date: &str) -> UpdateAppointmentRequest {
    UpdateAppointmentRequest {
        appointment_date: Some(date.into()),
        ..Default::default()
    }
}

fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, day, hour, minute, 0).unwrap()
}

async fn set_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    status: AppointmentStatus,
) -> Result<(), AppError> {
    appointment_service::update_status(state, user, id, UpdateStatusRequest { status }).await?;
    Ok(())
}

/// Moves an appointment into the past, which the booking API never allows.
async fn backdate(state: &AppState, id: Uuid) -> anyhow::Result<()> {
    let appointment = Appointments::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("appointment exists");
    let mut active: AppointmentActive = appointment.into();
    active.appointment_date = Set(Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap().into());
    active.update(&state.orm).await?;
    Ok(())
}

fn review(rating: i16) -> ReviewRequest {
    ReviewRequest {
        rating,
        review: Some("Great cut".into()),
    }
}

// Client books a 30/10/5 service; overlap, back-to-back, price and date guards,
// rescheduling, cancellation and deletion all keep the index in sync.
#[tokio::test]
async fn booking_lifecycle_keeps_service_index_consistent() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let provider = create_user(&state, Role::Provider, Some(CASABLANCA)).await?;
    let client = create_user(&state, Role::Client, None).await?;
    let service_id = create_service(&state, &provider).await?;

    // Occupies [10:00, 10:45).
    let first = book(&state, &client, service_id, "2030-01-01T10:00:00Z").await?;

    let overlapping = book(&state, &client, service_id, "2030-01-01T10:44:00Z").await;
    assert!(matches!(overlapping, Err(AppError::Conflict(_))));

    let adjacent = book(&state, &client, service_id, "2030-01-01T10:45:00Z").await?;
    // Ends exactly at 10:00.
    let before = book(&state, &client, service_id, "2030-01-01T09:15:00Z").await?;
    assert_eq!(index_len(&state, service_id).await?, 3);

    // Price is checked even when the slot is free.
    let wrong_price = appointment_service::create_appointment(
        &state,
        &client,
        booking(service_id, 90, "2030-01-02T12:00:00Z"),
    )
    .await;
    assert!(matches!(wrong_price, Err(AppError::BadRequest(_))));

    // Past dates fail before any lookup, even on an unknown service.
    let past = appointment_service::create_appointment(
        &state,
        &client,
        booking(Uuid::new_v4(), 100, "2020-01-01T10:00:00Z"),
    )
    .await;
    assert!(matches!(past, Err(AppError::BadRequest(_))));

    // Providers cannot book.
    let as_provider = book(&state, &provider, service_id, "2030-01-03T10:00:00Z").await;
    assert!(matches!(as_provider, Err(AppError::Forbidden(_))));

    // Re-submitting the current date does not conflict with itself.
    let same_date = appointment_service::update_appointment(
        &state,
        &client,
        first,
        UpdateAppointmentRequest {
            appointment_date: Some("2030-01-01T10:00:00Z".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(
        same_date.data.map(|a| a.appointment_date.to_rfc3339()),
        Some("2030-01-01T10:00:00+00:00".to_string())
    );

    // Moving onto another booking is refused.
    let onto_adjacent = appointment_service::update_appointment(
        &state,
        &client,
        first,
        UpdateAppointmentRequest {
            appointment_date: Some("2030-01-01T10:50:00Z".into()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(onto_adjacent, Err(AppError::Conflict(_))));

    // Deleting removes exactly one entry and frees the slot.
    appointment_service::delete_appointment(&state, &client, adjacent).await?;
    assert_eq!(index_len(&state, service_id).await?, 2);
    let rebooked = book(&state, &client, service_id, "2030-01-01T10:45:00Z").await?;
    assert_eq!(index_len(&state, service_id).await?, 3);

    // Provider confirms one and rejects another; only the rejected one leaves the index.
    appointment_service::update_status(
        &state,
        &provider,
        first,
        UpdateStatusRequest {
            status: AppointmentStatus::Confirmed,
        },
    )
    .await?;
    appointment_service::update_status(
        &state,
        &provider,
        before,
        UpdateStatusRequest {
            status: AppointmentStatus::Rejected,
        },
    )
    .await?;
    assert_eq!(index_len(&state, service_id).await?, 2);

    // Rejected appointments cannot be revived.
    let revive = appointment_service::update_status(
        &state,
        &provider,
        before,
        UpdateStatusRequest {
            status: AppointmentStatus::Confirmed,
        },
    )
    .await;
    assert!(matches!(revive, Err(AppError::BadRequest(_))));

    // Closed appointments cannot be edited or rescheduled.
    let edit_rejected = appointment_service::update_appointment(
        &state,
        &client,
        before,
        reschedule("2030-01-05T10:00:00Z"),
    )
    .await;
    assert!(matches!(edit_rejected, Err(AppError::BadRequest(_))));

    // The client cancels; the slot becomes bookable again.
    appointment_service::update_status(
        &state,
        &client,
        rebooked,
        UpdateStatusRequest {
            status: AppointmentStatus::Cancelled,
        },
    )
    .await?;
    assert_eq!(index_len(&state, service_id).await?, 1);
    let edit_cancelled = appointment_service::update_appointment(
        &state,
        &client,
        rebooked,
        UpdateAppointmentRequest {
            location: Some("34 Side St".into()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(edit_cancelled, Err(AppError::BadRequest(_))));
    book(&state, &client, service_id, "2030-01-01T10:45:00Z").await?;

    // Strangers see nothing.
    let stranger = create_user(&state, Role::Client, None).await?;
    let hidden = appointment_service::get_appointment(&state, &stranger, first).await;
    assert!(matches!(hidden, Err(AppError::NotFound(_))));

    // A service with upcoming bookings cannot be deleted.
    let delete_service = catalog_service::delete_service(&state, &provider, service_id).await;
    assert!(matches!(delete_service, Err(AppError::Conflict(_))));

    let audited = AuditLogs::find()
        .filter(AuditCol::UserId.eq(client.user_id))
        .filter(AuditCol::Action.eq("create_appointment"))
        .count(&state.orm)
        .await?;
    assert_eq!(audited, 5);

    Ok(())
}

// Index rows keep the end computed when they were written, so changing the
// service's duration or buffers only affects bookings made afterwards.
#[tokio::test]
async fn span_changes_leave_existing_index_rows_untouched() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let provider = create_user(&state, Role::Provider, None).await?;
    let client = create_user(&state, Role::Client, None).await?;
    let service_id = create_service(&state, &provider).await?;

    let first = book(&state, &client, service_id, "2030-01-07T10:00:00Z").await?;
    book(&state, &client, service_id, "2030-01-07T10:45:00Z").await?;

    // 30/10/5 becomes 40/10/5.
    catalog_service::update_service(
        &state,
        &provider,
        service_id,
        UpdateServiceRequest {
            duration_minutes: Some(40),
            ..Default::default()
        },
    )
    .await?;

    let ends: Vec<_> = index(&state, service_id)
        .await?
        .into_iter()
        .map(|row| row.occupied_until)
        .collect();
    assert_eq!(ends, vec![utc(7, 10, 45), utc(7, 11, 30)]);

    // The longer span would now reach 10:55, past the neighbour's start, yet
    // re-submitting the booked date is not a move.
    appointment_service::update_appointment(
        &state,
        &client,
        first,
        reschedule("2030-01-07T10:00:00Z"),
    )
    .await?;
    let rows = index(&state, service_id).await?;
    assert_eq!(rows[0].appointment_id, first);
    assert_eq!(rows[0].occupied_until, utc(7, 10, 45));

    // A genuine move uses the new span.
    let moved = appointment_service::update_appointment(
        &state,
        &client,
        first,
        reschedule("2030-01-07T10:01:00Z"),
    )
    .await;
    assert!(matches!(moved, Err(AppError::Conflict(_))));

    // New bookings use the new span.
    let later = book(&state, &client, service_id, "2030-01-07T11:30:00Z").await?;
    let rows = index(&state, service_id).await?;
    let row = rows
        .iter()
        .find(|row| row.appointment_id == later)
        .expect("index row for the new booking");
    assert_eq!(row.occupied_until, utc(7, 12, 25));
    let overlapping = book(&state, &client, service_id, "2030-01-07T12:20:00Z").await;
    assert!(matches!(overlapping, Err(AppError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn reviews_count_once_per_attended_appointment() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let provider = create_user(&state, Role::Provider, None).await?;
    let client = create_user(&state, Role::Client, None).await?;
    let service_id = create_service(&state, &provider).await?;

    let first = book(&state, &client, service_id, "2030-01-08T10:00:00Z").await?;
    let second = book(&state, &client, service_id, "2030-01-08T11:00:00Z").await?;
    let pending = book(&state, &client, service_id, "2030-01-08T12:00:00Z").await?;
    set_status(&state, &provider, first, AppointmentStatus::Confirmed).await?;
    set_status(&state, &provider, second, AppointmentStatus::Confirmed).await?;

    // Confirmed but still upcoming.
    let early = appointment_service::review_appointment(&state, &client, first, review(4)).await;
    assert!(matches!(early, Err(AppError::BadRequest(_))));

    backdate(&state, first).await?;
    backdate(&state, second).await?;
    backdate(&state, pending).await?;

    let reviewed =
        appointment_service::review_appointment(&state, &client, first, review(4)).await?;
    assert_eq!(reviewed.data.and_then(|a| a.rating), Some(4));

    let again = appointment_service::review_appointment(&state, &client, first, review(1)).await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));

    let unconfirmed =
        appointment_service::review_appointment(&state, &client, pending, review(5)).await;
    assert!(matches!(unconfirmed, Err(AppError::BadRequest(_))));

    let stranger = create_user(&state, Role::Client, None).await?;
    let foreign =
        appointment_service::review_appointment(&state, &stranger, second, review(5)).await;
    assert!(matches!(foreign, Err(AppError::NotFound(_))));

    appointment_service::review_appointment(&state, &client, second, review(2)).await?;

    let stats = Users::find_by_id(provider.user_id)
        .one(&state.orm)
        .await?
        .expect("provider exists");
    assert_eq!(stats.completed_appointments, 2);
    assert!((stats.rating - 3.0).abs() < f64::EPSILON);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_overlapping_bookings_admit_exactly_one() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let provider = create_user(&state, Role::Provider, None).await?;
    let alice = create_user(&state, Role::Client, None).await?;
    let bob = create_user(&state, Role::Client, None).await?;
    let service_id = create_service(&state, &provider).await?;

    let (a, b) = tokio::join!(
        book(&state, &alice, service_id, "2030-02-01T10:00:00Z"),
        book(&state, &bob, service_id, "2030-02-01T10:20:00Z"),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one overlapping booking should win");
    assert!(matches!(a, Err(AppError::Conflict(_))) || matches!(b, Err(AppError::Conflict(_))));
    assert_eq!(index_len(&state, service_id).await?, 1);

    Ok(())
}

#[tokio::test]
async fn search_keeps_nearby_providers_only() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let near = create_user(&state, Role::Provider, Some((-7.62, 33.59))).await?;
    // Rabat, roughly 87 km away.
    let far = create_user(&state, Role::Provider, Some((-6.8498, 34.0209))).await?;
    let near_service = create_service(&state, &near).await?;
    let far_service = create_service(&state, &far).await?;

    let search = |service_id: Uuid| ServiceSearchQuery {
        city: Some("Casablanca".into()),
        name: Some(service_id.to_string()),
        category: Some("hair".into()),
        ..Default::default()
    };

    let resp = catalog_service::search_services(&state, search(near_service)).await?;
    let ids: Vec<Uuid> = resp
        .data
        .map(|list| list.items.into_iter().map(|item| item.service.id).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec![near_service]);

    // Filtered out by distance, which leaves nothing to return.
    let too_far = catalog_service::search_services(&state, search(far_service)).await;
    assert!(matches!(too_far, Err(AppError::NotFound(_))));

    let unknown_city = catalog_service::search_services(
        &state,
        ServiceSearchQuery {
            city: Some("Atlantis".into()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(unknown_city, Err(AppError::NotFound(_))));

    Ok(())
}
