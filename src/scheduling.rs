//! Appointment interval arithmetic and the booking overlap check.
//!
//! A booking occupies `[start, start + duration + preparation + cleanup)`.
//! Intervals are half-open, so a booking may start exactly when another ends.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::{
    entity::{service_appointments, services},
    error::{AppError, AppResult},
};

/// Minutes a single booking keeps a service busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingSpan {
    pub duration_minutes: i32,
    pub preparation_minutes: i32,
    pub cleanup_minutes: i32,
}

impl BookingSpan {
    pub fn new(duration_minutes: i32, preparation_minutes: i32, cleanup_minutes: i32) -> Self {
        Self {
            duration_minutes,
            preparation_minutes,
            cleanup_minutes,
        }
    }

    pub fn of(service: &services::Model) -> Self {
        Self::new(
            service.duration_minutes,
            service.preparation_time_minutes,
            service.cleanup_time_minutes,
        )
    }

    pub fn total(&self) -> Duration {
        let minutes = i64::from(self.duration_minutes)
            + i64::from(self.preparation_minutes)
            + i64::from(self.cleanup_minutes);
        Duration::minutes(minutes)
    }

    pub fn slot_at(&self, start: DateTime<Utc>) -> AppResult<Slot> {
        let end = start
            .checked_add_signed(self.total())
            .ok_or_else(|| AppError::BadRequest("Appointment date is out of range".into()))?;
        Ok(Slot { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// An existing entry of a service's appointment index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedSlot {
    pub appointment_id: Uuid,
    pub slot: Slot,
}

impl From<service_appointments::Model> for BookedSlot {
    fn from(model: service_appointments::Model) -> Self {
        Self {
            appointment_id: model.appointment_id,
            slot: Slot {
                start: model.appointment_date.with_timezone(&Utc),
                end: model.occupied_until.with_timezone(&Utc),
            },
        }
    }
}

/// First booked slot that intersects `proposed`, ignoring the entry owned by `exclude`.
pub fn find_conflict<'a>(
    booked: &'a [BookedSlot],
    proposed: &Slot,
    exclude: Option<Uuid>,
) -> Option<&'a BookedSlot> {
    booked
        .iter()
        .filter(|entry| Some(entry.appointment_id) != exclude)
        .find(|entry| entry.slot.overlaps(proposed))
}

pub fn ensure_slot_available(
    booked: &[BookedSlot],
    proposed: &Slot,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    match find_conflict(booked, proposed, exclude) {
        Some(conflict) => {
            tracing::debug!(
                conflicting_appointment = %conflict.appointment_id,
                start = %proposed.start,
                end = %proposed.end,
                "slot unavailable"
            );
            Err(AppError::Conflict(
                "This service is already booked for the selected date and time".into(),
            ))
        }
        None => Ok(()),
    }
}

/// Latest calendar year a booking may fall in.
pub const MAX_BOOKING_YEAR: i32 = 9999;

/// Accepts RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
pub fn parse_appointment_date(raw: &str) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc()),
    };
    let date =
        parsed.ok_or_else(|| AppError::BadRequest("Appointment date must be a valid date".into()))?;
    if date.year() > MAX_BOOKING_YEAR {
        return Err(AppError::BadRequest("Appointment date is out of range".into()));
    }
    Ok(date)
}

pub fn ensure_future(date: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<()> {
    if date <= now {
        return Err(AppError::BadRequest(
            "Appointment date must be a valid future date".into(),
        ));
    }
    Ok(())
}

pub fn ensure_price_matches(requested: i64, actual: i64) -> AppResult<()> {
    if requested != actual {
        return Err(AppError::BadRequest(
            "Provided service price does not match the actual service price".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, hour, minute, 0).unwrap()
    }

    fn span() -> BookingSpan {
        BookingSpan::new(30, 10, 5)
    }

    fn booked(start: DateTime<Utc>) -> BookedSlot {
        BookedSlot {
            appointment_id: Uuid::new_v4(),
            slot: span().slot_at(start).unwrap(),
        }
    }

    #[test]
    fn span_includes_buffers() {
        assert_eq!(span().total(), Duration::minutes(45));
        assert_eq!(span().slot_at(at(10, 0)).unwrap().end, at(10, 45));
    }

    #[rstest]
    #[case(at(10, 44), true)]
    #[case(at(10, 45), false)]
    #[case(at(9, 15), false)]
    #[case(at(9, 16), true)]
    #[case(at(10, 0), true)]
    #[case(at(10, 20), true)]
    fn proposed_against_ten_oclock(#[case] start: DateTime<Utc>, #[case] conflicts: bool) {
        let existing = vec![booked(at(10, 0))];
        let proposed = span().slot_at(start).unwrap();
        assert_eq!(find_conflict(&existing, &proposed, None).is_some(), conflicts);
    }

    #[test]
    fn own_entry_is_ignored_when_excluded() {
        let existing = vec![booked(at(10, 0)), booked(at(12, 0))];
        let own = existing[0].appointment_id;
        let proposed = span().slot_at(at(10, 0)).unwrap();

        assert!(find_conflict(&existing, &proposed, Some(own)).is_none());
        assert!(find_conflict(&existing, &proposed, None).is_some());

        let moved = span().slot_at(at(12, 30)).unwrap();
        let hit = find_conflict(&existing, &moved, Some(own)).unwrap();
        assert_eq!(hit.appointment_id, existing[1].appointment_id);
    }

    #[test]
    fn conflict_maps_to_conflict_error() {
        let existing = vec![booked(at(10, 0))];
        let overlapping = span().slot_at(at(10, 30)).unwrap();
        let err = ensure_slot_available(&existing, &overlapping, None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let adjacent = span().slot_at(at(10, 45)).unwrap();
        assert!(ensure_slot_available(&existing, &adjacent, None).is_ok());
    }

    #[test]
    fn zero_length_buffers_still_block_the_duration() {
        let short = BookingSpan::new(15, 0, 0);
        let existing = vec![BookedSlot {
            appointment_id: Uuid::new_v4(),
            slot: short.slot_at(at(8, 0)).unwrap(),
        }];
        assert!(find_conflict(&existing, &short.slot_at(at(8, 14)).unwrap(), None).is_some());
        assert!(find_conflict(&existing, &short.slot_at(at(8, 15)).unwrap(), None).is_none());
    }

    #[rstest]
    #[case("2030-01-01T10:00:00Z", at(10, 0))]
    #[case("2030-01-01T12:00:00+02:00", at(10, 0))]
    #[case("2030-01-01T10:44", at(10, 44))]
    #[case("2030-01-01 10:45:00", at(10, 45))]
    fn parses_supported_formats(#[case] raw: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_appointment_date(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("tomorrow")]
    #[case("2030-13-01T10:00")]
    #[case("+262142-12-31T23:59")]
    #[case("10000-01-01T00:00")]
    fn rejects_malformed_dates(#[case] raw: &str) {
        assert!(matches!(
            parse_appointment_date(raw),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn slot_past_the_calendar_end_is_rejected() {
        let last = DateTime::<Utc>::MAX_UTC - Duration::minutes(10);
        assert!(matches!(
            span().slot_at(last),
            Err(AppError::BadRequest(_))
        ));
        assert!(BookingSpan::new(5, 0, 0).slot_at(last).is_ok());
    }

    #[test]
    fn past_and_present_dates_are_rejected() {
        let now = at(10, 0);
        assert!(ensure_future(at(9, 59), now).is_err());
        assert!(ensure_future(now, now).is_err());
        assert!(ensure_future(at(10, 1), now).is_ok());
    }

    #[test]
    fn price_must_match_exactly() {
        assert!(ensure_price_matches(100, 100).is_ok());
        assert!(matches!(
            ensure_price_matches(90, 100),
            Err(AppError::BadRequest(_))
        ));
    }
}
