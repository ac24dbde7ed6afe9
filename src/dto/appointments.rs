use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{require_paths, require_text},
    error::{AppError, AppResult},
    models::{Appointment, AppointmentStatus},
    scheduling::{ensure_future, parse_appointment_date},
};

pub const MAX_ATTACHMENTS: usize = 5;
const MAX_ADDITIONAL_INFO: usize = 1000;
const MAX_REVIEW: usize = 1000;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateAppointmentRequest {
    pub service_id: Uuid,
    pub service_price: i64,
    /// RFC 3339 timestamp, or `YYYY-MM-DDTHH:MM[:SS]` in UTC.
    pub appointment_date: String,
    pub location: String,
    pub additional_info: Option<String>,
    pub attachments: Option<Vec<String>>,
}

impl CreateAppointmentRequest {
    /// Field checks that need no lookup. Returns the parsed start time.
    pub fn validate(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        if self.service_price <= 0 {
            return Err(AppError::BadRequest(
                "Service price must be a positive number".into(),
            ));
        }
        require_text(&self.location, "Location", 200)?;
        if let Some(info) = self.additional_info.as_deref() {
            validate_additional_info(info)?;
        }
        if let Some(attachments) = self.attachments.as_deref() {
            require_paths(attachments, "Attachments", MAX_ATTACHMENTS)?;
        }
        let date = parse_appointment_date(&self.appointment_date)?;
        ensure_future(date, now)?;
        Ok(date)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<String>,
    pub location: Option<String>,
    pub additional_info: Option<String>,
    pub attachments: Option<Vec<String>>,
    /// When true, `attachments` are appended to the existing ones.
    pub keep_old_attachments: Option<bool>,
}

impl UpdateAppointmentRequest {
    /// Returns the new start time when one was supplied.
    pub fn validate(&self, now: DateTime<Utc>) -> AppResult<Option<DateTime<Utc>>> {
        if let Some(location) = self.location.as_deref() {
            require_text(location, "Location", 200)?;
        }
        if let Some(info) = self.additional_info.as_deref() {
            validate_additional_info(info)?;
        }
        if let Some(attachments) = self.attachments.as_deref() {
            require_paths(attachments, "Attachments", MAX_ATTACHMENTS)?;
        }
        self.appointment_date
            .as_deref()
            .map(|raw| {
                let date = parse_appointment_date(raw)?;
                ensure_future(date, now)?;
                Ok(date)
            })
            .transpose()
    }
}

fn validate_additional_info(info: &str) -> AppResult<()> {
    if info.chars().count() > MAX_ADDITIONAL_INFO {
        return Err(AppError::BadRequest(format!(
            "Additional info must not exceed {MAX_ADDITIONAL_INFO} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub rating: i16,
    pub review: Option<String>,
}

impl ReviewRequest {
    pub fn validate(&self) -> AppResult<()> {
        if !(0..=5).contains(&self.rating) {
            return Err(AppError::BadRequest("Rating must be between 0 and 5".into()));
        }
        if let Some(review) = self.review.as_deref() {
            if review.chars().count() > MAX_REVIEW {
                return Err(AppError::BadRequest(format!(
                    "Review must not exceed {MAX_REVIEW} characters"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentList {
    pub items: Vec<Appointment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2029, 6, 1, 9, 0, 0).unwrap()
    }

    fn create() -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            service_id: Uuid::new_v4(),
            service_price: 100,
            appointment_date: "2030-01-01T10:00".into(),
            location: "12 Main St".into(),
            additional_info: None,
            attachments: Some(vec!["/uploads/ref.jpg".into()]),
        }
    }

    #[test]
    fn create_returns_parsed_date() {
        let date = create().validate(now()).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn create_rejects_past_dates_and_bad_prices() {
        let mut req = create();
        req.appointment_date = "2020-01-01T10:00:00Z".into();
        assert!(matches!(req.validate(now()), Err(AppError::BadRequest(_))));

        let mut req = create();
        req.service_price = 0;
        assert!(req.validate(now()).is_err());

        let mut req = create();
        req.location = "  ".into();
        assert!(req.validate(now()).is_err());

        let mut req = create();
        req.attachments = Some(vec!["a".into(); MAX_ATTACHMENTS + 1]);
        assert!(req.validate(now()).is_err());
    }

    #[test]
    fn update_date_is_optional() {
        assert_eq!(UpdateAppointmentRequest::default().validate(now()).unwrap(), None);
        let req = UpdateAppointmentRequest {
            appointment_date: Some("2029-05-01T10:00:00Z".into()),
            ..Default::default()
        };
        assert!(req.validate(now()).is_err());
    }

    #[test]
    fn review_rating_range() {
        let ok = ReviewRequest { rating: 5, review: None };
        assert!(ok.validate().is_ok());
        let bad = ReviewRequest { rating: 6, review: None };
        assert!(bad.validate().is_err());
    }
}
