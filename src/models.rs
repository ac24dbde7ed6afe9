use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::{appointments, service_appointments, services, users},
    error::{AppError, AppResult},
};

/// Decodes a JSON list column that is about to be merged and written back.
pub fn stored_list<T: DeserializeOwned>(
    value: &serde_json::Value,
    column: &str,
) -> AppResult<Vec<T>> {
    serde_json::from_value(value.clone())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed stored {column}: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "provider" => Ok(Role::Provider),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Live appointments hold a slot in their service's index.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        )
    }

    /// Whether `role` may move an appointment from `self` to `next`.
    pub fn can_transition(&self, next: AppointmentStatus, role: Role) -> bool {
        use AppointmentStatus::*;
        match (role, self, next) {
            (Role::Provider, Pending, Confirmed | Rejected) => true,
            (Role::Provider | Role::Client, Pending | Confirmed, Cancelled) => true,
            _ => false,
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "rejected" => Ok(AppointmentStatus::Rejected),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status {other}")),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderDetails {
    pub business_name: Option<String>,
    pub rating: f64,
    pub completed_appointments: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
    pub contact_preference: String,
    /// `[longitude, latitude]`
    #[schema(value_type = Option<Vec<f64>>)]
    pub location: Option<[f64; 2]>,
    pub provider_details: Option<ProviderDetails>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        let location = match (model.longitude, model.latitude) {
            (Some(lng), Some(lat)) => Some([lng, lat]),
            _ => None,
        };
        let provider_details = (model.role == Role::Provider.as_str()).then(|| ProviderDetails {
            business_name: model.business_name.clone(),
            rating: model.rating,
            completed_appointments: model.completed_appointments,
        });
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            email_verified: model.email_verified,
            contact_preference: model.contact_preference,
            location,
            provider_details,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub details: ProviderDetails,
}

impl From<users::Model> for ProviderSummary {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            details: ProviderDetails {
                business_name: model.business_name,
                rating: model.rating,
                completed_appointments: model.completed_appointments,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub price: i64,
    pub duration_minutes: i32,
    pub preparation_time_minutes: i32,
    pub cleanup_time_minutes: i32,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<services::Model> for Service {
    fn from(model: services::Model) -> Self {
        Self {
            id: model.id,
            provider_id: model.provider_id,
            name: model.name,
            description: model.description,
            images: serde_json::from_value(model.images).unwrap_or_default(),
            price: model.price,
            duration_minutes: model.duration_minutes,
            preparation_time_minutes: model.preparation_time_minutes,
            cleanup_time_minutes: model.cleanup_time_minutes,
            category: model.category,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub service_price: i64,
    pub appointment_date: DateTime<Utc>,
    pub location: String,
    pub status: String,
    pub attachments: Vec<Attachment>,
    pub additional_info: String,
    pub rating: Option<i16>,
    pub review: String,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<appointments::Model> for Appointment {
    fn from(model: appointments::Model) -> Self {
        Self {
            id: model.id,
            client_id: model.client_id,
            provider_id: model.provider_id,
            service_id: model.service_id,
            service_price: model.service_price,
            appointment_date: model.appointment_date.with_timezone(&Utc),
            location: model.location,
            status: model.status,
            attachments: serde_json::from_value(model.attachments).unwrap_or_default(),
            additional_info: model.additional_info,
            rating: model.rating,
            review: model.review,
            confirmed_at: model.confirmed_at.map(|dt| dt.with_timezone(&Utc)),
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Entry of a service's appointment index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceBooking {
    pub appointment_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub occupied_until: DateTime<Utc>,
}

impl From<service_appointments::Model> for ServiceBooking {
    fn from(model: service_appointments::Model) -> Self {
        Self {
            appointment_id: model.appointment_id,
            appointment_date: model.appointment_date.with_timezone(&Utc),
            occupied_until: model.occupied_until.with_timezone(&Utc),
        }
    }
}
