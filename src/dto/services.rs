use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::{require_paths, require_text},
    error::{AppError, AppResult},
    models::{ProviderSummary, Service, ServiceBooking},
};

pub const MAX_IMAGES: usize = 5;
const MAX_PRICE: i64 = 10_000;
const MAX_DURATION_MINUTES: i32 = 24 * 60;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub price: i64,
    pub duration_minutes: i32,
    pub preparation_time_minutes: Option<i32>,
    pub cleanup_time_minutes: Option<i32>,
    pub category: Option<String>,
}

impl CreateServiceRequest {
    pub fn validate(&self) -> AppResult<()> {
        require_text(&self.name, "Service name", 100)?;
        require_text(&self.description, "Description", 500)?;
        if self.images.is_empty() {
            return Err(AppError::BadRequest("At least one image is required".into()));
        }
        require_paths(&self.images, "Images", MAX_IMAGES)?;
        validate_price(self.price)?;
        validate_duration(self.duration_minutes)?;
        validate_buffer(self.preparation_time_minutes, "Preparation time")?;
        validate_buffer(self.cleanup_time_minutes, "Cleanup time")?;
        if let Some(category) = self.category.as_deref() {
            require_text(category, "Category", 50)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    /// When true, `images` are appended to the existing ones instead of replacing them.
    pub keep_old_images: Option<bool>,
    pub price: Option<i64>,
    pub duration_minutes: Option<i32>,
    pub preparation_time_minutes: Option<i32>,
    pub cleanup_time_minutes: Option<i32>,
    pub category: Option<String>,
}

impl UpdateServiceRequest {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = self.name.as_deref() {
            require_text(name, "Service name", 100)?;
        }
        if let Some(description) = self.description.as_deref() {
            require_text(description, "Description", 500)?;
        }
        if let Some(images) = self.images.as_deref() {
            require_paths(images, "Images", MAX_IMAGES)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(duration) = self.duration_minutes {
            validate_duration(duration)?;
        }
        validate_buffer(self.preparation_time_minutes, "Preparation time")?;
        validate_buffer(self.cleanup_time_minutes, "Cleanup time")?;
        if let Some(category) = self.category.as_deref() {
            require_text(category, "Category", 50)?;
        }
        Ok(())
    }
}

fn validate_price(price: i64) -> AppResult<()> {
    if price <= 0 || price >= MAX_PRICE {
        return Err(AppError::BadRequest(format!(
            "Price must be a positive number below {MAX_PRICE}"
        )));
    }
    Ok(())
}

fn validate_duration(minutes: i32) -> AppResult<()> {
    if minutes <= 0 || minutes >= MAX_DURATION_MINUTES {
        return Err(AppError::BadRequest(
            "Duration must be a positive number of minutes below 24 hours".into(),
        ));
    }
    Ok(())
}

fn validate_buffer(minutes: Option<i32>, field: &str) -> AppResult<()> {
    match minutes {
        Some(m) if m < 0 => Err(AppError::BadRequest(format!(
            "{field} must be a non-negative integer"
        ))),
        Some(m) if m >= MAX_DURATION_MINUTES => Err(AppError::BadRequest(format!(
            "{field} must be below 24 hours"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceWithProvider {
    pub service: Service,
    pub provider: Option<ProviderSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceList {
    pub items: Vec<ServiceWithProvider>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceBookingList {
    pub items: Vec<ServiceBooking>,
}
