pub mod appointments;
pub mod auth;
pub mod services;

use crate::error::{AppError, AppResult};

pub(crate) fn require_text(value: &str, field: &str, max_chars: usize) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "{field} must not exceed {max_chars} characters"
        )));
    }
    Ok(())
}

pub(crate) fn require_paths(paths: &[String], field: &str, max_items: usize) -> AppResult<()> {
    if paths.len() > max_items {
        return Err(AppError::BadRequest(format!(
            "{field} must not contain more than {max_items} entries"
        )));
    }
    if paths.iter().any(|p| p.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "{field} must be non-empty strings"
        )));
    }
    Ok(())
}
