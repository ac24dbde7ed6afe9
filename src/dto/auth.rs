use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::require_text,
    error::{AppError, AppResult},
    geocode::Coordinates,
    models::{Role, User},
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize, Debug, ToSchema)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: String,
    /// `[longitude, latitude]`
    #[schema(value_type = Option<Vec<f64>>)]
    pub location: Option<[f64; 2]>,
    pub business_name: Option<String>,
    pub contact_preference: Option<String>,
}

impl SignupRequest {
    pub fn validate(&self) -> AppResult<Role> {
        require_text(&self.name, "Name", 100)?;
        validate_email(&self.email)?;
        validate_passwords(&self.password, &self.password_confirm)?;

        let role = self.role.parse::<Role>().map_err(|_| {
            AppError::BadRequest("Invalid role. Allowed roles are client, provider, admin".into())
        })?;

        if let Some([lng, lat]) = self.location {
            if !Coordinates::new(lng, lat).is_valid() {
                return Err(AppError::BadRequest(
                    "Location must be [longitude, latitude] within valid ranges".into(),
                ));
            }
        }
        if let Some(pref) = self.contact_preference.as_deref() {
            if pref != "email" && pref != "phone" {
                return Err(AppError::BadRequest(
                    "Contact preference must be email or phone".into(),
                ));
            }
        }
        if let Some(business) = self.business_name.as_deref() {
            require_text(business, "Business name", 100)?;
        }
        Ok(role)
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::BadRequest("Please provide a valid email".into()));
    }
    Ok(())
}

pub fn validate_passwords(password: &str, confirm: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != confirm {
        return Err(AppError::BadRequest("Passwords do not match".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> SignupRequest {
        SignupRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "correct-horse".into(),
            password_confirm: "correct-horse".into(),
            role: "provider".into(),
            location: Some([-7.59, 33.57]),
            business_name: Some("Ada's Studio".into()),
            contact_preference: None,
        }
    }

    #[test]
    fn accepts_valid_signup() {
        assert_eq!(signup().validate().unwrap(), Role::Provider);
    }

    #[test]
    fn rejects_mismatched_passwords_and_unknown_roles() {
        let mut req = signup();
        req.password_confirm = "something-else".into();
        assert!(req.validate().is_err());

        let mut req = signup();
        req.role = "superuser".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_location() {
        let mut req = signup();
        req.location = Some([200.0, 10.0]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a@localhost").is_err());
    }
}
