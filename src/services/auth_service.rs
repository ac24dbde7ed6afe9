use std::time::Duration as StdDuration;

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use rand::{Rng, RngCore};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    audit,
    cache::{otp_key, session_key},
    dto::auth::{
        Claims, EmailRequest, LoginRequest, LoginResponse, ResetPasswordRequest, SignupRequest,
        VerifyOtpRequest, validate_email, validate_passwords,
    },
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    mail::{EmailJob, templates},
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn signup(state: &AppState, payload: SignupRequest) -> AppResult<ApiResponse<User>> {
    let role = payload.validate()?;
    let email = normalize_email(&payload.email);

    if find_by_email(state, &email).await?.is_some() {
        return Err(AppError::BadRequest(
            "User with this email already exists".into(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;
    let (longitude, latitude) = match payload.location {
        Some([lng, lat]) => (Some(lng), Some(lat)),
        None => (None, None),
    };

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        email: Set(email),
        password_hash: Set(password_hash),
        email_verified: Set(false),
        role: Set(role.as_str().to_string()),
        contact_preference: Set(payload
            .contact_preference
            .unwrap_or_else(|| "email".to_string())),
        reset_password_token: Set(None),
        reset_password_expires_at: Set(None),
        longitude: Set(longitude),
        latitude: Set(latitude),
        business_name: Set(payload.business_name),
        rating: Set(0.0),
        completed_appointments: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    send_otp(state, &user.email);

    audit::record(
        &state.pool,
        Some(user.id),
        "user_signup",
        "users",
        serde_json::json!({ "user_id": user.id, "role": user.role }),
    )
    .await;
    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    Ok(ApiResponse::success(
        "User registered successfully, OTP sent to email",
        User::from(user),
        Some(Meta::empty()),
    ))
}

pub async fn resend_otp(
    state: &AppState,
    payload: EmailRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_email(&payload.email)?;
    let user = find_by_email(state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if user.email_verified {
        return Err(AppError::BadRequest("Email already verified".into()));
    }

    send_otp(state, &user.email);

    Ok(ApiResponse::success(
        "Otp resent successfully, check your email",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn verify_otp(
    state: &AppState,
    payload: VerifyOtpRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_email(&payload.email)?;
    let email = normalize_email(&payload.email);
    let key = otp_key(&email);

    match state.cache.get(&key) {
        Some(stored) if stored == payload.otp.trim() => {}
        _ => return Err(AppError::Unauthorized("Invalid or expired OTP".into())),
    }

    let user = find_by_email(state, &email)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid email".into()))?;

    let user_id = user.id;
    let mut active: UserActive = user.into();
    active.email_verified = Set(true);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    state.cache.del(&key);

    audit::record(
        &state.pool,
        Some(user_id),
        "user_verify_email",
        "users",
        serde_json::json!({ "user_id": user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User verified successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<ApiResponse<LoginResponse>> {
    let invalid = || AppError::Unauthorized("Incorrect email or password".into());

    let user = find_by_email(state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(invalid)?;

    if !user.email_verified {
        return Err(AppError::Unauthorized(
            "Please verify your email first".into(),
        ));
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = start_session(state, &user)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User logged in successfully",
        LoginResponse {
            token,
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

pub async fn logout(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<serde_json::Value>> {
    state.cache.del(&session_key(user.user_id));

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_logout",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged out successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn forgot_password(
    state: &AppState,
    payload: EmailRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_email(&payload.email)?;
    let user = find_by_email(state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let reset_token = hex::encode(raw);
    let ttl = state.config.reset_token_ttl_mins;

    let email = user.email.clone();
    let mut active: UserActive = user.into();
    active.reset_password_token = Set(Some(sha256_hex(&reset_token)));
    active.reset_password_expires_at = Set(Some((Utc::now() + Duration::minutes(ttl)).into()));
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    let reset_url = format!(
        "{}/api/auth/reset-password/{reset_token}",
        state.config.public_url.trim_end_matches('/')
    );
    let (subject, html) = templates::reset_password_email(&reset_url, ttl);
    state.emails.enqueue(EmailJob::new(email, subject, html));

    Ok(ApiResponse::success(
        "Password reset email sent successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    validate_email(&payload.email)?;
    validate_passwords(&payload.password, &payload.password_confirm)?;

    let user = find_by_email(state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid email".into()))?;

    let token_matches = user.reset_password_token.as_deref() == Some(sha256_hex(token).as_str());
    let unexpired = user
        .reset_password_expires_at
        .is_some_and(|expires| expires.with_timezone(&Utc) > Utc::now());
    if !token_matches || !unexpired {
        return Err(AppError::BadRequest("Invalid or expired token".into()));
    }

    let mut active: UserActive = user.into();
    active.password_hash = Set(hash_password(&payload.password)?);
    active.reset_password_token = Set(None);
    active.reset_password_expires_at = Set(None);
    active.updated_at = Set(Utc::now().into());
    let user = active.update(&state.orm).await?;

    let token = start_session(state, &user)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_reset_password",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password reset successfully",
        LoginResponse {
            token,
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

async fn find_by_email(state: &AppState, email: &str) -> AppResult<Option<UserModel>> {
    Ok(Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn send_otp(state: &AppState, email: &str) {
    let otp = rand::thread_rng().gen_range(100_000..1_000_000).to_string();
    let ttl = state.config.otp_ttl_secs;
    state
        .cache
        .set_ex(otp_key(email), StdDuration::from_secs(ttl), otp.clone());

    let (subject, html) = templates::otp_email(&otp, ttl / 60);
    state.emails.enqueue(EmailJob::new(email, subject, html));
}

/// Signs a JWT and records it as the user's only active session.
fn start_session(state: &AppState, user: &UserModel) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(state.config.jwt_expires_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    state.cache.set_ex(
        session_key(user.id),
        StdDuration::from_secs(state.config.session_ttl_secs),
        token.clone(),
    );
    Ok(token)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn reset_tokens_are_stored_hashed() {
        let digest = sha256_hex("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
