use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use shared::{
    Ack, ActionResponse, AuthResponse, ChangePasswordRequest, Data, LoginRequest,
    RegisterRequest, Role, UserView,
};
use std::convert::Infallible;

use super::extract::Json;
use crate::{
    error::AppError,
    state::AppState,
    validation::{validate_new_password, validate_register},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: Role,
    pub exp: usize,
}

/// The caller, as identified by their bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

/// A caller holding the ADMIN role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl AdminUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::AuthError("Not signed in".to_string()))?;
        let claims = verify_token(bearer.token(), &state.config.auth.jwt_secret)?;
        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// Address the request came from, for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"))
            .unwrap_or("unknown");
        Ok(ClientIp(ip.to_string()))
    }
}

impl AppState {
    /// Counts one submission from `ip`.
    pub fn rate_limit(&self, ip: &ClientIp) -> Result<(), AppError> {
        if self.limiter.check(&ip.0) {
            Ok(())
        } else {
            tracing::warn!("Rate limit hit for {}", ip.0);
            Err(AppError::RateLimited)
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ActionResponse<AuthResponse>>, AppError> {
    validate_register(&req)?;
    let email = req.email.trim().to_lowercase();

    // Check if user already exists
    if state.db.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest("Email already registered".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = state.db.create_user(&email, &password_hash, name).await?;
    tracing::info!("Registered {} as {}", user.email, user.role);

    let token = issue_token(&state, &user.id, user.role).await?;
    Ok(Json(ActionResponse::ok_with(
        "Account created",
        AuthResponse {
            token,
            user_id: user.id,
            role: user.role,
        },
    )))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ActionResponse<AuthResponse>>, AppError> {
    let invalid = || AppError::AuthError("Invalid email or password".to_string());

    let user = state
        .db
        .get_user_by_email(&req.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = issue_token(&state, &user.id, user.role).await?;
    Ok(Json(ActionResponse::ok(AuthResponse {
        token,
        user_id: user.id,
        role: user.role,
    })))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ActionResponse<Data<UserView>>>, AppError> {
    let user = state
        .db
        .get_user_by_id(&user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(ActionResponse::ok(Data { data: user.into() })))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<Ack>, AppError> {
    validate_new_password(&req.new_password)?;
    let account = state
        .db
        .get_user_by_id(&user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    if !verify_password(&req.current_password, &account.password_hash)? {
        let mut errors = shared::FieldErrors::new();
        errors.add("current_password", "Current password is incorrect");
        return Err(errors.into());
    }

    let password_hash = hash_password(&req.new_password)?;
    state.db.update_password(&user.id, &password_hash).await?;
    tracing::info!("Password changed for {}", user.id);
    Ok(Json(Ack::done("Password updated")))
}

/// Signs a token whose lifetime follows the user's session timeout setting,
/// falling back to the configured default.
async fn issue_token(state: &AppState, user_id: &str, role: Role) -> Result<String, AppError> {
    let settings = state.db.get_user_settings(user_id).await?;
    let lifetime = settings
        .session_timeout_minutes
        .filter(|m| *m > 0)
        .map(Duration::minutes)
        .unwrap_or_else(|| Duration::hours(state.config.auth.token_expiry_hours as i64));
    generate_token(user_id, role, lifetime, &state.config.auth.jwt_secret)
}

pub fn generate_token(
    user_id: &str,
    role: Role,
    lifetime: Duration,
    secret: &str,
) -> Result<String, AppError> {
    let expiration = Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| AppError::Internal("Failed to calculate expiration".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthError("Session expired, please sign in again".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = generate_token("u1", Role::Admin, Duration::minutes(30), "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Admin);
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = generate_token("u1", Role::User, Duration::hours(-2), "secret").unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }
}
