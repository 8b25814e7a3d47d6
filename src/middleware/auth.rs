use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError};

pub const ROLE_USER: &str = "USER";
pub const ROLE_SELLER: &str = "SELLER";
pub const ROLE_ADMIN: &str = "ADMIN";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_seller(user: &AuthUser) -> Result<(), AppError> {
    if user.role != ROLE_SELLER && user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

fn authenticate(parts: &Parts) -> Result<AuthUser, AppError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

    if !auth_str.starts_with("Bearer ") {
        return Err(AppError::Unauthorized("Invalid Authorization scheme".into()));
    }
    let token = auth_str.trim_start_matches("Bearer ").trim();

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role.clone(),
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts)
    }
}

// A missing header yields None; a present but invalid token is still an error.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if parts.headers.get(header::AUTHORIZATION).is_none() {
            return Ok(None);
        }
        authenticate(parts).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: &str) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: role.into(),
        }
    }

    #[test]
    fn admin_passes_both_guards() {
        let admin = user_with_role(ROLE_ADMIN);
        assert!(ensure_admin(&admin).is_ok());
        assert!(ensure_seller(&admin).is_ok());
    }

    #[test]
    fn seller_passes_seller_guard_only() {
        let seller = user_with_role(ROLE_SELLER);
        assert!(ensure_admin(&seller).is_err());
        assert!(ensure_seller(&seller).is_ok());
    }

    #[test]
    fn plain_user_is_rejected_by_both_guards() {
        let user = user_with_role(ROLE_USER);
        assert!(matches!(ensure_admin(&user), Err(AppError::Forbidden)));
        assert!(matches!(ensure_seller(&user), Err(AppError::Forbidden)));
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let request = axum::http::Request::builder()
            .uri("/api/cart")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert!(matches!(
            authenticate(&parts),
            Err(AppError::Unauthorized(_))
        ));
    }
}
