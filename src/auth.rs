use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{ApiError, ApiResult},
    identity::{IdentityError, IdentityState},
    models::Role,
};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of the Supabase access token. Only checked when a JWT secret is configured.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the Supabase auth user id. Must match `X-User-ID`.
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// AuthUser
///
/// Resolved identity of an authenticated request: the `X-User-ID` header plus the role
/// stored for that user in the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Fails with 403 unless the caller holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> ApiResult<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "You do not have permission to perform this action.",
            ))
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Reads and parses `X-User-ID` (401 when missing, blank or not a UUID).
/// 2. With a configured JWT secret, requires a Bearer token whose `sub` equals the header.
/// 3. Resolves the role through the identity service: unknown user 401, invalid role
///    403, upstream failure 503.
///
/// The result is cached in the request extensions so the auth layer and the handler
/// share a single identity lookup.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }

        let identity = IdentityState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Missing X-User-ID header."))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| ApiError::unauthorized("X-User-ID must be a valid UUID."))?;

        if let Some(secret) = config.jwt_secret.as_deref() {
            verify_bearer(parts, secret, user_id)?;
        }

        let role = identity.get_user_role(user_id).await.map_err(|e| {
            match &e {
                IdentityError::NotFound(_) => {
                    tracing::debug!(user_id = %user_id, "Unknown user")
                }
                other => tracing::warn!(user_id = %user_id, error = %other, "Role lookup failed"),
            }
            ApiError::from(e)
        })?;

        let user = AuthUser { id: user_id, role };
        parts.extensions.insert(user);
        Ok(user)
    }
}

fn verify_bearer(parts: &Parts, secret: &str, user_id: Uuid) -> ApiResult<()> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token."))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    // Supabase tokens carry `aud = authenticated`; the subject check below is what matters.
    validation.validate_aud = false;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::unauthorized("Token expired."),
            _ => ApiError::unauthorized("Invalid token."),
        })?;

    if data.claims.sub != user_id {
        return Err(ApiError::unauthorized(
            "Token subject does not match X-User-ID.",
        ));
    }
    Ok(())
}

/// auth_middleware
///
/// Route layer for the authenticated router: extracting `AuthUser` is the check.
pub async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// require_reviewer
///
/// Route layer for career-office-only routes (403 for other roles).
pub async fn require_reviewer(
    user: AuthUser,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    user.require(&[Role::Reviewer])?;
    Ok(next.run(request).await)
}
