//! Authentication middleware
//!
//! Bearer JWT verification and role-based access control. Tokens are issued
//! elsewhere; this service only verifies them with the shared secret.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{Action, Resource, Role};

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn can(&self, resource: Resource, action: Action) -> bool {
        self.role.can(resource, action)
    }

    /// Fail with 403 unless the role allows `action` on `resource`
    pub fn require(&self, resource: Resource, action: Action) -> AppResult<()> {
        if self.can(resource, action) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = %self.role,
                resource = resource.as_str(),
                action = action.as_str(),
                "permission denied"
            );
            Err(AppError::InsufficientPermissions {
                resource: resource.as_str(),
                action: action.as_str(),
            })
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Decode and validate JWT token
pub fn decode_jwt(token: &str, secret: &str) -> AppResult<AuthUser> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;
    let role = Role::parse(&claims.role).ok_or(AppError::InvalidToken)?;

    Ok(AuthUser { user_id, role })
}

/// Authentication middleware that validates JWT tokens and stores the
/// resulting [`AuthUser`] in the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidToken)?;

    let user = decode_jwt(token, &state.config.jwt.secret)?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, role: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_valid_token() {
        let id = Uuid::new_v4();
        let user = decode_jwt(&token(&id.to_string(), "operador", 3600), SECRET).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role, Role::Operador);
    }

    #[test]
    fn test_expired_token() {
        let id = Uuid::new_v4().to_string();
        let err = decode_jwt(&token(&id, "admin", -3600), SECRET).unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret_and_unknown_role() {
        let id = Uuid::new_v4().to_string();
        let err = decode_jwt(&token(&id, "admin", 3600), "other").unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));

        let err = decode_jwt(&token(&id, "gerente", 3600), SECRET).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn test_require() {
        let operador = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Operador,
        };
        assert!(operador.require(Resource::Requisition, Action::Pick).is_ok());
        let err = operador
            .require(Resource::Requisition, Action::Create)
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
