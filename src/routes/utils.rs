use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::auth::{AuthError, AuthService, Identity};

#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<Identity, AuthError> {
    let jwt_header_token = match headers.get(AUTHORIZATION).map(|token| token.to_str()) {
        Some(Ok(token)) => token,
        _ => {
            return Err(AuthError::InvalidToken);
        }
    };
    let token = jwt_header_token
        .strip_prefix("Bearer ")
        .unwrap_or(jwt_header_token);

    service.verify_token(token.trim())
}

#[inline]
pub fn require_staff(headers: &HeaderMap, service: &AuthService) -> Result<Identity, AuthError> {
    let identity = validate_auth_token(headers, service)?;
    if !identity.is_staff {
        tracing::warn!("Non-staff user {} attempted an admin action", identity.user_id);
        return Err(AuthError::Forbidden);
    }
    Ok(identity)
}
