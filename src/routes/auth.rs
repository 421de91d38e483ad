use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::extract::JsonBody;
use crate::db::auth::{Account, AuthRepository};
use crate::db::{violates, UNIQUE_VIOLATION};

const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User already exists")]
    UserExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Staff access required")]
    Forbidden,

    #[error("Unable to hash password")]
    Hashing,

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::UserExists | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Hashing | AuthError::Token(_) | AuthError::Database(_) => {
                tracing::error!("Authentication failure: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({ "error": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: Uuid,   // user_id
    exp: i64,    // expiration timestamp
    iat: i64,    // issued at timestamp
    staff: bool, // may change transaction status
}

/// The caller behind a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub is_staff: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: Email,
    password: String,
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Email,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    access_token: String,
    refresh_token: String,
    user_uid: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    refresh_token: String,
}

/// Password policy for new accounts.
pub fn check_password(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one digit",
        ));
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one special character",
        ));
    }
    Ok(())
}

// Authentication service
pub struct AuthService {
    repo: AuthRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(repo: AuthRepository, jwt_secret: String) -> Self {
        Self { repo, jwt_secret }
    }

    /// Creates the account and opens a session. A registration racing
    /// another one for the same email loses on the unique index and reports
    /// `UserExists` as well.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        if self
            .repo
            .find_user_by_email(req.email.as_str())
            .await?
            .is_some()
        {
            return Err(AuthError::UserExists);
        }

        check_password(&req.password)?;

        let salt = SaltString::generate(&mut rand::thread_rng());
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|_err| AuthError::Hashing)?
            .to_string();

        let account = self
            .repo
            .create_user(req.email.as_str(), &password_hash, req.full_name.as_deref())
            .await
            .map_err(registration_error)?;
        tracing::info!("user created with email: {}", account.email);

        self.open_session(&account).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        tracing::info!("Attempting to log in user with email: {}", req.email);

        let account = self
            .repo
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash =
            PasswordHash::new(&account.password_hash).map_err(|_err| AuthError::Hashing)?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("Invalid credentials for user: {}", account.email);
            return Err(AuthError::InvalidCredentials);
        }

        self.open_session(&account).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let account = self
            .repo
            .take_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.open_session(&account).await
    }

    pub fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.leeway = 10;
        validation.validate_exp = true;

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::warn!("Error decoding token: {:?}", err);
            AuthError::InvalidToken
        })?;

        Ok(Identity {
            user_id: token_data.claims.sub,
            is_staff: token_data.claims.staff,
        })
    }

    /// Signs a short-lived HS256 access token.
    pub fn issue_access_token(&self, user_id: Uuid, is_staff: bool) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + ACCESS_TOKEN_TTL).timestamp(),
            iat: now.timestamp(),
            staff: is_staff,
        };

        Ok(jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?)
    }

    async fn open_session(&self, account: &Account) -> Result<AuthResponse, AuthError> {
        let access_token = self.issue_access_token(account.id, account.is_staff)?;
        let refresh_token = Uuid::new_v4().to_string();

        self.repo
            .store_refresh_token(account.id, &refresh_token, Utc::now() + REFRESH_TOKEN_TTL)
            .await?;
        tracing::info!("Opened session for user: {}", account.email);

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: account.id,
        })
    }
}

fn registration_error(err: sqlx::Error) -> AuthError {
    if violates(&err, UNIQUE_VIOLATION) {
        AuthError::UserExists
    } else {
        AuthError::Database(err)
    }
}

pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let response = service.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let response = service.login(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn refresh_token_handler(
    State(service): State<Arc<AuthService>>,
    JsonBody(req): JsonBody<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let response = service.refresh_token(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub fn auth_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_token_handler))
        .with_state(service)
}
