use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse, MessageResponse, RegisterRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{validate_email, validate_password};
use crate::types::User;

const NAMESPACE_ID_BYTES: usize = 16;
const NAMESPACE_ID_ATTEMPTS: usize = 3;
const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Generates an unguessable namespace id: 16 random bytes as lowercase hex.
fn generate_namespace_id() -> String {
    let mut bytes = [0u8; NAMESPACE_ID_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    if state
        .store
        .get_user_by_email(&email)
        .api_err("Failed to check existing user")?
        .is_some()
    {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = state.passwords.hash(&req.password).map_err(|e| {
        tracing::error!("Failed to hash password: {e}");
        ApiError::internal("Failed to create user")
    })?;

    let now = Utc::now();
    let mut user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash,
        namespace_id: generate_namespace_id(),
        created_at: now,
        updated_at: now,
    };

    let mut attempts = 0;
    loop {
        attempts += 1;
        match state.store.create_user(&user) {
            Ok(()) => break,
            Err(Error::AlreadyExists) => {
                return Err(ApiError::conflict("Email is already registered"));
            }
            Err(Error::NamespaceCollision) if attempts < NAMESPACE_ID_ATTEMPTS => {
                tracing::warn!("Namespace id collision, regenerating");
                user.namespace_id = generate_namespace_id();
            }
            Err(e) => {
                tracing::error!("Failed to create user: {e}");
                return Err(ApiError::internal("Failed to create user"));
            }
        }
    }

    tracing::info!(user_id = %user.id, "Registered user");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user_by_email(req.email.trim())
        .api_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    let valid = state
        .passwords
        .verify(&req.password, &user.password_hash)
        .api_err("Failed to verify password")?;
    if !valid {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let (token, expires_at) = state
        .credentials
        .issue(&user.id, Utc::now())
        .api_err("Failed to issue token")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(LoginResponse {
        user,
        token,
        expires_at,
    })))
}

/// Credentials are stateless, so logging out is up to the client discarding its token.
pub async fn logout() -> impl IntoResponse {
    Json(ApiResponse::success(MessageResponse::new("Logout successful")))
}

pub async fn get_me(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(auth.user))
}

/// Removes the account and every track it owns.
pub async fn delete_me(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = &auth.user;

    // The user row goes first so no new upload can be recorded for it.
    state
        .store
        .delete_user(&user.id)
        .api_err("Failed to delete account")?;

    if let Err(e) = state.storage.remove_namespace(&user.namespace_id).await {
        tracing::error!(user_id = %user.id, "Failed to remove track storage: {e}");
    }

    tracing::info!(user_id = %user.id, "Deleted user");

    Ok::<_, ApiError>(Json(ApiResponse::success(MessageResponse::new(
        "Account deleted successfully",
    ))))
}
