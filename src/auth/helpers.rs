use chrono::Utc;

use crate::error::Error;
use crate::server::AppState;
use crate::types::User;

#[derive(Debug, PartialEq, Eq)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    UnknownUser,
    InternalError,
}

/// Extracts the credential from a Bearer authorization header.
/// Returns None if no auth header is present.
/// Returns Err if the scheme is not Bearer or the credential is empty.
pub fn extract_bearer_token(
    auth_header: Option<&str>,
) -> Result<Option<&str>, TokenValidationError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(TokenValidationError::InvalidScheme)?
        .trim();

    if token.is_empty() {
        return Err(TokenValidationError::InvalidToken);
    }

    Ok(Some(token))
}

/// Verifies a raw credential and resolves the user it names.
pub fn validate_token(state: &AppState, raw_token: &str) -> Result<User, TokenValidationError> {
    let claims = state
        .credentials
        .verify(raw_token, Utc::now())
        .map_err(|e| match e {
            Error::TokenExpired => TokenValidationError::TokenExpired,
            Error::Config(msg) => {
                tracing::error!("Credential verification failed: {msg}");
                TokenValidationError::InternalError
            }
            _ => TokenValidationError::InvalidToken,
        })?;

    state
        .store
        .get_user(&claims.sub)
        .map_err(|e| {
            tracing::error!("Failed to load user for credential: {e}");
            TokenValidationError::InternalError
        })?
        .ok_or(TokenValidationError::UnknownUser)
}
