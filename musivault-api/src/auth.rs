//! Bearer-token authentication
//!
//! Handlers take a [`CurrentUser`] argument; requests without a known
//! `Authorization: Bearer <token>` header are rejected with 401.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::db::users::{self, User};
use crate::error::ApiError;
use crate::AppState;

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Token from an `Authorization` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = bearer_token(header)
            .ok_or_else(|| ApiError::Unauthorized("Expected a Bearer token".to_string()))?;

        let user = users::find_by_token(&state.db, token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown API token".to_string()))?;

        Ok(CurrentUser(user))
    }
}
