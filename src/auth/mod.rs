use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    domain::UserProfile,
    error::{AppError, BookingError},
    state::AppState,
};

/// Set by the authenticating proxy in front of this service.
pub const ACTING_USER_HEADER: &str = "x-acting-user";

/// The user a request acts as, resolved to a full profile.
#[derive(Debug, Clone)]
pub struct ActingUser(pub UserProfile);

impl ActingUser {
    pub fn require_admin(&self) -> Result<&UserProfile, AppError> {
        if self.0.role.is_admin() {
            Ok(&self.0)
        } else {
            Err(BookingError::Forbidden("admin only").into())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(ACTING_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(AppError::unauthorized)?;

        let profile = state
            .preferences
            .profile(user_id)
            .await
            .map_err(BookingError::from)?
            .filter(|profile| profile.active)
            .ok_or_else(AppError::unauthorized)?;

        Ok(ActingUser(profile))
    }
}
