//! Caller identity from the trusted upstream headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::AppState;
use crate::domain::{Caller, UserId, UserRole};
use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Rejects with 401 when no user id is supplied. Every identified caller is
/// recorded so later settlements can tell known users from missing ones.
#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing caller identity".into()))?;
        let role = match header(parts, USER_ROLE_HEADER) {
            Some(r) => r.parse::<UserRole>().map_err(AppError::BadRequest)?,
            None => UserRole::User,
        };

        let caller = Caller {
            user_id: UserId::new(user_id),
            email: header(parts, USER_EMAIL_HEADER).map(str::to_string),
            role,
        };
        state.repo.upsert_user(&caller).await?;
        Ok(caller)
    }
}
