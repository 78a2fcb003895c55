//! Request validation for the Recruit API

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use recruit_shared::CandidateStatus;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::{ApiError, AppError, ApiResult};

/// JSON body that has been deserialized and passed `Validate::validate`.
/// Malformed JSON and failed rules both surface as 400 responses.
#[derive(Debug, Clone)]
pub struct Validated<T>(pub T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Validated<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for Validated<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(Validated(value))
    }
}

pub const MAX_TAG_LENGTH: usize = 50;

/// Parse a candidate status, reporting the allowed values on failure
pub fn status(value: &str, field: &str) -> ApiResult<CandidateStatus> {
    value.parse::<CandidateStatus>().map_err(|_| {
        let allowed: Vec<&str> = CandidateStatus::ALL.iter().map(|s| s.as_str()).collect();
        ApiError::validation_single(
            field,
            format!("{} must be one of: {}", field, allowed.join(", ")),
        )
    })
}

/// Tags are trimmed; blank or oversized tags are rejected. Case is kept.
pub fn tag(value: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation_single("tag", "tag cannot be empty"));
    }
    if trimmed.chars().count() > MAX_TAG_LENGTH {
        return Err(ApiError::validation_single(
            "tag",
            format!("tag must be {} characters or less", MAX_TAG_LENGTH),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional string and collapse blank values to `None`
pub fn optional_trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
