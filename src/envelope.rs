//! Uniform JSON response envelope: `{success: true, data}` or
//! `{success: false, error}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, ImageError, RemoteError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Success { success: SuccessTag, data: T },
    Failure { success: FailureTag, error: String },
}

/// Serializes as `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessTag;

/// Serializes as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTag;

macro_rules! bool_tag {
    ($tag:ident, $value:literal) => {
        impl Serialize for $tag {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $tag {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                if bool::deserialize(d)? == $value {
                    Ok($tag)
                } else {
                    Err(serde::de::Error::custom(concat!("expected ", $value)))
                }
            }
        }
    };
}

bool_tag!(SuccessTag, true);
bool_tag!(FailureTag, false);

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self::Success {
            success: SuccessTag,
            data,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self::Failure {
            success: FailureTag,
            error: error.into(),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Success { data, .. } => Ok(data),
            Self::Failure { error, .. } => Err(error),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Success { .. } => StatusCode::OK,
            Self::Failure { .. } => StatusCode::BAD_REQUEST,
        };
        (status, Json(self)).into_response()
    }
}

/// An error rendered as a failure envelope with a chosen status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Envelope::<()>::err(self.message))).into_response()
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        let status = match &err {
            RemoteError::NotFound { .. } => StatusCode::NOT_FOUND,
            RemoteError::Rejected { .. } => StatusCode::BAD_REQUEST,
            RemoteError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        let status = match &err {
            FlowError::Transition(_) | FlowError::Busy => StatusCode::CONFLICT,
            FlowError::Validation(_) | FlowError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FlowError::Remote(_) => StatusCode::BAD_GATEWAY,
            FlowError::UnknownGuest(_) | FlowError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            FlowError::AccessDenied(_) => StatusCode::UNAUTHORIZED,
        };
        Self::new(status, err.to_string())
    }
}
