//! The typed error surface shared by every gallery-core service
//!
//! This mirrors the shape of an HTTP-coupled `ApiError` (a status-code-like
//! `code` plus an optional message) without depending on a web framework:
//! `gallery-api` maps `kind` to an actual `axum::http::StatusCode` at the
//! edge, but `gallery-core` itself stays framework agnostic.

use std::fmt;

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::{
    copy_object::CopyObjectError, delete_object::DeleteObjectError, get_object::GetObjectError,
    head_object::HeadObjectError, put_object::PutObjectError,
};

/// The error kinds recognized by the core, per the error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty/malformed input, schema failure, unsupported MIME type
    InvalidInput,
    /// Not produced by the core itself; surfaced by the handler collaborator
    Authorization,
    /// A lookup missed
    NotFound,
    /// Name/slug collisions, invalid status transitions, CAS abort after retries
    Conflict,
    /// Network/object-store timeouts and other transient failures
    Transient,
    /// A configured limit (entry count, byte count, duration, chunk size) was exceeded
    ResourceLimit,
    /// The process cannot safely continue (e.g. the tenant bucket is missing)
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
            ErrorKind::ResourceLimit => "resource_limit",
            ErrorKind::Fatal => "fatal",
        };
        write!(f, "{name}")
    }
}

/// An error produced by any gallery-core adapter or service
#[derive(Debug, Clone)]
pub struct ApiError {
    /// The kind of error this is
    pub kind: ErrorKind,
    /// A human readable message describing what went wrong
    pub msg: Option<String>,
}

impl ApiError {
    /// Build a new error
    ///
    /// # Arguments
    ///
    /// * `kind` - The kind of error this is
    /// * `msg` - An optional message describing what went wrong
    #[must_use]
    pub fn new(kind: ErrorKind, msg: Option<String>) -> Self {
        ApiError { kind, msg }
    }

    /// Returns true if this is the kind of error a caller should retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ApiError {}

/// 400 equivalent - invalid input, never retried
#[macro_export]
macro_rules! bad {
    ($($msg:tt)+) => {
        Err($crate::utils::ApiError::new(
            $crate::utils::ErrorKind::InvalidInput,
            Some($($msg)+),
        ))
    };
}

/// 404 equivalent
#[macro_export]
macro_rules! not_found {
    ($($msg:tt)+) => {
        Err($crate::utils::ApiError::new(
            $crate::utils::ErrorKind::NotFound,
            Some($($msg)+),
        ))
    };
}

/// 409 equivalent - slug/name collisions, bad status transitions, CAS aborts
#[macro_export]
macro_rules! conflict {
    ($($msg:tt)+) => {
        Err($crate::utils::ApiError::new(
            $crate::utils::ErrorKind::Conflict,
            Some($($msg)+),
        ))
    };
}

/// 503 equivalent - network/object-store timeouts, retried by callers that have a policy
#[macro_export]
macro_rules! transient {
    ($($msg:tt)+) => {
        Err($crate::utils::ApiError::new(
            $crate::utils::ErrorKind::Transient,
            Some($($msg)+),
        ))
    };
}

/// A configured resource limit was exceeded; final, recorded on the job
#[macro_export]
macro_rules! resource_limit {
    ($($msg:tt)+) => {
        Err($crate::utils::ApiError::new(
            $crate::utils::ErrorKind::ResourceLimit,
            Some($($msg)+),
        ))
    };
}

/// The process cannot safely continue
#[macro_export]
macro_rules! fatal {
    ($($msg:tt)+) => {
        Err($crate::utils::ApiError::new(
            $crate::utils::ErrorKind::Fatal,
            Some($($msg)+),
        ))
    };
}

impl From<redis::RedisError> for ApiError {
    fn from(error: redis::RedisError) -> Self {
        if error.is_timeout() || error.is_connection_dropped() || error.is_connection_refusal() {
            ApiError::new(
                ErrorKind::Transient,
                Some(format!("Redis error: {error:#?}")),
            )
        } else {
            ApiError::new(
                ErrorKind::InvalidInput,
                Some(format!("Redis error: {error:#?}")),
            )
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::new(
            ErrorKind::InvalidInput,
            Some(format!("Failed to (de)serialize JSON: {error:#?}")),
        )
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        ApiError::new(ErrorKind::Transient, Some(format!("IO error: {error:#?}")))
    }
}

impl From<zip::result::ZipError> for ApiError {
    fn from(error: zip::result::ZipError) -> Self {
        ApiError::new(
            ErrorKind::InvalidInput,
            Some(format!("Failed to read zip archive: {error:#?}")),
        )
    }
}

impl From<image::ImageError> for ApiError {
    fn from(error: image::ImageError) -> Self {
        ApiError::new(
            ErrorKind::InvalidInput,
            Some(format!("Failed to decode image: {error:#?}")),
        )
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(error: tokio::task::JoinError) -> Self {
        ApiError::new(
            ErrorKind::Transient,
            Some(format!("Background task failed to join: {error:#?}")),
        )
    }
}

impl From<SdkError<HeadObjectError>> for ApiError {
    fn from(error: SdkError<HeadObjectError>) -> Self {
        match error.into_service_error() {
            HeadObjectError::NotFound(_) => {
                ApiError::new(ErrorKind::NotFound, Some("object not found".to_owned()))
            }
            err => ApiError::new(
                ErrorKind::Transient,
                Some(format!("Failed to head object: {err:#?}")),
            ),
        }
    }
}

impl From<SdkError<GetObjectError>> for ApiError {
    fn from(error: SdkError<GetObjectError>) -> Self {
        match error.as_service_error() {
            Some(GetObjectError::NoSuchKey(_)) => {
                ApiError::new(ErrorKind::NotFound, Some("object not found".to_owned()))
            }
            _ => ApiError::new(
                ErrorKind::Transient,
                Some(format!("Failed to get object: {error:#?}")),
            ),
        }
    }
}

impl From<SdkError<PutObjectError>> for ApiError {
    fn from(error: SdkError<PutObjectError>) -> Self {
        ApiError::new(
            ErrorKind::Transient,
            Some(format!("Failed to put object: {error:#?}")),
        )
    }
}

impl From<SdkError<DeleteObjectError>> for ApiError {
    fn from(error: SdkError<DeleteObjectError>) -> Self {
        ApiError::new(
            ErrorKind::Transient,
            Some(format!("Failed to delete object: {error:#?}")),
        )
    }
}

impl From<SdkError<CopyObjectError>> for ApiError {
    fn from(error: SdkError<CopyObjectError>) -> Self {
        match error.as_service_error() {
            Some(CopyObjectError::ObjectNotInActiveTierError(_)) => ApiError::new(
                ErrorKind::NotFound,
                Some("source object not found".to_owned()),
            ),
            _ => ApiError::new(
                ErrorKind::Transient,
                Some(format!("Failed to copy object: {error:#?}")),
            ),
        }
    }
}

impl From<aws_smithy_types::byte_stream::error::Error> for ApiError {
    fn from(error: aws_smithy_types::byte_stream::error::Error) -> Self {
        ApiError::new(
            ErrorKind::Transient,
            Some(format!("Failed to stream object body: {error:#?}")),
        )
    }
}
