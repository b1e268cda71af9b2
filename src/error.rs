//! Error taxonomy shared by every user-facing operation.
//!
//! Component errors keep their own `thiserror` enums; this module only fixes how
//! they are classified and reported to callers.

use std::fmt;
use std::time::Duration;

/// Caller-visible error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing input.
    Validation,
    /// Referenced entity is absent.
    NotFound,
    /// Ownership or role mismatch.
    Forbidden,
    /// Invalid state transition or already-claimed resource.
    Conflict,
    /// Rejected by a rate governor.
    RateLimited,
    /// Document store, coordination store or payment gateway failure.
    UpstreamUnavailable,
    /// Missing or invalid credential.
    Unauthorized,
}

impl ErrorKind {
    /// HTTP status code used when rendering this class.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamUnavailable => 502,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Unauthorized => "unauthorized",
        };
        write!(f, "{}", s)
    }
}

/// An error that can be reported to an API caller.
///
/// `reason()` is a stable machine-readable string; `Display` is internal detail
/// meant for logs.
pub trait ApiError: std::error::Error {
    /// Classification of the error.
    fn kind(&self) -> ErrorKind;

    /// Stable reason code, e.g. `"restaurant_unavailable"`.
    fn reason(&self) -> &'static str;

    /// How long the caller should wait before retrying, if applicable.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
