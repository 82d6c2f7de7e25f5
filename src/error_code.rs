//! Canonical domain error codes and their retry semantics.
//!
//! Remote APIs report failures with a short machine-readable code next to the
//! HTTP status. This module maps the common spellings onto a closed set so the
//! retry layer can seed its `retryable_error_codes` from one place.
//!
//! | Category    | Codes                                                         |
//! |-------------|---------------------------------------------------------------|
//! | client      | invalid_request, validation_error, unauthorized, restricted_resource, object_not_found |
//! | rate        | rate_limited                                                  |
//! | server      | internal_server_error, service_unavailable, gateway_timeout   |
//! | operational | conflict_error                                                |
//! | unknown     | anything else                                                 |
//!
//! ```rust
//! use resilient_fetch::error_code::DomainErrorCode;
//!
//! let code = DomainErrorCode::from_code("rate_limit_exceeded");
//! assert_eq!(code, DomainErrorCode::RateLimited);
//! assert!(code.retryable());
//! assert_eq!(code.category(), "rate");
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainErrorCode {
    /// Malformed request body or parameters
    InvalidRequest,
    /// Request was well-formed but failed schema validation
    ValidationError,
    /// Missing or invalid credentials
    Unauthorized,
    /// Credentials lack access to the resource
    RestrictedResource,
    /// Resource does not exist or is not shared with the caller
    ObjectNotFound,
    /// Too many requests
    RateLimited,
    /// Unexpected failure on the server
    InternalServerError,
    /// Server temporarily unavailable
    ServiceUnavailable,
    /// Upstream gateway timed out
    GatewayTimeout,
    /// Concurrent modification conflict
    Conflict,
    /// Could not be classified
    Unknown,
}

impl DomainErrorCode {
    /// Every code that is retryable by default.
    pub const RETRYABLE: [DomainErrorCode; 5] = [
        Self::RateLimited,
        Self::InternalServerError,
        Self::ServiceUnavailable,
        Self::GatewayTimeout,
        Self::Conflict,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::ValidationError => "validation_error",
            Self::Unauthorized => "unauthorized",
            Self::RestrictedResource => "restricted_resource",
            Self::ObjectNotFound => "object_not_found",
            Self::RateLimited => "rate_limited",
            Self::InternalServerError => "internal_server_error",
            Self::ServiceUnavailable => "service_unavailable",
            Self::GatewayTimeout => "gateway_timeout",
            Self::Conflict => "conflict_error",
            Self::Unknown => "unknown",
        }
    }

    #[inline]
    pub fn retryable(&self) -> bool {
        Self::RETRYABLE.contains(self)
    }

    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::ValidationError
            | Self::Unauthorized
            | Self::RestrictedResource
            | Self::ObjectNotFound => "client",
            Self::RateLimited => "rate",
            Self::InternalServerError | Self::ServiceUnavailable | Self::GatewayTimeout => {
                "server"
            }
            Self::Conflict => "operational",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a code string (canonical name or a common alias) to a `DomainErrorCode`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_request" | "invalid_request_url" | "invalid_json" => Self::InvalidRequest,
            "validation_error" => Self::ValidationError,
            "unauthorized" | "invalid_api_key" => Self::Unauthorized,
            "restricted_resource" | "permission_denied" => Self::RestrictedResource,
            "object_not_found" | "not_found" => Self::ObjectNotFound,
            "rate_limited" | "rate_limit_exceeded" => Self::RateLimited,
            "internal_server_error" | "server_error" => Self::InternalServerError,
            "service_unavailable" | "overloaded" => Self::ServiceUnavailable,
            "gateway_timeout" | "database_connection_unavailable" => Self::GatewayTimeout,
            "conflict_error" | "conflict" => Self::Conflict,
            _ => Self::Unknown,
        }
    }

    /// Maps an HTTP status code to the most likely `DomainErrorCode`.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Unauthorized,
            403 => Self::RestrictedResource,
            404 => Self::ObjectNotFound,
            409 => Self::Conflict,
            422 => Self::ValidationError,
            429 => Self::RateLimited,
            500 => Self::InternalServerError,
            502 | 503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DomainErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_map_to_canonical() {
        assert_eq!(DomainErrorCode::from_code("conflict"), DomainErrorCode::Conflict);
        assert_eq!(DomainErrorCode::from_code("conflict").as_str(), "conflict_error");
        assert_eq!(DomainErrorCode::from_code("nope"), DomainErrorCode::Unknown);
    }

    #[test]
    fn test_client_codes_not_retryable() {
        for code in [
            DomainErrorCode::InvalidRequest,
            DomainErrorCode::ValidationError,
            DomainErrorCode::Unauthorized,
            DomainErrorCode::RestrictedResource,
            DomainErrorCode::ObjectNotFound,
        ] {
            assert!(!code.retryable(), "{} should not be retryable", code);
            assert_eq!(code.category(), "client");
        }
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(DomainErrorCode::from_http_status(429), DomainErrorCode::RateLimited);
        assert_eq!(DomainErrorCode::from_http_status(503), DomainErrorCode::ServiceUnavailable);
        assert_eq!(DomainErrorCode::from_http_status(418), DomainErrorCode::Unknown);
    }
}
