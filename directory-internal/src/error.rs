use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

/// Controls whether store error messages are included verbatim in response bodies.
///
/// When false, `StoreUnavailable` responses only name the store that failed; the
/// underlying driver message is still logged.
static DEBUG: OnceCell<bool> = OnceCell::const_new();

pub fn set_debug(debug: bool) -> Result<(), Error> {
    DEBUG.set(debug).map_err(|_| {
        Error::new(ErrorDetails::Config {
            message: "Failed to set debug mode".to_string(),
        })
    })
}

fn debug_enabled() -> bool {
    *DEBUG.get().unwrap_or(&false)
}

/// Which backing store a `StoreUnavailable` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Quota,
    Listing,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Quota => "quota",
            StoreKind::Listing => "listing",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq)]
// As long as the struct member is private, we force people to use the `new` method and log the error.
// We box `ErrorDetails` per the `clippy::result_large_err` lint
pub struct Error(Box<ErrorDetails>);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(Box::new(details))
    }

    pub fn new_without_logging(details: ErrorDetails) -> Self {
        Error(Box::new(details))
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(*self.0, ErrorDetails::StoreUnavailable { .. })
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorDetails {
    Config { message: String },
    InternalError { message: String },
    InvalidRequest { message: String },
    RouteNotFound { path: String },
    StoreUnavailable { store: StoreKind, message: String },
    Unauthenticated,
    Unauthorized { message: String },
}

impl ErrorDetails {
    /// Defines the error level for logging this error
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::InternalError { .. } => tracing::Level::ERROR,
            ErrorDetails::InvalidRequest { .. } => tracing::Level::WARN,
            ErrorDetails::RouteNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::StoreUnavailable { .. } => tracing::Level::ERROR,
            ErrorDetails::Unauthenticated => tracing::Level::WARN,
            ErrorDetails::Unauthorized { .. } => tracing::Level::ERROR,
        }
    }

    /// Defines the HTTP status code for responses involving this error
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ErrorDetails::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorDetails::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        match self.level() {
            tracing::Level::ERROR => tracing::error!("{self}"),
            tracing::Level::WARN => tracing::warn!("{self}"),
            tracing::Level::INFO => tracing::info!("{self}"),
            tracing::Level::DEBUG => tracing::debug!("{self}"),
            tracing::Level::TRACE => tracing::trace!("{self}"),
        }
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetails::Config { message } => write!(f, "{message}"),
            ErrorDetails::InternalError { message } => write!(f, "Internal error: {message}"),
            ErrorDetails::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
            ErrorDetails::RouteNotFound { path } => write!(f, "Route not found: {path}"),
            ErrorDetails::StoreUnavailable { store, message } => {
                write!(f, "The {store} store is unavailable: {message}")
            }
            ErrorDetails::Unauthenticated => write!(f, "No authenticated user for this request"),
            ErrorDetails::Unauthorized { message } => write!(f, "Unauthorized: {message}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Get the JSON response body that would be sent to clients
    pub fn to_response_json(&self) -> (StatusCode, Value) {
        let body = match self.get_details() {
            ErrorDetails::StoreUnavailable { store, message } => {
                let message = if debug_enabled() {
                    format!("The {store} store is unavailable: {message}")
                } else {
                    format!("The {store} store is unavailable")
                };
                json!({
                    "error": message,
                    "status": "service_unavailable",
                    "store": store.as_str(),
                })
            }
            _ => json!({"error": self.to_string()}),
        };
        (self.status_code(), body)
    }
}

impl IntoResponse for Error {
    /// Log the error and convert it into an Axum response
    fn into_response(self) -> Response {
        let (status_code, body) = self.to_response_json();
        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_error() {
        let error = Error::new(ErrorDetails::StoreUnavailable {
            store: StoreKind::Quota,
            message: "connection refused".to_string(),
        });

        assert_eq!(
            error.to_string(),
            "The quota store is unavailable: connection refused"
        );
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.get_details().level(), tracing::Level::ERROR);
        assert!(error.is_store_unavailable());
    }

    #[test]
    fn test_store_unavailable_response_body_names_store() {
        let error = Error::new_without_logging(ErrorDetails::StoreUnavailable {
            store: StoreKind::Listing,
            message: "timeout".to_string(),
        });

        let (status, body) = error.to_response_json();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "service_unavailable");
        assert_eq!(body["store"], "listing");
    }

    #[test]
    fn test_unauthorized_is_logged_as_error() {
        let details = ErrorDetails::Unauthorized {
            message: "missing user id".to_string(),
        };
        assert_eq!(details.level(), tracing::Level::ERROR);
        assert_eq!(details.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(format!("{details}"), "Unauthorized: missing user id");
    }

    #[test]
    fn test_error_into_response() {
        let error = Error::new(ErrorDetails::InvalidRequest {
            message: "page must be at least 1".to_string(),
        });

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
