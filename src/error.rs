use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: ErrorBody,
}

/// The `{"error": ...}` payload shared by the HTTP API and the line protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<String> for ErrorBody {
    fn from(message: String) -> Self {
        ErrorBody { error: message }
    }
}

impl From<&str> for ErrorBody {
    fn from(message: &str) -> Self {
        ErrorBody {
            error: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err: anyhow::Error = err.into();
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: ErrorBody::from(format!("{err:#}")),
        }
    }
}

pub type ApiResult<T, E = ApiError> = Result<T, E>;

#[macro_export]
macro_rules! bail_api {
    ($error_message:expr) => {
        return Err($crate::error::ApiError {
            status: ::axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            message: $crate::error::ErrorBody::from($error_message),
        })
    };
    ($status:expr, $error_message:expr) => {
        return Err($crate::error::ApiError {
            status: $status,
            message: $crate::error::ErrorBody::from($error_message),
        })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)+) => {
        return Err($crate::error::ApiError {
            status: $status,
            message: $crate::error::ErrorBody::from(format!($fmt $(, $arg)+)),
        })
    };
}

/// Logs the message, flushes telemetry and terminates the process with the given exit code.
#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {{
        ::tracing::error!($fmt $(, $arg)*);
        $crate::telemetry::shutdown_telemetry();
        ::std::process::exit($code)
    }};
}
