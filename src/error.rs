//! Error taxonomy for startup and request handling.

use crate::function::FunctionError;
use crate::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Startup-class errors. These abort process start unless the server runs in
/// debug mode, where they are deferred to the first request.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// The declared function source does not exist.
    #[error("File {} that is expected to define function doesn't exist", path.display())]
    MissingSource { path: PathBuf },

    /// The signature kind is not one of `http`, `event`, `cloudevent`, `typed`.
    #[error("Invalid signature type: {0}")]
    InvalidSignature(String),

    /// The resolved signature kind disagrees with the registered function shape.
    #[error("function '{target}' is registered as {registered} but was configured as {resolved}")]
    SignatureMismatch {
        target: String,
        registered: String,
        resolved: String,
    },

    /// No function is registered under the target name.
    #[error("function '{0}' is not registered")]
    FunctionNotFound(String),

    /// A function name was registered twice.
    #[error("function '{0}' is already registered")]
    DuplicateRegistration(String),

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-request errors. Never fatal; each maps onto a response.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Neither CloudEvent parsing nor legacy-event conversion succeeded.
    #[error(
        "Invalid event format: Failed to parse as CloudEvent: {cloud_event}\n\
         Failed to convert from background event: {background}"
    )]
    EventConversion {
        cloud_event: String,
        background: String,
    },

    /// The body is not a usable legacy event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The body does not decode into the registered input type.
    #[error("Failed to convert input to {type_name}: {message}")]
    Decoding { type_name: String, message: String },

    /// A typed function has no registered input type.
    #[error("Typed function has no registered input type")]
    MissingInputType,

    /// A typed function returned a value that fails output validation.
    #[error("Invalid return type: {0}")]
    ReturnType(String),

    /// The user function failed or panicked.
    #[error("{0}")]
    Handler(FunctionError),

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Function execution exceeded {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// A startup error held back by debug mode.
    #[error("{0}")]
    Deferred(String),
}

impl RequestError {
    /// Status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::EventConversion { .. }
            | RequestError::InvalidEvent(_)
            | RequestError::Decoding { .. } => StatusCode::BAD_REQUEST,
            RequestError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RequestError::MissingInputType
            | RequestError::ReturnType(_)
            | RequestError::Handler(_)
            | RequestError::Timeout { .. }
            | RequestError::Deferred(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response must carry the crash signal header.
    pub fn is_crash(&self) -> bool {
        matches!(
            self,
            RequestError::Handler(_) | RequestError::Timeout { .. } | RequestError::Deferred(_)
        )
    }
}

impl From<FunctionError> for RequestError {
    fn from(err: FunctionError) -> Self {
        RequestError::Handler(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_conversion_reports_both_errors() {
        let err = RequestError::EventConversion {
            cloud_event: "missing specversion".to_string(),
            background: "unknown event type".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("missing specversion"));
        assert!(text.contains("unknown event type"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.is_crash());
    }

    #[test]
    fn test_only_handler_failures_crash() {
        assert!(RequestError::Handler(FunctionError::new("boom")).is_crash());
        assert!(!RequestError::ReturnType("no".into()).is_crash());
        assert_eq!(
            RequestError::ReturnType("no".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RequestError::Decoding {
                type_name: "Person".into(),
                message: "missing field `age`".into()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
