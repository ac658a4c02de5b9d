//! Handler traits, callable wrappers and HTTP result shapes.

use crate::http::{FunctionResponse, StatusCode};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A synchronous user function.
///
/// Implemented for every `Fn(I) -> Result<O, FunctionError>`. Blocking
/// handlers may be offloaded to a worker thread by the dispatcher.
pub trait BlockingHandler<I, O>: Send + Sync {
    fn call(&self, input: I) -> Result<O, FunctionError>;
}

impl<I, O, F> BlockingHandler<I, O> for F
where
    F: Fn(I) -> Result<O, FunctionError> + Send + Sync,
{
    fn call(&self, input: I) -> Result<O, FunctionError> {
        (self)(input)
    }
}

/// A natively asynchronous user function.
///
/// Implemented for every `Fn(I) -> impl Future<Output = Result<O, FunctionError>>`.
/// Async handlers are always awaited on the request task.
#[async_trait]
pub trait AsyncHandler<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn call(&self, input: I) -> Result<O, FunctionError>;
}

#[async_trait]
impl<I, O, F, Fut> AsyncHandler<I, O> for F
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, FunctionError>> + Send + 'static,
{
    async fn call(&self, input: I) -> Result<O, FunctionError> {
        (self)(input).await
    }
}

/// A user function in one of its two calling conventions.
pub enum Callable<I: Send + 'static, O: Send + 'static> {
    Blocking(Arc<dyn BlockingHandler<I, O>>),
    Async(Arc<dyn AsyncHandler<I, O>>),
}

impl<I: Send + 'static, O: Send + 'static> Callable<I, O> {
    pub fn is_async(&self) -> bool {
        matches!(self, Callable::Async(_))
    }
}

impl<I: Send + 'static, O: Send + 'static> Clone for Callable<I, O> {
    fn clone(&self) -> Self {
        match self {
            Callable::Blocking(f) => Callable::Blocking(f.clone()),
            Callable::Async(f) => Callable::Async(f.clone()),
        }
    }
}

/// What an HTTP function may return.
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    /// Empty 200 response.
    Empty,
    /// A response passed through unchanged.
    Response(FunctionResponse),
    /// A mapping or sequence, serialised as JSON with status 200.
    Json(Value),
    /// Plain text with status 200.
    Text(String),
    /// Body with an explicit status.
    WithStatus(String, StatusCode),
}

impl HandlerOutput {
    /// Serialise any value as a JSON result.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, FunctionError> {
        Ok(HandlerOutput::Json(serde_json::to_value(value)?))
    }

    pub fn text(body: impl Into<String>) -> Self {
        HandlerOutput::Text(body.into())
    }

    pub fn with_status(body: impl Into<String>, status: impl Into<StatusCode>) -> Self {
        HandlerOutput::WithStatus(body.into(), status.into())
    }

    /// Convert into the wire response.
    pub fn into_response(self) -> FunctionResponse {
        match self {
            HandlerOutput::Empty => FunctionResponse::ok(),
            HandlerOutput::Response(response) => response,
            HandlerOutput::Json(value) => FunctionResponse::json(&value)
                .unwrap_or_else(|e| FunctionResponse::crash(e.to_string())),
            HandlerOutput::Text(body) => FunctionResponse::text(body),
            HandlerOutput::WithStatus(body, status) => FunctionResponse::text(body).with_status(status),
        }
    }
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        HandlerOutput::Empty
    }
}

impl From<FunctionResponse> for HandlerOutput {
    fn from(response: FunctionResponse) -> Self {
        HandlerOutput::Response(response)
    }
}

impl From<String> for HandlerOutput {
    fn from(body: String) -> Self {
        HandlerOutput::Text(body)
    }
}

impl From<&str> for HandlerOutput {
    fn from(body: &str) -> Self {
        HandlerOutput::Text(body.to_string())
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Json(value)
    }
}

impl<S: Into<String>> From<(S, u16)> for HandlerOutput {
    fn from((body, status): (S, u16)) -> Self {
        HandlerOutput::WithStatus(body.into(), StatusCode(status))
    }
}

/// Error returned by user functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionError {
    /// Error message.
    pub message: String,
}

impl FunctionError {
    /// Create a new FunctionError.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "function panicked".to_string()
        };
        Self::new(message)
    }
}

impl std::fmt::Display for FunctionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FunctionError {}

impl From<std::io::Error> for FunctionError {
    fn from(err: std::io::Error) -> Self {
        FunctionError::new(err.to_string())
    }
}

impl From<serde_json::Error> for FunctionError {
    fn from(err: serde_json::Error) -> Self {
        FunctionError::new(err.to_string())
    }
}
