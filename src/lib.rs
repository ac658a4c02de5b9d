//! # Functions Framework
//!
//! A host runtime that serves a single user function behind an HTTP
//! endpoint. Functions come in four signature kinds:
//!
//! - **http**: receives the raw request and returns a response.
//! - **event**: receives a legacy background event, `(data, context)`.
//! - **cloudevent**: receives a decoded CloudEvent.
//! - **typed**: receives a domain object decoded from the JSON body and
//!   returns one, or a primitive.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     FunctionServer (hyper)                       │
//! │   body read, size limit, timeout                                 │
//! └──────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          FunctionApp                             │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐                │
//! │  │ execution  │──▶│ normalizer │──▶│ dispatcher │──▶ response    │
//! │  │  context   │   │            │   │            │                │
//! │  └────────────┘   └────────────┘   └────────────┘                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use functions_framework::prelude::*;
//!
//! fn main() -> Result<(), FrameworkError> {
//!     let mut registry = FunctionRegistry::new();
//!     registry.http("hello", |_req: FunctionRequest| Ok("Hello, World!"))?;
//!
//!     let config = FrameworkConfig::new("hello").port(8080);
//!     let app = FunctionApp::build(&config, &registry, None)?;
//!     FunctionServer::new(config, app).run()
//! }
//! ```
//!
//! ## Execution ids
//!
//! Every request gets an execution id, taken from the
//! `Function-Execution-Id` header or generated. It is visible to the function
//! through [`execution::current`] and, with `LOG_EXECUTION_ID` enabled, is
//! attached to every log line written through [`stdout`], [`stderr`] or the
//! tracing subscriber installed by [`execution::init_tracing`].

pub mod error;
pub mod event;
pub mod execution;
pub mod function;
pub mod http;
pub mod invoke;
pub mod runtime;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::error::{FrameworkError, RequestError};
    pub use crate::event::{BackgroundEvent, CloudEvent, EventContext, Resource};
    pub use crate::execution::{current as current_context, ExecutionContext};
    pub use crate::function::{FunctionError, FunctionRegistry, HandlerOutput, SignatureKind, TypedReturn};
    pub use crate::http::{FunctionRequest, FunctionResponse, Method, StatusCode};
    pub use crate::runtime::{FrameworkConfig, FunctionApp, FunctionServer, ServerBackend};
}

// Re-export for convenience
pub use error::{FrameworkError, RequestError};
pub use execution::{stderr, stdout};
pub use function::{FunctionError, FunctionRegistry};
pub use http::{FunctionRequest, FunctionResponse};
pub use runtime::{FrameworkConfig, FunctionApp, FunctionServer};
