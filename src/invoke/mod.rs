//! Request normalisation and function invocation.

pub mod dispatcher;
pub mod normalizer;

pub use dispatcher::{error_response, DispatchMode, Dispatcher};
pub use normalizer::{normalize, NormalizedEvent};
