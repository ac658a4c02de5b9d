//! HTTP request and response types exchanged with user functions.

mod request;
mod response;

pub use request::{FunctionRequest, Method};
pub use response::{FunctionResponse, StatusCode, CRASH, FUNCTION_STATUS_HEADER};
