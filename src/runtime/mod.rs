//! Application assembly, configuration and the HTTP server.

mod app;
mod config;
mod server;

pub use app::FunctionApp;
pub use config::{parse_truthy, FrameworkConfig, ServerBackend};
pub use server::{respond, FunctionServer};
