//! Functions Framework - example server
//!
//! Serves one of a handful of sample functions, chosen with `--target` or
//! `FUNCTION_TARGET`.

use clap::Parser;
use functions_framework::execution::init_tracing;
use functions_framework::prelude::*;
use functions_framework::runtime::parse_truthy;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "functions-framework", version, about = "Serve a function over HTTP")]
struct Cli {
    /// Name of the function to serve.
    #[arg(long, env = "FUNCTION_TARGET")]
    target: String,

    /// File expected to define the function.
    #[arg(long, env = "FUNCTION_SOURCE")]
    source: Option<PathBuf>,

    /// Signature kind, overriding FUNCTION_SIGNATURE_TYPE and the registry.
    #[arg(long)]
    signature_type: Option<SignatureKind>,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Defer startup errors to request time and log verbosely.
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Server backend: threaded (wsgi) or async (asgi).
    #[arg(long, alias = "gateway-interface", env = "GATEWAY_INTERFACE", default_value = "threaded")]
    backend: ServerBackend,

    /// Concurrent blocking functions on the async backend.
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,

    /// Runtime worker threads on the threaded backend.
    #[arg(long, env = "THREADS")]
    threads: Option<usize>,

    /// Request timeout in seconds, 0 for none.
    #[arg(long, env = "CLOUD_RUN_TIMEOUT_SECONDS", default_value_t = 0)]
    timeout: u64,
}

impl Cli {
    fn config(&self, log_execution_id: bool) -> FrameworkConfig {
        let mut config = FrameworkConfig::new(&self.target)
            .host(&self.host)
            .port(self.port)
            .debug(self.debug)
            .backend(self.backend)
            .request_timeout(self.timeout)
            .log_execution_id(log_execution_id);
        if let Some(source) = &self.source {
            config = config.source(source);
        }
        if let Some(kind) = self.signature_type {
            config = config.signature_type(kind);
        }
        if let Some(workers) = self.workers {
            config = config.workers(workers);
        }
        if let Some(threads) = self.threads {
            config = config.threads(threads);
        }
        config
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u32,
}

/// Sample functions, one per signature kind.
fn sample_functions() -> Result<FunctionRegistry, FrameworkError> {
    let mut registry = FunctionRegistry::new();
    registry
        .http("hello", |request: FunctionRequest| {
            let name = request
                .get_header("X-Name")
                .cloned()
                .unwrap_or_else(|| "World".to_string());
            Ok(format!("Hello, {}!", name))
        })?
        .http("echo", |request: FunctionRequest| {
            Ok(request.text().unwrap_or_default())
        })?
        .http_async("hello_async", |request: FunctionRequest| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let execution_id = current_context()
                .map(|c| c.execution_id().to_string())
                .unwrap_or_default();
            HandlerOutput::json(&serde_json::json!({
                "message": "Hello async world!",
                "path": request.url,
                "execution_id": execution_id,
            }))
        })?
        .event("log_event", |event: BackgroundEvent| {
            let mut out = functions_framework::stdout();
            writeln!(
                out,
                "event {} carried {}",
                event.context.event_id.unwrap_or_default(),
                event.data
            )?;
            Ok(())
        })?
        .cloud_event_async("hello_cloud_event", |event: CloudEvent| async move {
            tracing::info!(
                "CloudEvent {} of type {} from {}",
                event.id,
                event.event_type,
                event.source
            );
            Ok(())
        })?
        .typed("increment_age", |person: Person| {
            Ok(TypedReturn::record(Person {
                name: person.name,
                age: person.age + 1,
            }))
        })?;
    Ok(registry)
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let log_execution_id = std::env::var("LOG_EXECUTION_ID")
        .map(|value| parse_truthy(&value))
        .unwrap_or(false);
    init_tracing(cli.debug, log_execution_id);

    let env_signature = match std::env::var("FUNCTION_SIGNATURE_TYPE") {
        Ok(value) if !value.is_empty() => Some(value.parse::<SignatureKind>()?),
        _ => None,
    };

    let config = cli.config(log_execution_id);
    config.validate()?;

    let registry = sample_functions()?;
    tracing::info!(
        "Available functions: {}",
        registry
            .list()
            .iter()
            .map(|(name, kind)| format!("{} ({})", name, kind))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let app = FunctionApp::build(&config, &registry, env_signature)?;
    FunctionServer::new(config, app).run()?;
    Ok(())
}
