//! The function application: one target function behind a request handler.

use crate::error::{FrameworkError, RequestError};
use crate::execution::{context, ExecutionContext};
use crate::function::{FunctionRegistry, FunctionTarget, InputType, SignatureKind};
use crate::http::{FunctionRequest, FunctionResponse, Method};
use crate::invoke::{error_response, normalize, Dispatcher};
use crate::runtime::FrameworkConfig;
use tracing::{debug, info, warn};

/// Paths an HTTP function never serves.
const IGNORED_PATHS: &[&str] = &["/robots.txt", "/favicon.ico"];

enum AppState {
    Ready {
        target: FunctionTarget,
        input_type: Option<InputType>,
    },
    /// A startup error held back until the first request (debug mode).
    Deferred(String),
}

/// Serves one function, handling requests without any transport attached.
pub struct FunctionApp {
    name: String,
    kind: SignatureKind,
    state: AppState,
    dispatcher: Dispatcher,
}

impl FunctionApp {
    /// Resolve the configured target and build the application.
    ///
    /// `env_signature` is the signature kind configured in the environment,
    /// which loses to `config.signature_type` and wins over the registry. In
    /// debug mode a startup failure is deferred: the app is still built and
    /// answers every request with the error.
    pub fn build(
        config: &FrameworkConfig,
        registry: &FunctionRegistry,
        env_signature: Option<SignatureKind>,
    ) -> Result<Self, FrameworkError> {
        let dispatcher = Dispatcher::new(config.backend.dispatch_mode(), config.workers);
        let kind = registry
            .signatures()
            .resolve(&config.target, config.signature_type, env_signature);

        match Self::load(config, registry, kind) {
            Ok(state) => {
                info!(
                    "Serving function '{}' ({}, {})",
                    config.target,
                    kind,
                    if registry.signatures().is_async(&config.target) {
                        "async"
                    } else {
                        "blocking"
                    }
                );
                Ok(Self {
                    name: config.target.clone(),
                    kind,
                    state,
                    dispatcher,
                })
            }
            Err(err) if config.debug => {
                warn!("Deferring startup error until first request: {}", err);
                Ok(Self {
                    name: config.target.clone(),
                    kind,
                    state: AppState::Deferred(err.to_string()),
                    dispatcher,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn load(
        config: &FrameworkConfig,
        registry: &FunctionRegistry,
        kind: SignatureKind,
    ) -> Result<AppState, FrameworkError> {
        if let Some(source) = &config.source {
            if !source.exists() {
                return Err(FrameworkError::MissingSource {
                    path: source.clone(),
                });
            }
        }
        let target = registry
            .get(&config.target)
            .cloned()
            .ok_or_else(|| FrameworkError::FunctionNotFound(config.target.clone()))?;
        if target.kind() != kind {
            return Err(FrameworkError::SignatureMismatch {
                target: config.target.clone(),
                registered: target.kind().to_string(),
                resolved: kind.to_string(),
            });
        }
        let input_type = registry.signatures().input_type(&config.target).copied();
        Ok(AppState::Ready { target, input_type })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective signature kind.
    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    /// Handle one fully-read request.
    ///
    /// The execution context is set before anything else runs and cleared
    /// when this future completes or is dropped.
    pub async fn handle(&self, mut request: FunctionRequest) -> FunctionResponse {
        let execution = ExecutionContext::attach(&mut request);
        context::scope(execution, async move {
            debug!("{} {}", request.method, request.url);
            match self.process(request).await {
                Ok(response) => response,
                Err(err) => error_response(self.kind, &err),
            }
        })
        .await
    }

    async fn process(&self, request: FunctionRequest) -> Result<FunctionResponse, RequestError> {
        let (target, input_type) = match &self.state {
            AppState::Ready { target, input_type } => (target, input_type.as_ref()),
            AppState::Deferred(message) => return Err(RequestError::Deferred(message.clone())),
        };
        if let Some(response) = self.route(&request)? {
            return Ok(response);
        }
        let event = normalize(self.kind, request, input_type)?;
        self.dispatcher.invoke(target, event).await
    }

    /// Method and path rules per signature kind. `Some` short-circuits the
    /// function with a fixed response.
    fn route(&self, request: &FunctionRequest) -> Result<Option<FunctionResponse>, RequestError> {
        match self.kind {
            SignatureKind::Http => {
                if IGNORED_PATHS.contains(&request.url.as_str()) {
                    return Err(RequestError::NotFound);
                }
                Ok(None)
            }
            SignatureKind::Event => match request.method {
                Method::Post => Ok(None),
                Method::Get => Ok(Some(FunctionResponse::text(""))),
                _ => Err(RequestError::MethodNotAllowed),
            },
            SignatureKind::CloudEvent | SignatureKind::Typed => match request.method {
                Method::Post => Ok(None),
                _ => Err(RequestError::MethodNotAllowed),
            },
        }
    }
}

impl std::fmt::Debug for FunctionApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionApp")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("deferred", &matches!(self.state, AppState::Deferred(_)))
            .finish()
    }
}
