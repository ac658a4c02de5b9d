//! Function registry: the user functions a process can serve.

use crate::error::FrameworkError;
use crate::event::{BackgroundEvent, CloudEvent};
use crate::function::handler::{Callable, FunctionError, HandlerOutput};
use crate::function::signature::{SignatureKind, SignatureRegistry};
use crate::function::typed::{InputType, TypedReturn, TypedValue};
use crate::http::FunctionRequest;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// A registered user function, shaped by its signature kind.
#[derive(Clone)]
pub enum FunctionTarget {
    Http(Callable<FunctionRequest, HandlerOutput>),
    Event(Callable<BackgroundEvent, ()>),
    CloudEvent(Callable<CloudEvent, ()>),
    Typed(Callable<TypedValue, TypedReturn>),
}

impl FunctionTarget {
    pub fn kind(&self) -> SignatureKind {
        match self {
            FunctionTarget::Http(_) => SignatureKind::Http,
            FunctionTarget::Event(_) => SignatureKind::Event,
            FunctionTarget::CloudEvent(_) => SignatureKind::CloudEvent,
            FunctionTarget::Typed(_) => SignatureKind::Typed,
        }
    }

    pub fn is_async(&self) -> bool {
        match self {
            FunctionTarget::Http(f) => f.is_async(),
            FunctionTarget::Event(f) => f.is_async(),
            FunctionTarget::CloudEvent(f) => f.is_async(),
            FunctionTarget::Typed(f) => f.is_async(),
        }
    }
}

impl std::fmt::Debug for FunctionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTarget")
            .field("kind", &self.kind())
            .field("is_async", &self.is_async())
            .finish()
    }
}

/// Registry of user functions, populated once at startup.
///
/// ```rust
/// use functions_framework::prelude::*;
///
/// let mut registry = FunctionRegistry::new();
/// registry
///     .http("hello", |_req: FunctionRequest| Ok("Hello, World!"))
///     .unwrap()
///     .cloud_event_async("on_event", |event: CloudEvent| async move {
///         tracing::info!("received {}", event.id);
///         Ok(())
///     })
///     .unwrap();
/// assert!(registry.signatures().is_async("on_event"));
/// ```
#[derive(Default)]
pub struct FunctionRegistry {
    signatures: SignatureRegistry,
    functions: HashMap<String, FunctionTarget>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blocking HTTP function.
    pub fn http<O, F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, FrameworkError>
    where
        O: Into<HandlerOutput> + 'static,
        F: Fn(FunctionRequest) -> Result<O, FunctionError> + Send + Sync + 'static,
    {
        let wrapped = move |request: FunctionRequest| -> Result<HandlerOutput, FunctionError> {
            f(request).map(Into::into)
        };
        self.insert(name, FunctionTarget::Http(Callable::Blocking(Arc::new(wrapped))), None)
    }

    /// Register an async HTTP function.
    pub fn http_async<O, F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<&mut Self, FrameworkError>
    where
        O: Into<HandlerOutput> + Send + 'static,
        F: Fn(FunctionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, FunctionError>> + Send + 'static,
    {
        let wrapped = move |request: FunctionRequest| {
            let call = f(request);
            async move {
                let output = call.await?;
                Ok::<HandlerOutput, FunctionError>(output.into())
            }
        };
        self.insert(name, FunctionTarget::Http(Callable::Async(Arc::new(wrapped))), None)
    }

    /// Register a blocking legacy-event function.
    pub fn event<F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, FrameworkError>
    where
        F: Fn(BackgroundEvent) -> Result<(), FunctionError> + Send + Sync + 'static,
    {
        self.insert(name, FunctionTarget::Event(Callable::Blocking(Arc::new(f))), None)
    }

    /// Register an async legacy-event function.
    pub fn event_async<F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<&mut Self, FrameworkError>
    where
        F: Fn(BackgroundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
    {
        self.insert(name, FunctionTarget::Event(Callable::Async(Arc::new(f))), None)
    }

    /// Register a blocking CloudEvent function.
    pub fn cloud_event<F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, FrameworkError>
    where
        F: Fn(CloudEvent) -> Result<(), FunctionError> + Send + Sync + 'static,
    {
        self.insert(name, FunctionTarget::CloudEvent(Callable::Blocking(Arc::new(f))), None)
    }

    /// Register an async CloudEvent function.
    pub fn cloud_event_async<F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<&mut Self, FrameworkError>
    where
        F: Fn(CloudEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
    {
        self.insert(name, FunctionTarget::CloudEvent(Callable::Async(Arc::new(f))), None)
    }

    /// Register a blocking typed function taking `I` decoded from JSON.
    pub fn typed<I, O, F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, FrameworkError>
    where
        I: DeserializeOwned + Send + 'static,
        O: Into<TypedReturn> + 'static,
        F: Fn(I) -> Result<O, FunctionError> + Send + Sync + 'static,
    {
        let wrapped = move |payload: TypedValue| -> Result<TypedReturn, FunctionError> {
            let input = payload.downcast::<I>()?;
            Ok(f(input)?.into())
        };
        self.insert(
            name,
            FunctionTarget::Typed(Callable::Blocking(Arc::new(wrapped))),
            Some(InputType::of::<I>()),
        )
    }

    /// Register an async typed function taking `I` decoded from JSON.
    pub fn typed_async<I, O, F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<&mut Self, FrameworkError>
    where
        I: DeserializeOwned + Send + 'static,
        O: Into<TypedReturn> + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, FunctionError>> + Send + 'static,
    {
        let wrapped = move |payload: TypedValue| {
            let call = payload.downcast::<I>().map(&f);
            async move {
                let output = call?.await?;
                Ok::<TypedReturn, FunctionError>(output.into())
            }
        };
        self.insert(
            name,
            FunctionTarget::Typed(Callable::Async(Arc::new(wrapped))),
            Some(InputType::of::<I>()),
        )
    }

    fn insert(
        &mut self,
        name: impl Into<String>,
        target: FunctionTarget,
        input_type: Option<InputType>,
    ) -> Result<&mut Self, FrameworkError> {
        let name = name.into();
        let registration = self
            .signatures
            .add(name.clone(), target.kind(), target.is_async())?;
        registration.input_type = input_type;
        info!("Registered function: {} ({})", name, target.kind());
        self.functions.insert(name, target);
        Ok(self)
    }

    /// Look up a function.
    pub fn get(&self, name: &str) -> Option<&FunctionTarget> {
        self.functions.get(name)
    }

    /// The signature table backing this registry.
    pub fn signatures(&self) -> &SignatureRegistry {
        &self.signatures
    }

    /// List all registered functions with their kinds.
    pub fn list(&self) -> Vec<(String, SignatureKind)> {
        let mut functions: Vec<_> = self
            .functions
            .iter()
            .map(|(name, target)| (name.clone(), target.kind()))
            .collect();
        functions.sort_by(|a, b| a.0.cmp(&b.0));
        functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::handler::BlockingHandler;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Input {
        value: i64,
    }

    #[test]
    fn test_registration_records_signature() {
        let mut registry = FunctionRegistry::new();
        registry
            .http("plain", |_req: FunctionRequest| Ok(()))
            .unwrap()
            .event_async("legacy", |_event: BackgroundEvent| async { Ok(()) })
            .unwrap()
            .typed("double", |input: Input| Ok(input.value * 2))
            .unwrap();

        let signatures = registry.signatures();
        assert_eq!(signatures.kind("plain"), Some(SignatureKind::Http));
        assert!(!signatures.is_async("plain"));
        assert_eq!(signatures.kind("legacy"), Some(SignatureKind::Event));
        assert!(signatures.is_async("legacy"));
        assert_eq!(signatures.kind("double"), Some(SignatureKind::Typed));
        assert_eq!(signatures.input_type("double").map(|t| t.name()), Some("Input"));
        assert!(signatures.input_type("plain").is_none());

        assert_eq!(
            registry.list(),
            vec![
                ("double".to_string(), SignatureKind::Typed),
                ("legacy".to_string(), SignatureKind::Event),
                ("plain".to_string(), SignatureKind::Http),
            ]
        );
    }

    #[test]
    fn test_duplicate_function_name_fails() {
        let mut registry = FunctionRegistry::new();
        registry.http("f", |_req: FunctionRequest| Ok(())).unwrap();
        let result = registry.cloud_event("f", |_event: CloudEvent| Ok(()));
        assert!(matches!(result, Err(FrameworkError::DuplicateRegistration(_))));
        assert_eq!(registry.get("f").map(FunctionTarget::kind), Some(SignatureKind::Http));
    }

    #[test]
    fn test_typed_wrapper_decodes_and_calls() {
        let mut registry = FunctionRegistry::new();
        registry.typed("double", |input: Input| Ok(input.value * 2)).unwrap();

        let input_type = *registry.signatures().input_type("double").unwrap();
        let payload = input_type.decode(serde_json::json!({"value": 21})).unwrap();
        let Some(FunctionTarget::Typed(Callable::Blocking(f))) = registry.get("double") else {
            panic!("expected a blocking typed function");
        };
        let response = f.call(payload).unwrap().into_response().unwrap();
        assert_eq!(response.text_body(), Some("42".to_string()));
    }
}
