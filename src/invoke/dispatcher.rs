//! Invocation dispatcher.
//!
//! Async functions are awaited on the request task. Blocking functions run
//! either in place (multi-threaded backend, through `block_in_place`) or on
//! the blocking pool bounded by a worker semaphore (async backend), so a
//! slow handler never stalls the serving thread.

use crate::error::RequestError;
use crate::execution::context;
use crate::function::{
    AsyncHandler, BlockingHandler, Callable, FunctionError, FunctionTarget, SignatureKind,
};
use crate::http::{FunctionResponse, StatusCode};
use crate::invoke::normalizer::NormalizedEvent;
use futures_util::FutureExt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Where blocking functions execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// On the thread serving the request.
    InPlace,
    /// On the blocking pool, awaited by the serving task.
    Offload,
}

/// Invokes user functions and maps their results to responses.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    mode: DispatchMode,
    workers: Arc<Semaphore>,
}

impl Dispatcher {
    /// `workers` bounds how many blocking functions run at once when
    /// offloading.
    pub fn new(mode: DispatchMode, workers: usize) -> Self {
        Self {
            mode,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Invoke `target` with a normalised input and build the response.
    pub async fn invoke(
        &self,
        target: &FunctionTarget,
        event: NormalizedEvent,
    ) -> Result<FunctionResponse, RequestError> {
        match (target, event) {
            (FunctionTarget::Http(f), NormalizedEvent::Http(request)) => {
                Ok(self.call(f, request).await?.into_response())
            }
            (FunctionTarget::Event(f), NormalizedEvent::Background(event)) => {
                self.call(f, event).await?;
                Ok(FunctionResponse::text("OK"))
            }
            (FunctionTarget::CloudEvent(f), NormalizedEvent::CloudEvent(event)) => {
                self.call(f, event).await?;
                Ok(FunctionResponse::text("OK"))
            }
            (FunctionTarget::Typed(f), NormalizedEvent::Typed(value)) => self
                .call(f, value)
                .await?
                .into_response()
                .map_err(RequestError::ReturnType),
            (target, event) => Err(RequestError::Handler(FunctionError::new(format!(
                "{} function cannot receive {} input",
                target.kind(),
                event.kind()
            )))),
        }
    }

    async fn call<I, O>(&self, callable: &Callable<I, O>, input: I) -> Result<O, FunctionError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        match callable {
            Callable::Async(f) => AssertUnwindSafe(f.call(input))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FunctionError::from_panic(panic))),
            Callable::Blocking(f) => match self.mode {
                DispatchMode::InPlace => run_in_place(f.as_ref(), input),
                DispatchMode::Offload => self.offload(f.clone(), input).await,
            },
        }
    }

    async fn offload<I, O>(
        &self,
        f: Arc<dyn BlockingHandler<I, O>>,
        input: I,
    ) -> Result<O, FunctionError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FunctionError::new(e.to_string()))?;
        let current = context::current();

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = current.map(context::enter);
            f.call(input)
        });

        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(FunctionError::from_panic(err.into_panic())),
            Err(err) => Err(FunctionError::new(err.to_string())),
        }
    }
}

fn run_in_place<I, O>(f: &dyn BlockingHandler<I, O>, input: I) -> Result<O, FunctionError> {
    let call = move || {
        catch_unwind(AssertUnwindSafe(|| f.call(input)))
            .unwrap_or_else(|panic| Err(FunctionError::from_panic(panic)))
    };
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(call)
        }
        _ => call(),
    }
}

/// Render a request error for a function of the given kind.
///
/// Handler failures on HTTP functions get a generic body; every other kind
/// reports the failure text.
pub fn error_response(kind: SignatureKind, err: &RequestError) -> FunctionResponse {
    if err.is_crash() {
        error!("Exception on request: {}", err);
        let message = match (kind, err) {
            (SignatureKind::Http, RequestError::Handler(_)) => "Internal Server Error".to_string(),
            _ => err.to_string(),
        };
        return FunctionResponse::crash(message);
    }

    if err.status() == StatusCode::INTERNAL_SERVER_ERROR {
        error!("{}", err);
    } else if err.status().is_client_error() {
        debug!("rejected request: {}", err);
    } else {
        warn!("{}", err);
    }
    FunctionResponse::error(err.status(), err.to_string())
}
