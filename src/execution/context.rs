//! Per-request execution context and where it is kept.
//!
//! Async request tasks carry their context in a tokio task-local, which
//! follows the task across `.await` points and is invisible to other tasks.
//! Blocking handlers running on a worker thread get a thread-local slot that
//! is set through a [`ContextGuard`] and restored when the guard drops, so
//! the slot is cleared on every exit path including unwinding.

use crate::http::FunctionRequest;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::cell::RefCell;
use std::future::Future;
use std::sync::LazyLock;

/// Inbound header carrying the execution id.
pub const EXECUTION_ID_HEADER: &str = "Function-Execution-Id";
/// Inbound trace header of the form `TRACE_ID/SPAN_ID;o=FLAGS`.
pub const TRACE_CONTEXT_HEADER: &str = "X-Cloud-Trace-Context";

const EXECUTION_ID_LENGTH: usize = 12;

static TRACE_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<trace_id>[\w\d]+)/(?P<span_id>\d+);o=(?P<options>[01])$")
        .expect("valid trace context regex")
});

tokio::task_local! {
    static TASK_CONTEXT: ExecutionContext;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<ExecutionContext>> = const { RefCell::new(None) };
}

/// Correlation data for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    execution_id: String,
    span_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, span_id: Option<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            span_id,
        }
    }

    /// Build the context for a request, generating an execution id when the
    /// inbound header is absent or empty. The generated id is written back
    /// into the request headers so the handler sees the same value.
    pub fn attach(request: &mut FunctionRequest) -> Self {
        let inbound = request
            .get_header(EXECUTION_ID_HEADER)
            .filter(|id| !id.is_empty())
            .cloned();
        let execution_id = match inbound {
            Some(id) => id,
            None => {
                let id = generate_execution_id();
                request.set_header(EXECUTION_ID_HEADER, id.clone());
                id
            }
        };
        let span_id = request
            .get_header(TRACE_CONTEXT_HEADER)
            .and_then(|header| parse_span_id(header));
        Self::new(execution_id, span_id)
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }
}

/// A fresh 12-character id drawn from ASCII letters and digits.
pub fn generate_execution_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(EXECUTION_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Span id from a trace-context header; `None` when malformed.
pub fn parse_span_id(header: &str) -> Option<String> {
    TRACE_CONTEXT
        .captures(header)
        .and_then(|captures| captures.name("span_id"))
        .map(|m| m.as_str().to_string())
}

/// The context of the request being served by the caller, if any.
pub fn current() -> Option<ExecutionContext> {
    TASK_CONTEXT
        .try_with(Clone::clone)
        .ok()
        .or_else(|| THREAD_CONTEXT.with(|slot| slot.borrow().clone()))
}

/// Run `fut` with `context` as the task's execution context.
pub async fn scope<F: Future>(context: ExecutionContext, fut: F) -> F::Output {
    TASK_CONTEXT.scope(context, fut).await
}

/// Install `context` in the calling thread's slot until the guard drops.
pub fn enter(context: ExecutionContext) -> ContextGuard {
    let previous = THREAD_CONTEXT.with(|slot| slot.replace(Some(context)));
    ContextGuard { previous }
}

/// Restores the previous thread slot value on drop.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<ExecutionContext>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        THREAD_CONTEXT.with(|slot| *slot.borrow_mut() = previous);
    }
}
