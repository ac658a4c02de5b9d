//! Request correlation: execution context storage and log correlation.

pub mod context;
pub mod logging;

pub use context::{
    current, enter, generate_execution_id, parse_span_id, scope, ContextGuard, ExecutionContext,
    EXECUTION_ID_HEADER, TRACE_CONTEXT_HEADER,
};
pub use logging::{init_tracing, stderr, stdout, CorrelatedWriter, LogCorrelator, StdStreams};
