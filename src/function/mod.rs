//! User functions: handler shapes, signatures and the registry.

pub mod handler;
pub mod registry;
pub mod signature;
pub mod typed;

pub use handler::{AsyncHandler, BlockingHandler, Callable, FunctionError, HandlerOutput};
pub use registry::{FunctionRegistry, FunctionTarget};
pub use signature::{SignatureKind, SignatureRegistration, SignatureRegistry};
pub use typed::{InputType, ToDict, TypedReturn, TypedValue};
