// Application Layer - transaction binding, request scope and persistence utilities

pub mod json;
pub mod merge;
pub mod object_context;
pub mod remote;
pub mod request;
pub mod scope;
pub mod tx;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use merge::{merge, merge_all, merge_not_null, MergeOptions, MergeSource};
pub use object_context::{ObjectContext, ObjectRuntime};
pub use remote::{ClientMessage, ContextRemoteService, ServerResponse};
pub use request::RequestLifecycle;
pub use scope::{ConnectionHolder, ContextProvider, ExecutionScope, SuspendedResources};
pub use tx::{ContextTransactionManager, TransactionHooks, TransactionStatus, TransactionTemplate};
