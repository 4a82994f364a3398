// Transaction Hooks - the resource-specific half of the template protocol

use super::TransactionStatus;
use crate::application::scope::{ExecutionScope, SuspendedResources};
use crate::domain::TransactionDefinition;
use crate::error::Result;
use async_trait::async_trait;

/// Resource-specific steps driven by [`super::TransactionTemplate`]
///
/// The template decides propagation, rollback-only handling and ordering;
/// implementations only acquire, flush and release resources.
#[async_trait]
pub trait TransactionHooks: Send + Sync {
    /// Create a handle for a new unit-of-work
    fn get_transaction(&self, scope: &ExecutionScope, definition: TransactionDefinition)
        -> TransactionStatus;

    /// Whether the scope already runs an active transaction
    fn is_existing_transaction(&self, scope: &ExecutionScope) -> bool;

    /// Whether a participant marked the running transaction rollback-only
    fn is_global_rollback_only(&self, scope: &ExecutionScope) -> bool;

    async fn begin(&self, scope: &mut ExecutionScope, status: &mut TransactionStatus)
        -> Result<()>;

    async fn commit(&self, scope: &mut ExecutionScope, status: &mut TransactionStatus)
        -> Result<()>;

    async fn rollback(&self, scope: &mut ExecutionScope, status: &mut TransactionStatus)
        -> Result<()>;

    fn set_rollback_only(&self, scope: &mut ExecutionScope, status: &TransactionStatus);

    fn suspend(&self, scope: &mut ExecutionScope) -> SuspendedResources;

    fn resume(&self, scope: &mut ExecutionScope, suspended: SuspendedResources);

    /// Runs after commit or rollback on every path; never fails
    async fn cleanup_after_completion(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
    );
}
