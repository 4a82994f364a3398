// Transaction Status - per unit-of-work handle

use crate::application::scope::SuspendedResources;
use crate::domain::{IsolationLevel, TransactionDefinition, TransactionState};
use crate::error::{AppError, Result};
use crate::port::PersistenceContext;
use std::fmt;
use std::sync::Arc;

/// Handle for one logical unit-of-work
///
/// A handle either owns a freshly acquired connection holder (`new_holder`) or
/// participates in the holder of an enclosing transaction. Only handles with
/// `new_transaction` set ever commit or roll back the connection.
pub struct TransactionStatus {
    pub(crate) definition: TransactionDefinition,
    pub(crate) state: TransactionState,
    pub(crate) new_transaction: bool,
    pub(crate) new_holder: bool,
    pub(crate) must_restore_auto_commit: bool,
    pub(crate) must_restore_read_only: bool,
    pub(crate) previous_isolation: Option<IsolationLevel>,
    pub(crate) rollback_only: bool,
    pub(crate) context: Option<Arc<dyn PersistenceContext>>,
    pub(crate) previous_context: Option<Arc<dyn PersistenceContext>>,
    pub(crate) suspended: Option<SuspendedResources>,
}

impl TransactionStatus {
    pub(crate) fn new(definition: TransactionDefinition) -> Self {
        Self {
            definition,
            state: TransactionState::Created,
            new_transaction: false,
            new_holder: false,
            must_restore_auto_commit: false,
            must_restore_read_only: false,
            previous_isolation: None,
            rollback_only: false,
            context: None,
            previous_context: None,
            suspended: None,
        }
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// False when participating in an enclosing transaction
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// True when this handle acquired its own connection
    pub fn is_new_holder(&self) -> bool {
        self.new_holder
    }

    /// Local rollback-only flag, set through the template
    pub fn is_local_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn has_suspended_resources(&self) -> bool {
        self.suspended.is_some()
    }

    /// Persistence context this unit-of-work runs against
    pub fn context(&self) -> Option<&Arc<dyn PersistenceContext>> {
        self.context.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    pub(crate) fn transition(&mut self, to: TransactionState) -> Result<()> {
        self.state.transition(to).map_err(|e| {
            AppError::IllegalTransactionState(format!(
                "transaction {}: {}",
                self.definition.name.as_deref().unwrap_or("<unnamed>"),
                e
            ))
        })
    }
}

impl fmt::Debug for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("definition", &self.definition)
            .field("state", &self.state)
            .field("new_transaction", &self.new_transaction)
            .field("new_holder", &self.new_holder)
            .field("rollback_only", &self.rollback_only)
            .field("context", &self.context.as_ref().map(|c| c.id()))
            .field("suspended", &self.suspended.is_some())
            .finish()
    }
}
