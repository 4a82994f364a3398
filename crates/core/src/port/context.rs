// Ambient Context Accessor Port

use crate::port::PersistenceContext;
use std::sync::Arc;

/// Per-request (or per-task) slot holding the active persistence context
///
/// Implementations are owned by exactly one request at a time, so no locking
/// is involved: two concurrent units-of-work never see each other's context.
pub trait ContextAccessor {
    fn current(&self) -> Option<Arc<dyn PersistenceContext>>;

    /// Overwrite the slot; `None` clears it
    fn bind(&mut self, context: Option<Arc<dyn PersistenceContext>>);
}
