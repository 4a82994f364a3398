// Domain Layer - Pure data types and state rules

pub mod error;
pub mod property;
pub mod record;
pub mod transaction;

// Re-exports
pub use error::DomainError;
pub use property::{
    type_mismatch, Bean, Declared, EntityRef, PropertyDescriptor, PropertyKind, PropertyMap,
    PropertyValue,
};
pub use record::{Change, ChangeSet, EntityKey, Persistent, Record};
pub use transaction::{IsolationLevel, Propagation, TransactionDefinition, TransactionState};
