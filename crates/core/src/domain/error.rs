// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid transaction state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Property {name} is not writable")]
    NotWritable { name: String },

    #[error("Cannot convert {found} into {expected} for property {name}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
