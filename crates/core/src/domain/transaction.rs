// Transaction Domain Model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a unit-of-work relates to one that is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the enclosing transaction, or start one if there is none
    #[default]
    Normal,
    /// Always start an independent transaction with a fresh context,
    /// parking the enclosing one until this one completes
    RequiresNew,
}

/// Connection isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ_UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ_COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE_READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Attributes requested for a unit-of-work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDefinition {
    #[serde(default)]
    pub propagation: Propagation,

    /// None keeps the connection's current level
    #[serde(default)]
    pub isolation: Option<IsolationLevel>,

    /// Timeout in seconds, pushed down to the connection as a deadline
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub read_only: bool,

    /// Name used in log output only
    #[serde(default)]
    pub name: Option<String>,
}

impl TransactionDefinition {
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Default::default()
        }
    }

    pub fn requires_new() -> Self {
        Self::new(Propagation::RequiresNew)
    }

    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Lifecycle of one transaction handle
///
/// `Created -> Active -> (Committed | RolledBack) -> CleanedUp`. Suspension is
/// tracked separately and does not change the terminal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Created,
    Active,
    Committed,
    RolledBack,
    CleanedUp,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Created => write!(f, "CREATED"),
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
            TransactionState::CleanedUp => write!(f, "CLEANED_UP"),
        }
    }
}

impl TransactionState {
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Created, Active)
                | (Created, CleanedUp)
                | (Active, Committed)
                | (Active, RolledBack)
                | (Committed, CleanedUp)
                | (RolledBack, CleanedUp)
        )
    }

    /// Move to `next`, rejecting transitions outside the lifecycle
    pub fn transition(&mut self, next: TransactionState) -> super::error::Result<()> {
        if !self.can_transition_to(next) {
            return Err(super::error::DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_completed(self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack | TransactionState::CleanedUp
        )
    }
}
