// Remote Object Persistence Service
//
// Sessions are kept in memory and dropped once idle for longer than the
// session timeout. Every message is handled as its own request: a fresh
// ExecutionScope, one transaction, then request teardown.

use crate::application::request::RequestLifecycle;
use crate::application::scope::ExecutionScope;
use crate::application::tx::TransactionTemplate;
use crate::domain::{Change, Record, TransactionDefinition};
use crate::error::{AppError, Result};
use crate::port::{ContextAccessor, IdProvider, RemoteService, RemoteSession};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Message sent by a remote client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Fetch { entity: String, id: i64 },
    Commit { changes: Vec<Change> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    Record { record: Option<Record> },
    Committed { changes: usize },
}

struct SessionEntry {
    session: RemoteSession,
    last_seen: Instant,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, SessionEntry>,
    shared: HashMap<String, String>,
}

impl Sessions {
    fn evict_idle(&mut self, now: Instant, timeout: Duration) {
        let before = self.by_id.len();
        self.by_id
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= timeout);
        let by_id = &self.by_id;
        self.shared.retain(|_, id| by_id.contains_key(id.as_str()));

        let evicted = before - self.by_id.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.by_id.len(), "Evicted idle remote sessions");
        }
    }

    fn insert(&mut self, session: RemoteSession, now: Instant) {
        if let Some(name) = &session.name {
            self.shared.insert(name.clone(), session.session_id.clone());
        }
        self.by_id.insert(
            session.session_id.clone(),
            SessionEntry {
                session,
                last_seen: now,
            },
        );
    }
}

pub struct ContextRemoteService {
    template: TransactionTemplate,
    lifecycle: RequestLifecycle,
    ids: Arc<dyn IdProvider>,
    session_timeout: Duration,
    sessions: RwLock<Sessions>,
}

impl ContextRemoteService {
    pub fn new(
        template: TransactionTemplate,
        lifecycle: RequestLifecycle,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            template,
            lifecycle,
            ids,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            sessions: RwLock::new(Sessions::default()),
        }
    }

    /// Idle time after which a session is forgotten
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().by_id.len()
    }

    /// Marks the session as used, failing when it is unknown or expired
    fn touch(&self, session_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        sessions.evict_idle(now, self.session_timeout);
        match sessions.by_id.get_mut(session_id) {
            Some(entry) => {
                entry.last_seen = now;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("remote session {session_id}"))),
        }
    }

    async fn handle(&self, scope: &mut ExecutionScope, message: ClientMessage) -> Result<ServerResponse> {
        match message {
            ClientMessage::Fetch { entity, id } => {
                let definition = TransactionDefinition::default()
                    .with_read_only(true)
                    .with_name("remote-fetch");
                self.template
                    .execute(scope, definition, move |scope| {
                        Box::pin(async move {
                            let holder = scope.holder_mut().ok_or_else(|| {
                                AppError::IllegalTransactionState("no transaction bound".into())
                            })?;
                            let context = holder.context().clone();
                            let record = context.fetch(holder.connection_mut(), &entity, id).await?;
                            Ok(ServerResponse::Record { record })
                        })
                    })
                    .await
            }
            ClientMessage::Commit { changes } => {
                let count = changes.len();
                let definition = TransactionDefinition::default().with_name("remote-commit");
                self.template
                    .execute(scope, definition, move |scope| {
                        Box::pin(async move {
                            // registered on the transaction's own context, unbound again by cleanup
                            let context = scope.current().ok_or_else(|| {
                                AppError::IllegalTransactionState("no transaction context bound".into())
                            })?;
                            for change in changes {
                                context.register(change);
                            }
                            Ok(())
                        })
                    })
                    .await?;
                Ok(ServerResponse::Committed { changes: count })
            }
        }
    }
}

#[async_trait]
impl RemoteService for ContextRemoteService {
    async fn establish_session(&self) -> Result<RemoteSession> {
        let session = RemoteSession {
            session_id: self.ids.generate_id(),
            name: None,
        };
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        sessions.evict_idle(now, self.session_timeout);
        sessions.insert(session.clone(), now);
        info!(session_id = %session.session_id, "Established remote session");
        Ok(session)
    }

    async fn establish_shared_session(&self, name: &str) -> Result<RemoteSession> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("shared session name must not be empty".into()));
        }

        let now = Instant::now();
        let mut sessions = self.sessions.write();
        sessions.evict_idle(now, self.session_timeout);

        let existing = sessions.shared.get(name).cloned();
        if let Some(entry) = existing.and_then(|id| sessions.by_id.get_mut(&id)) {
            entry.last_seen = now;
            debug!(session_id = %entry.session.session_id, name, "Joining shared remote session");
            return Ok(entry.session.clone());
        }

        let session = RemoteSession {
            session_id: self.ids.generate_id(),
            name: Some(name.to_string()),
        };
        sessions.insert(session.clone(), now);
        info!(session_id = %session.session_id, name, "Established shared remote session");
        Ok(session)
    }

    async fn process_message(
        &self,
        session_id: &str,
        message: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.touch(session_id)?;
        let message: ClientMessage = serde_json::from_value(message)?;
        debug!(session_id, ?message, "Processing remote message");

        let mut scope = self.lifecycle.request_initialized();
        let response = self.handle(&mut scope, message).await;
        self.lifecycle.request_destroyed(&mut scope).await;

        Ok(serde_json::to_value(response?)?)
    }
}
