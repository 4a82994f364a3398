// Document Data Channel - records stored as JSON bodies in the entities table

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use txbridge_core::domain::{Change, ChangeSet, Record};
use txbridge_core::error::{AppError, Result};
use txbridge_core::port::{Connection, DataChannel, Statement};

pub struct DocumentChannel {
    name: String,
}

impl DocumentChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

fn body_text(record: &Record) -> String {
    Value::Object(record.body.clone()).to_string()
}

#[async_trait]
impl DataChannel for DocumentChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn commit(&self, connection: &mut dyn Connection, changes: &ChangeSet) -> Result<()> {
        for change in changes.iter() {
            match change {
                Change::Insert(record) => {
                    let statement =
                        Statement::new("INSERT INTO entities (entity, id, body) VALUES (?, ?, ?)")
                            .bind(record.entity.as_str())
                            .bind(record.id)
                            .bind(body_text(record));
                    connection.execute(&statement).await?;
                }
                Change::Update(record) => {
                    let statement = Statement::new(
                        "UPDATE entities SET body = ?, \
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
                         WHERE entity = ? AND id = ?",
                    )
                    .bind(body_text(record))
                    .bind(record.entity.as_str())
                    .bind(record.id);
                    if connection.execute(&statement).await? == 0 {
                        // a flush is all-or-nothing
                        connection.rollback().await?;
                        return Err(AppError::NotFound(format!(
                            "{} {} was deleted concurrently",
                            record.entity, record.id
                        )));
                    }
                }
                Change::Delete { entity, id } => {
                    let statement = Statement::new("DELETE FROM entities WHERE entity = ? AND id = ?")
                        .bind(entity.as_str())
                        .bind(*id);
                    connection.execute(&statement).await?;
                }
            }
        }
        debug!(channel = %self.name, changes = changes.len(), "Stored change set");
        Ok(())
    }

    async fn fetch(
        &self,
        connection: &mut dyn Connection,
        entity: &str,
        id: i64,
    ) -> Result<Option<Record>> {
        let statement = Statement::new("SELECT body FROM entities WHERE entity = ? AND id = ?")
            .bind(entity)
            .bind(id);
        let documents = connection.fetch_documents(&statement).await?;

        match documents.into_iter().next() {
            Some(Value::Object(body)) => Ok(Some(Record::new(entity, id, body))),
            Some(other) => Err(AppError::Internal(format!(
                "stored body of {entity} {id} is not an object: {other}"
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteConnectionSource};
    use serde_json::json;
    use txbridge_core::port::ConnectionSource;

    fn record(id: i64, name: &str) -> Record {
        let Value::Object(body) = json!({ "id": id, "name": name }) else {
            unreachable!()
        };
        Record::new("Artist", id, body)
    }

    async fn setup() -> SqliteConnectionSource {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteConnectionSource::new(pool)
    }

    #[tokio::test]
    async fn test_insert_update_delete() {
        let source = setup().await;
        let channel = DocumentChannel::new("default");
        let mut conn = source.acquire().await.unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Change::Insert(record(1, "Monet")));
        changes.push(Change::Insert(record(2, "Manet")));
        channel.commit(conn.as_mut(), &changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Change::Update(record(1, "Claude Monet")));
        changes.push(Change::Delete {
            entity: "Artist".into(),
            id: 2,
        });
        channel.commit(conn.as_mut(), &changes).await.unwrap();

        let monet = channel.fetch(conn.as_mut(), "Artist", 1).await.unwrap().unwrap();
        assert_eq!(monet.body["name"], "Claude Monet");
        assert!(channel.fetch(conn.as_mut(), "Artist", 2).await.unwrap().is_none());
        source.release(conn).await;
    }

    #[tokio::test]
    async fn test_update_of_missing_row_fails() {
        let source = setup().await;
        let channel = DocumentChannel::new("default");
        let mut conn = source.acquire().await.unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Change::Update(record(9, "ghost")));
        let err = channel.commit(conn.as_mut(), &changes).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        source.release(conn).await;
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let source = setup().await;
        let channel = DocumentChannel::new("default");
        let mut conn = source.acquire().await.unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Change::Insert(record(1, "Monet")));
        channel.commit(conn.as_mut(), &changes).await.unwrap();
        let err = channel.commit(conn.as_mut(), &changes).await.unwrap_err();
        assert!(err.to_string().contains("Unique constraint"));
        source.release(conn).await;
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_nothing_in_transaction() {
        let source = setup().await;
        let channel = DocumentChannel::new("default");
        let mut conn = source.acquire().await.unwrap();
        conn.set_auto_commit(false).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.push(Change::Insert(record(1, "Monet")));
        changes.push(Change::Update(record(9, "ghost")));
        assert!(channel.commit(conn.as_mut(), &changes).await.is_err());

        conn.set_auto_commit(true).await.unwrap();
        assert!(channel.fetch(conn.as_mut(), "Artist", 1).await.unwrap().is_none());
        source.release(conn).await;
    }
}
