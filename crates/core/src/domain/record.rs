// Record & ChangeSet Domain Model

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity name + primary key
pub type EntityKey = (String, i64);

/// A persistent object as seen by a data channel: a JSON document keyed by entity and id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity: String,
    pub id: i64,
    pub body: Map<String, Value>,
}

impl Record {
    pub fn new(entity: impl Into<String>, id: i64, body: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            id,
            body,
        }
    }

    pub fn key(&self) -> EntityKey {
        (self.entity.clone(), self.id)
    }
}

/// One pending modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Change {
    Insert(Record),
    Update(Record),
    Delete { entity: String, id: i64 },
}

impl Change {
    pub fn key(&self) -> EntityKey {
        match self {
            Change::Insert(r) | Change::Update(r) => r.key(),
            Change::Delete { entity, id } => (entity.clone(), *id),
        }
    }
}

/// Ordered set of pending changes, at most one per entity key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn get(&self, entity: &str, id: i64) -> Option<&Change> {
        self.position(entity, id).map(|i| &self.changes[i])
    }

    /// Record a change, folding it into any pending change for the same key
    pub fn push(&mut self, change: Change) {
        let (entity, id) = change.key();
        let Some(pos) = self.position(&entity, id) else {
            self.changes.push(change);
            return;
        };

        let merged = match (&self.changes[pos], change) {
            // never reached storage: the delete cancels the insert
            (Change::Insert(_), Change::Delete { .. }) => None,
            (Change::Insert(_), Change::Insert(r) | Change::Update(r)) => Some(Change::Insert(r)),
            // the row exists in storage, so re-inserting becomes an update
            (Change::Update(_) | Change::Delete { .. }, Change::Insert(r) | Change::Update(r)) => {
                Some(Change::Update(r))
            }
            (_, delete @ Change::Delete { .. }) => Some(delete),
        };

        match merged {
            Some(c) => self.changes[pos] = c,
            None => {
                self.changes.remove(pos);
            }
        }
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    fn position(&self, entity: &str, id: i64) -> Option<usize> {
        self.changes.iter().position(|c| {
            let (e, i) = c.key();
            e == entity && i == id
        })
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        let mut set = ChangeSet::new();
        for change in iter {
            set.push(change);
        }
        set
    }
}

/// A typed entity that can be stored through a data channel
pub trait Persistent: Serialize + DeserializeOwned {
    /// Entity name used as the record namespace
    const ENTITY: &'static str;

    fn id(&self) -> i64;

    fn to_record(&self) -> serde_json::Result<Record> {
        match serde_json::to_value(self)? {
            Value::Object(body) => Ok(Record::new(Self::ENTITY, self.id(), body)),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "entity {} must serialize to a JSON object, got {}",
                Self::ENTITY,
                other
            ))),
        }
    }

    fn from_record(record: Record) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(record.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, name: &str) -> Record {
        let Value::Object(body) = json!({ "id": id, "name": name }) else {
            unreachable!()
        };
        Record::new("Artist", id, body)
    }

    #[test]
    fn test_insert_then_update_stays_insert() {
        let mut set = ChangeSet::new();
        set.push(Change::Insert(record(1, "a")));
        set.push(Change::Update(record(1, "b")));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("Artist", 1), Some(&Change::Insert(record(1, "b"))));
    }

    #[test]
    fn test_insert_then_delete_cancels() {
        let mut set = ChangeSet::new();
        set.push(Change::Insert(record(1, "a")));
        set.push(Change::Delete {
            entity: "Artist".into(),
            id: 1,
        });

        assert!(set.is_empty());
    }

    #[test]
    fn test_delete_then_insert_becomes_update() {
        let mut set = ChangeSet::new();
        set.push(Change::Delete {
            entity: "Artist".into(),
            id: 7,
        });
        set.push(Change::Insert(record(7, "again")));

        assert_eq!(set.get("Artist", 7), Some(&Change::Update(record(7, "again"))));
    }

    #[test]
    fn test_order_preserved_across_keys() {
        let set: ChangeSet = vec![
            Change::Insert(record(2, "x")),
            Change::Insert(record(1, "y")),
            Change::Update(record(2, "z")),
        ]
        .into_iter()
        .collect();

        let ids: Vec<i64> = set.iter().map(|c| c.key().1).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_change_wire_format() {
        let change = Change::Delete {
            entity: "Artist".into(),
            id: 3,
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value, json!({ "op": "DELETE", "entity": "Artist", "id": 3 }));

        let parsed: Change =
            serde_json::from_value(json!({ "op": "INSERT", "entity": "Artist", "id": 1, "body": {} }))
                .unwrap();
        assert_eq!(parsed.key(), ("Artist".to_string(), 1));
    }
}
