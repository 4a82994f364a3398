// Property Model for schema-driven bean merging

use super::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Untyped property map (decoded JSON object, form data, ...)
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Reference to a managed persistent object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity: String,
    pub id: i64,
}

/// Dynamically typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Map(PropertyMap),
    List(Vec<PropertyValue>),
    Entity(EntityRef),
    /// Anything without a dedicated variant; passed through untouched
    Opaque(serde_json::Value),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::String(_) => "string",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Long(_) => "long",
            PropertyValue::Double(_) => "double",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Date(_) => "date",
            PropertyValue::Map(_) => "map",
            PropertyValue::List(_) => "list",
            PropertyValue::Entity(_) => "entity",
            PropertyValue::Opaque(_) => "opaque",
        }
    }

    /// True for entity references and for containers whose first element is one
    pub fn is_relationship(&self) -> bool {
        match self {
            PropertyValue::Entity(_) => true,
            PropertyValue::Map(m) => matches!(m.values().next(), Some(PropertyValue::Entity(_))),
            PropertyValue::List(l) => matches!(l.first(), Some(PropertyValue::Entity(_))),
            _ => false,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(v: DateTime<Utc>) -> Self {
        PropertyValue::Date(v)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

/// Declared type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    Map,
    List,
    /// Single managed entity reference
    ToOne,
    /// Collection of managed entity references
    ToMany,
    Opaque,
}

impl PropertyKind {
    pub fn is_relationship(self) -> bool {
        matches!(self, PropertyKind::ToOne | PropertyKind::ToMany)
    }
}

/// Where a property is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    /// On the entity type itself
    Entity,
    /// On the shared persistent base (id, persistence bookkeeping)
    Base,
}

/// Static description of one bean property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub readable: bool,
    pub writable: bool,
    pub declared: Declared,
}

impl PropertyDescriptor {
    pub const fn new(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            readable: true,
            writable: true,
            declared: Declared::Entity,
        }
    }

    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub const fn base(mut self) -> Self {
        self.declared = Declared::Base;
        self
    }
}

/// Explicit property schema of a mergeable type
///
/// Implementors list their properties once and route reads and writes by
/// name; `set` rejects values of the wrong variant with
/// [`DomainError::TypeMismatch`].
pub trait Bean {
    fn properties(&self) -> &'static [PropertyDescriptor];

    fn get(&self, name: &str) -> Option<PropertyValue>;

    fn set(&mut self, name: &str, value: PropertyValue) -> Result<()>;

    fn descriptor(&self, name: &str) -> Option<&'static PropertyDescriptor> {
        self.properties().iter().find(|d| d.name == name)
    }
}

/// Error for a `set` call whose value does not fit the property
pub fn type_mismatch(name: &str, expected: PropertyKind, found: &PropertyValue) -> DomainError {
    DomainError::TypeMismatch {
        name: name.to_string(),
        expected: format!("{expected:?}"),
        found: found.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_detection() {
        let entity = PropertyValue::Entity(EntityRef {
            entity: "Artist".into(),
            id: 1,
        });
        assert!(entity.is_relationship());
        assert!(PropertyValue::List(vec![entity.clone()]).is_relationship());

        let mut map = PropertyMap::new();
        map.insert("a".into(), entity);
        assert!(PropertyValue::Map(map).is_relationship());

        assert!(!PropertyValue::List(vec![]).is_relationship());
        assert!(!PropertyValue::from("x").is_relationship());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(PropertyValue::from(None::<i32>), PropertyValue::Null);
        assert_eq!(PropertyValue::from(Some(3)), PropertyValue::Integer(3));
    }

    #[test]
    fn test_descriptor_builders() {
        const ID: PropertyDescriptor = PropertyDescriptor::new("id", PropertyKind::Long).base();
        assert_eq!(ID.declared, Declared::Base);
        assert!(ID.writable);
        assert!(!PropertyDescriptor::new("x", PropertyKind::String).read_only().writable);
    }
}
