// JSON <-> property map conversion

use crate::domain::{Bean, PropertyMap, PropertyValue};
use serde_json::{json, Map, Number, Value};

fn selected(keys: &[&str], key: &str) -> bool {
    keys.is_empty() || keys.contains(&key)
}

/// Copy the fields of `object` into `map`; a non-empty `keys` limits which fields
pub fn populate_map_from_json<'m>(
    object: &Map<String, Value>,
    map: &'m mut PropertyMap,
    keys: &[&str],
) -> &'m mut PropertyMap {
    for (key, node) in object {
        if selected(keys, key) {
            map.insert(key.clone(), value_from_json(node));
        }
    }
    map
}

pub fn value_from_json(node: &Value) -> PropertyValue {
    match node {
        Value::Null => PropertyValue::Null,
        Value::String(s) => PropertyValue::String(s.clone()),
        Value::Bool(b) => PropertyValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(v) => match i32::try_from(v) {
                Ok(v) => PropertyValue::Integer(v),
                Err(_) => PropertyValue::Long(v),
            },
            None => n
                .as_f64()
                .map(PropertyValue::Double)
                .unwrap_or_else(|| PropertyValue::Opaque(node.clone())),
        },
        Value::Object(object) => {
            let mut map = PropertyMap::new();
            populate_map_from_json(object, &mut map, &[]);
            PropertyValue::Map(map)
        }
        Value::Array(items) => PropertyValue::List(items.iter().map(value_from_json).collect()),
    }
}

/// Dates become epoch milliseconds; entity references become `{entity, id}`
pub fn value_to_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::Integer(v) => Value::from(*v),
        PropertyValue::Long(v) => Value::from(*v),
        PropertyValue::Double(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::Date(d) => Value::from(d.timestamp_millis()),
        PropertyValue::Map(map) => {
            let mut object = Map::new();
            populate_json_object(map, &mut object, &[]);
            Value::Object(object)
        }
        PropertyValue::List(items) => Value::Array(items.iter().map(value_to_json).collect()),
        PropertyValue::Entity(r) => json!({ "entity": r.entity, "id": r.id }),
        PropertyValue::Opaque(v) => v.clone(),
    }
}

pub fn populate_json_object<'o>(
    map: &PropertyMap,
    object: &'o mut Map<String, Value>,
    keys: &[&str],
) -> &'o mut Map<String, Value> {
    for (key, value) in map {
        if selected(keys, key) {
            object.insert(key.clone(), value_to_json(value));
        }
    }
    object
}

/// Readable properties of `bean` as a property map
pub fn describe(bean: &dyn Bean) -> PropertyMap {
    bean.properties()
        .iter()
        .filter(|d| d.readable)
        .filter_map(|d| bean.get(d.name).map(|v| (d.name.to_string(), v)))
        .collect()
}

pub fn bean_to_json<'o>(
    bean: &dyn Bean,
    object: &'o mut Map<String, Value>,
    keys: &[&str],
) -> &'o mut Map<String, Value> {
    populate_json_object(&describe(bean), object, keys)
}
