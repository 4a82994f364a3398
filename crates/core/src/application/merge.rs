// Bean Merge - copy untyped properties onto a typed bean
//
// Property-level failures are skipped so heterogeneous payloads can be merged
// partially.

use crate::application::json::{describe, populate_map_from_json};
use crate::domain::{Bean, Declared, PropertyKind, PropertyMap, PropertyValue};
use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::trace;

/// Where merged properties come from
pub enum MergeSource<'a> {
    Map(&'a PropertyMap),
    Json(&'a Map<String, Value>),
    Bean(&'a dyn Bean),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Copy null source values over existing destination values
    pub allow_nulls: bool,
    /// Copy entity references and collections of them
    pub allow_relationships: bool,
}

/// Merge every matching property, nulls included; relationships are skipped
pub fn merge_all(dest: &mut dyn Bean, source: MergeSource<'_>) -> usize {
    merge(
        dest,
        source,
        MergeOptions {
            allow_nulls: true,
            allow_relationships: false,
        },
    )
}

/// Merge every matching non-null property; relationships are skipped
pub fn merge_not_null(dest: &mut dyn Bean, source: MergeSource<'_>) -> usize {
    merge(dest, source, MergeOptions::default())
}

/// Copy readable source properties onto writable destination properties of
/// the same name, returning how many were written
pub fn merge(dest: &mut dyn Bean, source: MergeSource<'_>, options: MergeOptions) -> usize {
    let properties = match source {
        MergeSource::Map(map) => map.clone(),
        MergeSource::Json(object) => {
            let mut map = PropertyMap::new();
            populate_map_from_json(object, &mut map, &[]);
            map
        }
        MergeSource::Bean(bean) => describe(bean),
    };

    let mut written = 0;
    for (name, value) in properties {
        let Some(descriptor) = dest.descriptor(&name) else {
            continue;
        };
        if !descriptor.writable || descriptor.declared == Declared::Base {
            continue;
        }
        if value.is_null() && !options.allow_nulls {
            continue;
        }
        if !options.allow_relationships
            && (descriptor.kind.is_relationship() || value.is_relationship())
        {
            continue;
        }

        let Some(value) = coerce(value, descriptor.kind) else {
            trace!(property = %name, "Skipping inconvertible property");
            continue;
        };
        match dest.set(&name, value) {
            Ok(()) => written += 1,
            Err(e) => trace!(property = %name, error = %e, "Skipping property"),
        }
    }
    written
}

/// Convert `value` for a property of `kind`
///
/// | target  | accepted sources                               |
/// |---------|------------------------------------------------|
/// | Date    | epoch millis as integer, long, double or string |
/// | Integer | string, long (if it fits), double (truncated)  |
/// | Long    | string, integer, double (truncated)            |
/// | Double  | integer, long                                  |
///
/// Everything else passes through unchanged. `None` means inconvertible.
pub fn coerce(value: PropertyValue, kind: PropertyKind) -> Option<PropertyValue> {
    use PropertyValue as V;

    match (kind, value) {
        (_, V::Null) => Some(V::Null),
        (PropertyKind::Date, V::String(s)) => {
            let millis = s.trim().parse::<i64>().ok()?;
            DateTime::from_timestamp_millis(millis).map(V::Date)
        }
        (PropertyKind::Date, V::Integer(v)) => {
            DateTime::from_timestamp_millis(i64::from(v)).map(V::Date)
        }
        (PropertyKind::Date, V::Long(v)) => DateTime::from_timestamp_millis(v).map(V::Date),
        (PropertyKind::Date, V::Double(v)) => {
            DateTime::from_timestamp_millis(v as i64).map(V::Date)
        }
        (PropertyKind::Integer, V::String(s)) => s.trim().parse().ok().map(V::Integer),
        (PropertyKind::Integer, V::Long(v)) => i32::try_from(v).ok().map(V::Integer),
        (PropertyKind::Integer, V::Double(v)) => Some(V::Integer(v as i32)),
        (PropertyKind::Long, V::String(s)) => s.trim().parse().ok().map(V::Long),
        (PropertyKind::Long, V::Integer(v)) => Some(V::Long(i64::from(v))),
        (PropertyKind::Long, V::Double(v)) => Some(V::Long(v as i64)),
        (PropertyKind::Double, V::Integer(v)) => Some(V::Double(f64::from(v))),
        (PropertyKind::Double, V::Long(v)) => Some(V::Double(v as f64)),
        (_, value) => Some(value),
    }
}
