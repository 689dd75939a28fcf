//! List ↔ map normalization for named collections.
//!
//! The slyd backend stores named collections (items, item fields,
//! extractors) as JSON objects keyed by name, while callers work with
//! ordered lists of records that carry their own `name` field:
//!
//! ```text
//! [ {"name": "price", "type": "number"}, {"name": "title", "type": "text"} ]
//!                          <=>
//! { "price": {"type": "number"}, "title": {"type": "text"} }
//! ```
//!
//! Each function converts exactly one level. Nested collections (an item's
//! `fields`) are converted by the caller with a second, independent pass.
//! Inputs are only ever borrowed; every output is a fresh copy.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// A JSON object. Used both for a single named record and for a collection
/// in map form.
pub type Record = Map<String, Value>;

/// The distinguished field that identifies a record within its collection.
pub const NAME_FIELD: &str = "name";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("record at index {index} has no non-empty `name` field")]
    MissingName { index: usize },

    #[error("record at index {index} has a `name` that is not a string")]
    InvalidName { index: usize },

    #[error("map has an entry under the empty key")]
    EmptyKey,

    #[error("duplicate record name `{0}`")]
    DuplicateName(String),

    #[error("entry `{0}` is not a JSON object")]
    NotAnObject(String),

    #[error("record at index {index} does not serialize to a JSON object")]
    NotARecord { index: usize },

    #[error("failed to decode entry `{name}`: {message}")]
    Decode { name: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duplicates {
    LastWins,
    Reject,
}

/// Convert a list of named records into a map keyed by name.
///
/// A later record with an already-seen name replaces the earlier one.
pub fn to_map(records: &[Record]) -> Result<Record, CodecError> {
    encode(records, Duplicates::LastWins)
}

/// Like [`to_map`], but a repeated name is an error.
pub fn to_map_strict(records: &[Record]) -> Result<Record, CodecError> {
    encode(records, Duplicates::Reject)
}

/// Serialize each item and convert the resulting records with [`to_map`].
pub fn to_map_from<T: Serialize>(items: &[T]) -> Result<Record, CodecError> {
    let records = items
        .iter()
        .enumerate()
        .map(|(index, item)| match serde_json::to_value(item) {
            Ok(Value::Object(record)) => Ok(record),
            _ => Err(CodecError::NotARecord { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    to_map(&records)
}

/// Convert a map keyed by name back into a list of named records, in the
/// map's key order.
pub fn to_list(map: &Record) -> Result<Vec<Record>, CodecError> {
    to_list_with(map, |record| record)
}

/// Convert a map keyed by name into typed values.
pub fn to_list_as<T: DeserializeOwned>(map: &Record) -> Result<Vec<T>, CodecError> {
    let mut out = Vec::with_capacity(map.len());
    for (name, value) in map {
        let record = attach_name(name, value)?;
        let typed = serde_json::from_value(Value::Object(record)).map_err(|e| CodecError::Decode {
            name: name.clone(),
            message: e.to_string(),
        })?;
        out.push(typed);
    }
    Ok(out)
}

/// Convert a map keyed by name into values built by `factory`.
pub fn to_list_with<T, F>(map: &Record, mut factory: F) -> Result<Vec<T>, CodecError>
where
    F: FnMut(Record) -> T,
{
    map.iter()
        .map(|(name, value)| attach_name(name, value).map(&mut factory))
        .collect()
}

fn encode(records: &[Record], duplicates: Duplicates) -> Result<Record, CodecError> {
    let mut map = Record::new();
    for (index, record) in records.iter().enumerate() {
        let name = match record.get(NAME_FIELD) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(Value::String(_)) | None => return Err(CodecError::MissingName { index }),
            Some(_) => return Err(CodecError::InvalidName { index }),
        };
        let mut rest = record.clone();
        rest.shift_remove(NAME_FIELD);
        if map.contains_key(&name) {
            if duplicates == Duplicates::Reject {
                return Err(CodecError::DuplicateName(name));
            }
            debug!(%name, index, "duplicate record name, keeping the later record");
        }
        map.insert(name, Value::Object(rest));
    }
    Ok(map)
}

fn attach_name(name: &str, value: &Value) -> Result<Record, CodecError> {
    if name.is_empty() {
        return Err(CodecError::EmptyKey);
    }
    let Value::Object(fields) = value else {
        return Err(CodecError::NotAnObject(name.to_string()));
    };
    let mut record = fields.clone();
    record.insert(NAME_FIELD.to_string(), Value::String(name.to_string()));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn fields() -> Vec<Record> {
        vec![
            record(json!({"name": "price", "type": "number"})),
            record(json!({"name": "title", "type": "text"})),
        ]
    }

    #[test]
    fn to_map_strips_name() {
        let map = to_map(&fields()).unwrap();
        assert_eq!(
            Value::Object(map),
            json!({"price": {"type": "number"}, "title": {"type": "text"}})
        );
    }

    #[test]
    fn to_list_reattaches_name() {
        let map = record(json!({"price": {"type": "number"}, "title": {"type": "text"}}));
        let list = to_list(&map).unwrap();
        assert_eq!(list, fields());
    }

    #[test]
    fn to_list_follows_key_order() {
        let map = record(json!({"b": {}, "a": {}, "c": {}}));
        let names: Vec<_> = to_list(&map)
            .unwrap()
            .into_iter()
            .map(|r| r[NAME_FIELD].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let records = vec![
            record(json!({"name": "price", "type": "number"})),
            record(json!({"name": "price", "type": "text", "required": true})),
        ];
        let map = to_map(&records).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["price"], json!({"type": "text", "required": true}));
    }

    #[test]
    fn duplicate_names_rejected_in_strict_mode() {
        let records = vec![
            record(json!({"name": "price"})),
            record(json!({"name": "price"})),
        ];
        assert_eq!(
            to_map_strict(&records).unwrap_err(),
            CodecError::DuplicateName("price".to_string())
        );
    }

    #[test]
    fn missing_name_fails() {
        let records = vec![
            record(json!({"name": "ok"})),
            record(json!({"type": "text"})),
        ];
        assert_eq!(to_map(&records).unwrap_err(), CodecError::MissingName { index: 1 });
    }

    #[test]
    fn empty_or_non_string_name_fails() {
        let empty = vec![record(json!({"name": ""}))];
        assert!(matches!(to_map(&empty), Err(CodecError::MissingName { index: 0 })));
        let numeric = vec![record(json!({"name": 7}))];
        assert_eq!(to_map(&numeric).unwrap_err(), CodecError::InvalidName { index: 0 });
    }

    #[test]
    fn empty_key_fails_on_decode() {
        let map = record(json!({"": {"type": "text"}}));
        assert_eq!(to_list(&map).unwrap_err(), CodecError::EmptyKey);
        assert_eq!(to_list_as::<Value>(&map).unwrap_err(), CodecError::EmptyKey);
        assert_eq!(to_list_with(&map, |r| r).unwrap_err(), CodecError::EmptyKey);
    }

    #[test]
    fn empty_map_gives_empty_list() {
        assert!(to_list(&Record::new()).unwrap().is_empty());
    }

    #[test]
    fn non_object_entry_fails() {
        let map = record(json!({"price": "number"}));
        assert_eq!(
            to_list(&map).unwrap_err(),
            CodecError::NotAnObject("price".to_string())
        );
    }

    #[test]
    fn inputs_are_not_mutated() {
        let records = fields();
        let before = records.clone();
        let map = to_map(&records).unwrap();
        assert_eq!(records, before);

        let map_before = map.clone();
        let _ = to_list(&map).unwrap();
        assert_eq!(map, map_before);
        assert!(map.values().all(|v| v.get(NAME_FIELD).is_none()));
    }

    #[test]
    fn to_list_as_decodes_typed_records() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Field {
            name: String,
            #[serde(rename = "type")]
            kind: String,
        }

        let map = record(json!({"price": {"type": "number"}}));
        let typed: Vec<Field> = to_list_as(&map).unwrap();
        assert_eq!(
            typed,
            vec![Field {
                name: "price".to_string(),
                kind: "number".to_string()
            }]
        );

        let bad = record(json!({"price": {"type": 3}}));
        let err = to_list_as::<Field>(&bad).unwrap_err();
        assert!(matches!(err, CodecError::Decode { name, .. } if name == "price"));
    }

    #[test]
    fn to_list_with_uses_factory() {
        let map = record(json!({"a": {"x": 1}, "b": {"x": 2}}));
        let names = to_list_with(&map, |r| r[NAME_FIELD].as_str().unwrap().to_uppercase()).unwrap();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn to_map_from_rejects_non_objects() {
        assert_eq!(
            to_map_from(&["plain string"]).unwrap_err(),
            CodecError::NotARecord { index: 0 }
        );
    }
}
