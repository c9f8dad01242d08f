//! Response Normalizer - flatten JSON:API documents into plain records
//!
//! A record carries the resource `id`, every attribute under its snake_case
//! name, and relationship linkage as `<name>_id` (to-one) or `<name>_ids`
//! (to-many). Polymorphic relationships also get `<name>_type` when the
//! resource schema is known.

use serde_json::{Map, Value};
use thiserror::Error;

use super::registry::ResourceDef;

/// One flattened resource
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    One(Record),
    Many(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing top-level \"data\" member")]
    MissingData,

    #[error("resource object is not a JSON object")]
    NotAnObject,

    #[error("resource object has no id")]
    MissingId,
}

/// Normalize without schema knowledge
pub fn normalize(document: &Value) -> Result<Normalized, NormalizeError> {
    normalize_document(document, None)
}

/// Normalize with the resource schema, adding `<name>_type` for polymorphic links
pub fn normalize_for(document: &Value, resource: &ResourceDef) -> Result<Normalized, NormalizeError> {
    normalize_document(document, Some(resource))
}

fn normalize_document(
    document: &Value,
    resource: Option<&ResourceDef>,
) -> Result<Normalized, NormalizeError> {
    match document.get("data") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| flatten(item, resource))
            .collect::<Result<Vec<_>, _>>()
            .map(Normalized::Many),
        Some(item @ Value::Object(_)) => flatten(item, resource).map(Normalized::One),
        Some(_) => Err(NormalizeError::NotAnObject),
        None => Err(NormalizeError::MissingData),
    }
}

fn flatten(item: &Value, resource: Option<&ResourceDef>) -> Result<Record, NormalizeError> {
    let object = item.as_object().ok_or(NormalizeError::NotAnObject)?;

    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(NormalizeError::MissingId),
    };

    let mut record = Record::new();
    record.insert("id".to_string(), Value::String(id));

    if let Some(Value::Object(attributes)) = object.get("attributes") {
        for (key, value) in attributes {
            record.insert(snake_case(key), value.clone());
        }
    }

    if let Some(Value::Object(relationships)) = object.get("relationships") {
        for (key, rel) in relationships {
            let name = snake_case(key);
            let polymorphic = resource
                .and_then(|r| r.relationship_by_wire(key))
                .is_some_and(|def| def.is_polymorphic());

            match rel.get("data") {
                Some(Value::Array(items)) => {
                    let ids: Vec<Value> = items.iter().filter_map(linkage_id).collect();
                    record.insert(format!("{name}_ids"), Value::Array(ids));
                }
                Some(linkage @ Value::Object(_)) => {
                    record.insert(
                        format!("{name}_id"),
                        linkage_id(linkage).unwrap_or(Value::Null),
                    );
                    if polymorphic {
                        let type_name = linkage.get("type").cloned().unwrap_or(Value::Null);
                        record.insert(format!("{name}_type"), type_name);
                    }
                }
                Some(Value::Null) => {
                    record.insert(format!("{name}_id"), Value::Null);
                    if polymorphic {
                        record.insert(format!("{name}_type"), Value::Null);
                    }
                }
                // links-only relationship, nothing to flatten
                _ => {}
            }
        }
    }

    Ok(record)
}

fn linkage_id(linkage: &Value) -> Option<Value> {
    match linkage.get("id")? {
        Value::String(id) => Some(Value::String(id.clone())),
        Value::Number(id) => Some(Value::String(id.to_string())),
        _ => None,
    }
}

/// `expired-at` -> `expired_at`
pub fn snake_case(key: &str) -> String {
    key.replace('-', "_")
}
