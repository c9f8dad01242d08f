//! Request Compiler - build JSON:API requests from bound flags
//!
//! Compilation is pure: the same binding always yields the same method,
//! path, query and body. Query parameters come out sorted by key and the
//! body's object keys are ordered, so requests are byte-stable.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::binder::{Binding, BoundFilter, RelationshipValue, ResourceRef};
use super::registry::{Action, FilterOperator, ResourceDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Fully-specified HTTP request, before the base URL is applied
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRequest {
    pub method: Method,
    pub path: String,
    /// `(key, value)` pairs, sorted by key
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl CompiledRequest {
    /// Encoded query string without the leading `?`
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string())
        }
    }
}

/// Compile a bound invocation into a request.
///
/// The binding must have passed validation: id-addressed actions carry an id.
pub fn compile(resource: &ResourceDef, action: Action, binding: &Binding) -> CompiledRequest {
    let item_path = || {
        binding
            .id
            .as_deref()
            .map_or_else(|| resource.path.clone(), |id| resource.item_path(id))
    };

    match action {
        Action::List => CompiledRequest {
            method: Method::Get,
            path: resource.path.clone(),
            query: list_query(resource, binding),
            body: None,
        },
        Action::Show => CompiledRequest {
            method: Method::Get,
            path: item_path(),
            query: Vec::new(),
            body: None,
        },
        Action::Create => CompiledRequest {
            method: Method::Post,
            path: resource.path.clone(),
            query: param_query(binding),
            body: Some(document(resource, None, binding)),
        },
        Action::Update => CompiledRequest {
            method: Method::Patch,
            path: item_path(),
            query: param_query(binding),
            body: Some(document(resource, binding.id.as_deref(), binding)),
        },
        Action::Delete => CompiledRequest {
            method: Method::Delete,
            path: item_path(),
            query: Vec::new(),
            body: None,
        },
    }
}

/// Query key for a filter, e.g. `filter[created-at-min]`
pub fn filter_param(filter: &BoundFilter) -> String {
    if let Some(param) = &filter.param {
        return param.clone();
    }
    match filter.operator {
        FilterOperator::Equals | FilterOperator::In => format!("filter[{}]", filter.wire),
        FilterOperator::Min => format!("filter[{}-min]", filter.wire),
        FilterOperator::Max => format!("filter[{}-max]", filter.wire),
        FilterOperator::Presence => {
            format!("filter[{}-{}]", filter.presence_prefix, filter.wire)
        }
    }
}

fn list_query(resource: &ResourceDef, binding: &Binding) -> Vec<(String, String)> {
    let mut query = BTreeMap::new();

    for filter in binding.filters.iter() {
        query.insert(filter_param(filter), filter.value.clone());
    }

    if let Some(limit) = binding.pagination.limit {
        query.insert("page[limit]".to_string(), limit.to_string());
    }
    if let Some(offset) = binding.pagination.offset {
        query.insert("page[offset]".to_string(), offset.to_string());
    }

    if !binding.sort.is_empty() {
        let sort = binding
            .sort
            .iter()
            .map(|k| k.to_param())
            .collect::<Vec<_>>()
            .join(",");
        query.insert("sort".to_string(), sort);
    } else if let Some(default_sort) = &resource.default_sort {
        query.insert("sort".to_string(), default_sort.clone());
    }

    query.into_iter().collect()
}

/// Query-placed attributes of a create or update; lists are comma-joined
fn param_query(binding: &Binding) -> Vec<(String, String)> {
    binding
        .params
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

fn document(resource: &ResourceDef, id: Option<&str>, binding: &Binding) -> Value {
    let mut data = Map::new();
    data.insert("type".to_string(), Value::String(resource.type_name.clone()));
    if let Some(id) = id {
        data.insert("id".to_string(), Value::String(id.to_string()));
    }

    let attributes: Map<String, Value> = binding
        .attributes
        .iter()
        .filter(|(k, _)| !binding.cleared.contains(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    data.insert("attributes".to_string(), Value::Object(attributes));

    if !binding.relationships.is_empty() {
        let relationships: Map<String, Value> = binding
            .relationships
            .iter()
            .map(|(k, v)| (k.clone(), relationship_value(v)))
            .collect();
        data.insert("relationships".to_string(), Value::Object(relationships));
    }

    json!({ "data": data })
}

fn identifier(r: &ResourceRef) -> Value {
    json!({ "type": r.type_name, "id": r.id })
}

fn relationship_value(value: &RelationshipValue) -> Value {
    match value {
        RelationshipValue::One(r) => json!({ "data": identifier(r) }),
        RelationshipValue::Many(refs) => {
            json!({ "data": refs.iter().map(identifier).collect::<Vec<_>>() })
        }
        RelationshipValue::Null => json!({ "data": null }),
    }
}
