//! Resource Registry - Load resource schemas from JSON
//!
//! Every resource the CLI can act on is described declaratively in the
//! embedded `src/resources/*.json` files: its wire type, collection path,
//! supported actions, attributes, relationships, list filters and the
//! fields each action requires. The registry is parsed and validated once
//! and is read-only afterwards.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::binder::FlagTable;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[(&str, &str)] = &[
    ("common.json", include_str!("../resources/common.json")),
    ("dispatch.json", include_str!("../resources/dispatch.json")),
    ("equipment.json", include_str!("../resources/equipment.json")),
    ("incidents.json", include_str!("../resources/incidents.json")),
    ("materials.json", include_str!("../resources/materials.json")),
    ("organizations.json", include_str!("../resources/organizations.json")),
    ("projects.json", include_str!("../resources/projects.json")),
    ("summaries.json", include_str!("../resources/summaries.json")),
];

/// Default filter prefix for presence filters (`--is-<name>`)
const DEFAULT_PRESENCE_PREFIX: &str = "is";

/// Action a command performs on a resource
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    List,
    Show,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Show => "show",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Whether the action addresses a single resource by id
    pub fn takes_id(self) -> bool {
        matches!(self, Action::Show | Action::Update | Action::Delete)
    }

    /// Whether the action changes server-side state
    pub fn is_mutation(self) -> bool {
        matches!(self, Action::Create | Action::Update | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type of an attribute
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeKind {
    String,
    Boolean,
    Integer,
    Decimal,
    Date,
    Datetime,
    Json,
    Enum(Vec<String>),
    /// Comma-separated values sent as a JSON array; repeats accumulate
    List,
    /// Repeatable `key=value`, merged into one JSON object
    Pairs,
    /// JSON object, merged with other values at the same wire key
    Object,
    /// Switch that adds its constant to the list at the wire key
    Feature(String),
}

impl AttributeKind {
    /// Short human description used in help and error messages
    pub fn describe(&self) -> String {
        match self {
            AttributeKind::String => "string".to_string(),
            AttributeKind::Boolean => "true/false".to_string(),
            AttributeKind::Integer => "integer".to_string(),
            AttributeKind::Decimal => "decimal".to_string(),
            AttributeKind::Date => "date (YYYY-MM-DD)".to_string(),
            AttributeKind::Datetime => "datetime (ISO 8601)".to_string(),
            AttributeKind::Json => "JSON".to_string(),
            AttributeKind::Enum(values) => format!("one of {}", values.join(", ")),
            AttributeKind::List => "comma-separated values (repeatable)".to_string(),
            AttributeKind::Pairs => "key=value (repeatable)".to_string(),
            AttributeKind::Object => "JSON object".to_string(),
            AttributeKind::Feature(feature) => format!("enable {feature}"),
        }
    }

    /// Whether repeated flags combine instead of replacing each other
    pub fn accumulates(&self) -> bool {
        matches!(
            self,
            AttributeKind::List | AttributeKind::Pairs | AttributeKind::Object | AttributeKind::Feature(_)
        )
    }

    /// Whether the flag is a switch taking an optional true/false value
    pub fn is_switch(&self) -> bool {
        matches!(self, AttributeKind::Boolean | AttributeKind::Feature(_))
    }
}

/// Where a bound attribute value ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    /// `data.attributes` of the request body
    #[default]
    Body,
    /// Query parameter named by the wire key; lists are comma-joined
    Query,
    /// Accepted and validated, never sent
    Local,
    /// Boolean switch that drops the body attribute at the wire key
    Clear,
}

/// Attribute definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDef {
    /// Flag name (`--<name>`)
    pub name: String,
    /// Attribute key in the JSON:API body, when it differs from the flag
    #[serde(default)]
    wire: Option<String>,
    pub kind: AttributeKind,
    /// Nests the value under this key of the object at the wire key
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    pub placement: Placement,
    /// Restricts the attribute to a subset of create/update
    #[serde(default)]
    on: Option<Vec<Action>>,
}

impl AttributeDef {
    pub fn wire_name(&self) -> &str {
        self.wire.as_deref().unwrap_or(&self.name)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn applies_to(&self, action: Action) -> bool {
        self.on.as_ref().is_none_or(|on| on.contains(&action))
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    #[default]
    ToOne,
    ToMany,
}

/// Ways a relationship value can be written on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputForm {
    /// `--subject brokers|5`
    TypedId,
    /// `--subject-type brokers --subject-id 5`
    DiscretePair,
    /// `--broker 5`
    BareId,
    /// `--job-types 1,2,3`
    IdList,
}

/// Relationship definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    #[serde(default)]
    wire: Option<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Resource types the relationship may point at
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    polymorphic: bool,
    #[serde(default)]
    on: Option<Vec<Action>>,
}

impl RelationshipDef {
    pub fn wire_name(&self) -> &str {
        self.wire.as_deref().unwrap_or(&self.name)
    }

    pub fn applies_to(&self, action: Action) -> bool {
        self.on.as_ref().is_none_or(|on| on.contains(&action))
    }

    pub fn is_polymorphic(&self) -> bool {
        self.cardinality == Cardinality::ToOne && (self.polymorphic || self.targets.len() > 1)
    }

    /// Target type when the schema fixes it
    pub fn fixed_target(&self) -> Option<&str> {
        if self.is_polymorphic() {
            None
        } else {
            self.targets.first().map(String::as_str)
        }
    }

    /// Whether `type_name` is an acceptable target for this relationship
    pub fn accepts_target(&self, type_name: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == type_name)
    }

    pub fn input_forms(&self) -> &'static [InputForm] {
        if self.cardinality == Cardinality::ToMany {
            &[InputForm::IdList]
        } else if self.is_polymorphic() {
            &[InputForm::TypedId, InputForm::DiscretePair]
        } else {
            &[InputForm::BareId, InputForm::TypedId]
        }
    }
}

/// Value type of a list filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    String,
    Boolean,
    Integer,
    Date,
    Datetime,
    /// `Type|id` pair
    Polymorphic,
}

/// How a filter value constrains the listed resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOperator {
    Equals,
    Min,
    Max,
    Presence,
    /// Set membership, comma-separated values
    In,
}

fn default_operators() -> Vec<FilterOperator> {
    vec![FilterOperator::Equals]
}

fn default_true() -> bool {
    true
}

/// Filter definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct FilterDef {
    pub name: String,
    #[serde(default)]
    wire: Option<String>,
    #[serde(default)]
    pub kind: FilterKind,
    #[serde(default = "default_operators")]
    pub operators: Vec<FilterOperator>,
    #[serde(default)]
    presence_prefix: Option<String>,
    /// Polymorphic filters: whether `--<name> Type|id` exists beside `-type`/`-id`
    #[serde(default = "default_true")]
    pub combined: bool,
    /// Polymorphic filters: wire for a complete `Type|id`, when not the filter wire
    #[serde(default)]
    pair_wire: Option<String>,
    /// Polymorphic filters: wire for a lone `-type`; without it a type needs an id
    #[serde(default)]
    type_wire: Option<String>,
    /// Type assumed for a bare id, sent as `Type|id`
    #[serde(default)]
    pub default_type: Option<String>,
    /// Makes the flag a switch adding this member to the filter's value
    #[serde(default)]
    pub constant: Option<String>,
    /// Full query key, for parameters outside the `filter[<wire>]` family
    #[serde(default)]
    pub param: Option<String>,
}

impl FilterDef {
    pub fn wire_name(&self) -> &str {
        self.wire.as_deref().unwrap_or(&self.name)
    }

    pub fn pair_wire(&self) -> &str {
        self.pair_wire.as_deref().unwrap_or_else(|| self.wire_name())
    }

    pub fn type_wire(&self) -> Option<&str> {
        self.type_wire.as_deref()
    }

    pub fn supports(&self, operator: FilterOperator) -> bool {
        self.operators.contains(&operator)
    }

    pub fn presence_prefix(&self) -> &str {
        self.presence_prefix
            .as_deref()
            .unwrap_or(DEFAULT_PRESENCE_PREFIX)
    }

    /// Flag for the presence form, e.g. `is-created-at`
    pub fn presence_flag(&self) -> String {
        format!("{}-{}", self.presence_prefix(), self.name)
    }
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    /// JSON:API type, e.g. `cost-indexes`
    #[serde(rename = "type")]
    pub type_name: String,
    /// Collection path, e.g. `/v1/cost-indexes`
    pub path: String,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    /// Flag names each action requires
    #[serde(default)]
    pub required: BTreeMap<Action, Vec<String>>,
    /// Sort sent on list when none is given
    #[serde(default)]
    pub default_sort: Option<String>,
}

impl ResourceDef {
    pub fn supports(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn required_for(&self, action: Action) -> &[String] {
        self.required.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn attributes_for(&self, action: Action) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter().filter(move |a| a.applies_to(action))
    }

    pub fn relationships_for(&self, action: Action) -> impl Iterator<Item = &RelationshipDef> {
        self.relationships
            .iter()
            .filter(move |r| r.applies_to(action))
    }

    pub fn relationship_by_wire(&self, wire: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.wire_name() == wire)
    }

    /// Path of a single resource: `<collection>/<id>`
    pub fn item_path(&self, id: &str) -> String {
        format!(
            "{}/{}",
            self.path.trim_end_matches('/'),
            urlencoding::encode(id)
        )
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
struct ResourceFile {
    #[serde(default)]
    resources: BTreeMap<String, ResourceDef>,
}

/// Errors raised while loading the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to parse resource file {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("resource '{0}' is defined more than once")]
    Duplicate(String),

    #[error("resource '{resource}' {action}: {reason}")]
    Invalid {
        resource: String,
        action: Action,
        reason: String,
    },
}

/// Lookup failures; unknown resources and unsupported actions stay distinct
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown resource \"{0}\"")]
    UnknownResource(String),

    #[error("{resource} does not support {action} (supported: {})", join_actions(.supported))]
    UnsupportedAction {
        resource: String,
        action: Action,
        supported: Vec<Action>,
    },
}

fn join_actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// All known resources, keyed by CLI name
#[derive(Debug, Clone)]
pub struct Registry {
    resources: BTreeMap<String, ResourceDef>,
}

impl Registry {
    /// Load the registry compiled into the binary
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_sources(RESOURCE_FILES)
    }

    /// Load and validate a registry from `(file name, JSON)` pairs
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self, RegistryError> {
        let mut resources = BTreeMap::new();

        for (file, content) in sources {
            let partial: ResourceFile =
                serde_json::from_str(content).map_err(|source| RegistryError::Parse {
                    file: file.to_string(),
                    source,
                })?;

            for (name, def) in partial.resources {
                if resources.contains_key(&name) {
                    return Err(RegistryError::Duplicate(name));
                }
                resources.insert(name, def);
            }
        }

        let registry = Self { resources };
        registry.validate()?;
        tracing::debug!("Loaded {} resource definitions", registry.resources.len());
        Ok(registry)
    }

    /// Find the schema for a resource and action
    pub fn lookup(&self, name: &str, action: Action) -> Result<&ResourceDef, LookupError> {
        let resource = self
            .resources
            .get(name)
            .ok_or_else(|| LookupError::UnknownResource(name.to_string()))?;

        if !resource.supports(action) {
            return Err(LookupError::UnsupportedAction {
                resource: name.to_string(),
                action,
                supported: resource.actions.clone(),
            });
        }

        Ok(resource)
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceDef)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        for (name, resource) in &self.resources {
            for &action in &resource.actions {
                let invalid = |reason: String| RegistryError::Invalid {
                    resource: name.clone(),
                    action,
                    reason,
                };

                if resource.path.is_empty() || !resource.path.starts_with('/') {
                    return Err(invalid(format!("bad collection path '{}'", resource.path)));
                }

                let table = FlagTable::build(resource, action)
                    .map_err(|flag| invalid(format!("flag --{flag} is declared more than once")))?;

                for field in resource.required_for(action) {
                    if !table.declares_field(field) {
                        return Err(invalid(format!("required field '{field}' is not declared")));
                    }
                }

                for attr in resource.attributes_for(action) {
                    if attr.placement == Placement::Clear && attr.kind != AttributeKind::Boolean {
                        return Err(invalid(format!(
                            "attribute '{}' clears a value and must be boolean",
                            attr.name
                        )));
                    }
                }

                for rel in resource.relationships_for(action) {
                    if rel.cardinality == Cardinality::ToMany && rel.targets.len() != 1 {
                        return Err(invalid(format!(
                            "to-many relationship '{}' needs exactly one target",
                            rel.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
