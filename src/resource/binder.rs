//! Flag Binder - turn raw command-line tokens into typed values
//!
//! Every resource gets its flag table generated from its schema: one flag
//! per attribute (plus `--no-<name>` for booleans), one per relationship
//! (plus `-type`/`-id` for polymorphic ones), the filter family on list,
//! and the reserved flags every command shares. Matching is exact on the
//! full flag name; unknown flags are rejected, never guessed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};

use super::registry::{
    Action, AttributeDef, AttributeKind, Cardinality, FilterDef, FilterKind, FilterOperator,
    Placement, RelationshipDef, ResourceDef,
};
use crate::error::ValidationError;

/// Top-level command group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Mutating commands: create, update, delete
    Do,
    /// Read-only commands: list, show
    View,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Do => "do",
            Verb::View => "view",
        }
    }

    pub fn permits(self, action: Action) -> bool {
        match self {
            Verb::Do => action.is_mutation(),
            Verb::View => !action.is_mutation(),
        }
    }

    /// The verb an action lives under
    pub fn for_action(action: Action) -> Self {
        if action.is_mutation() {
            Verb::Do
        } else {
            Verb::View
        }
    }
}

/// One parsed command line: `xbe <verb> <resource> <action> [id] [--flags]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub verb: Verb,
    pub resource: String,
    pub action: Action,
    pub id: Option<String>,
    pub args: Vec<String>,
}

impl Invocation {
    /// Build an invocation, taking a leading positional id for show/update/delete
    pub fn new<I>(verb: Verb, resource: impl Into<String>, action: Action, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut args: Vec<String> = args.into_iter().map(Into::into).collect();
        let id = if action.takes_id() && args.first().is_some_and(|a| !a.starts_with("--")) {
            Some(args.remove(0))
        } else {
            None
        };

        Self {
            verb,
            resource: resource.into(),
            action,
            id,
            args,
        }
    }
}

/// Flags every command understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reserved {
    Json,
    OmitNull,
    BaseUrl,
    Token,
    NoAuth,
    Confirm,
    Limit,
    Offset,
    Sort,
    Help,
}

impl Reserved {
    fn for_action(action: Action) -> &'static [Reserved] {
        use Reserved::*;
        match action {
            Action::List => &[Json, OmitNull, BaseUrl, Token, NoAuth, Limit, Offset, Sort, Help],
            Action::Show => &[Json, OmitNull, BaseUrl, Token, NoAuth, Help],
            Action::Create | Action::Update => &[Json, OmitNull, BaseUrl, Token, Help],
            Action::Delete => &[Json, BaseUrl, Token, Confirm, Help],
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Reserved::Json => "json",
            Reserved::OmitNull => "omit-null",
            Reserved::BaseUrl => "base-url",
            Reserved::Token => "token",
            Reserved::NoAuth => "no-auth",
            Reserved::Confirm => "confirm",
            Reserved::Limit => "limit",
            Reserved::Offset => "offset",
            Reserved::Sort => "sort",
            Reserved::Help => "help",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Reserved::Json => "print JSON instead of a table",
            Reserved::OmitNull => "drop null fields from JSON output",
            Reserved::BaseUrl => "API base URL",
            Reserved::Token => "API token (overrides environment and stored tokens)",
            Reserved::NoAuth => "send the request without a token",
            Reserved::Confirm => "confirm the deletion",
            Reserved::Limit => "page size",
            Reserved::Offset => "page offset",
            Reserved::Sort => "sort fields, '-' prefix for descending",
            Reserved::Help => "show this help",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FlagTarget<'a> {
    Attribute(&'a AttributeDef),
    NegatedAttribute(&'a AttributeDef),
    Relationship(&'a RelationshipDef),
    RelationshipType(&'a RelationshipDef),
    RelationshipId(&'a RelationshipDef),
    Filter(&'a FilterDef, FilterOperator),
    NegatedFilter(&'a FilterDef),
    FilterType(&'a FilterDef),
    FilterId(&'a FilterDef),
    Reserved(Reserved),
}

impl FlagTarget<'_> {
    /// Switches take an optional `true`/`false` value
    fn is_switch(&self) -> bool {
        match self {
            FlagTarget::Attribute(attr) => attr.kind.is_switch(),
            FlagTarget::NegatedAttribute(_) | FlagTarget::NegatedFilter(_) => true,
            FlagTarget::Filter(filter, FilterOperator::Equals) => {
                filter.kind == FilterKind::Boolean || filter.constant.is_some()
            }
            FlagTarget::Filter(_, FilterOperator::Presence) => true,
            FlagTarget::Reserved(r) => matches!(
                r,
                Reserved::Json | Reserved::OmitNull | Reserved::NoAuth | Reserved::Confirm | Reserved::Help
            ),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            FlagTarget::Attribute(attr) => attr.kind.describe(),
            FlagTarget::NegatedAttribute(attr) => format!("set {} to false", attr.name),
            FlagTarget::Relationship(rel) => match (rel.cardinality, rel.fixed_target()) {
                (Cardinality::ToMany, _) => format!(
                    "comma-separated {} ids, empty to clear",
                    rel.targets.join("/")
                ),
                (_, Some(target)) => format!("{target} id"),
                (_, None) => format!("Type|id, one of {}", rel.targets.join(", ")),
            },
            FlagTarget::RelationshipType(rel) => {
                format!("type of {} ({})", rel.name, rel.targets.join(", "))
            }
            FlagTarget::RelationshipId(rel) => format!("id of {}", rel.name),
            FlagTarget::Filter(filter, op) => match op {
                FilterOperator::Equals if filter.constant.is_some() => format!(
                    "add {} to the {} filter",
                    filter.constant.as_deref().unwrap_or_default(),
                    filter.wire_name()
                ),
                FilterOperator::Equals if filter.kind == FilterKind::Polymorphic => {
                    format!("filter by {} (Type|id)", filter.name)
                }
                FilterOperator::Equals => format!("filter by {}", filter.name),
                FilterOperator::Min => format!("minimum {}", filter.name),
                FilterOperator::Max => format!("maximum {}", filter.name),
                FilterOperator::Presence => format!("whether {} is set", filter.name),
                FilterOperator::In => format!("comma-separated {} values", filter.name),
            },
            FlagTarget::NegatedFilter(filter) => format!("filter by {}=false", filter.name),
            FlagTarget::FilterType(filter) => format!("type for the {} filter", filter.name),
            FlagTarget::FilterId(filter) => format!("id for the {} filter", filter.name),
            FlagTarget::Reserved(r) => r.describe().to_string(),
        }
    }
}

/// Flag namespace of one resource action
#[derive(Debug)]
pub(crate) struct FlagTable<'a> {
    flags: BTreeMap<String, FlagTarget<'a>>,
}

impl<'a> FlagTable<'a> {
    /// Generate the flag table; on a name collision returns the flag
    pub(crate) fn build(resource: &'a ResourceDef, action: Action) -> Result<Self, String> {
        let mut table = Self {
            flags: BTreeMap::new(),
        };

        for &reserved in Reserved::for_action(action) {
            table.claim(reserved.flag().to_string(), FlagTarget::Reserved(reserved))?;
        }

        match action {
            Action::Create | Action::Update => {
                for attr in resource.attributes_for(action) {
                    table.claim(attr.name.clone(), FlagTarget::Attribute(attr))?;
                    if attr.kind == AttributeKind::Boolean {
                        table.claim(format!("no-{}", attr.name), FlagTarget::NegatedAttribute(attr))?;
                    }
                }
                for rel in resource.relationships_for(action) {
                    table.claim(rel.name.clone(), FlagTarget::Relationship(rel))?;
                    if rel.is_polymorphic() {
                        table.claim(format!("{}-type", rel.name), FlagTarget::RelationshipType(rel))?;
                        table.claim(format!("{}-id", rel.name), FlagTarget::RelationshipId(rel))?;
                    }
                }
            }
            Action::List => {
                for filter in &resource.filters {
                    table.claim_filter(filter)?;
                }
            }
            Action::Show | Action::Delete => {}
        }

        Ok(table)
    }

    fn claim_filter(&mut self, filter: &'a FilterDef) -> Result<(), String> {
        let polymorphic = filter.kind == FilterKind::Polymorphic;
        let equals = filter.supports(FilterOperator::Equals);
        let set = filter.supports(FilterOperator::In);

        if (equals || set || polymorphic) && (!polymorphic || filter.combined) {
            let op = if set && !equals {
                FilterOperator::In
            } else {
                FilterOperator::Equals
            };
            self.claim(filter.name.clone(), FlagTarget::Filter(filter, op))?;
        }
        if filter.supports(FilterOperator::Min) {
            self.claim(
                format!("{}-min", filter.name),
                FlagTarget::Filter(filter, FilterOperator::Min),
            )?;
        }
        if filter.supports(FilterOperator::Max) {
            self.claim(
                format!("{}-max", filter.name),
                FlagTarget::Filter(filter, FilterOperator::Max),
            )?;
        }
        if filter.supports(FilterOperator::Presence) {
            self.claim(
                filter.presence_flag(),
                FlagTarget::Filter(filter, FilterOperator::Presence),
            )?;
        }
        if polymorphic {
            self.claim(format!("{}-type", filter.name), FlagTarget::FilterType(filter))?;
            self.claim(format!("{}-id", filter.name), FlagTarget::FilterId(filter))?;
        }
        if filter.kind == FilterKind::Boolean && filter.operators == [FilterOperator::Equals] {
            self.claim(format!("no-{}", filter.name), FlagTarget::NegatedFilter(filter))?;
        }
        Ok(())
    }

    fn claim(&mut self, flag: String, target: FlagTarget<'a>) -> Result<(), String> {
        if self.flags.contains_key(&flag) {
            return Err(flag);
        }
        self.flags.insert(flag, target);
        Ok(())
    }

    fn get(&self, flag: &str) -> Option<FlagTarget<'a>> {
        self.flags.get(flag).copied()
    }

    /// Whether `field` names an attribute or relationship flag
    pub(crate) fn declares_field(&self, field: &str) -> bool {
        matches!(
            self.flags.get(field),
            Some(FlagTarget::Attribute(_) | FlagTarget::Relationship(_))
        )
    }
}

/// Reference to another resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub type_name: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

/// Bound relationship value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipValue {
    One(ResourceRef),
    Many(Vec<ResourceRef>),
    /// Clears a to-one relationship
    Null,
}

/// Attribute values keyed by wire name
pub type AttributeSet = BTreeMap<String, Value>;

/// Relationship values keyed by wire name
pub type RelationshipSet = BTreeMap<String, RelationshipValue>;

/// One list filter ready for query compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundFilter {
    pub wire: String,
    pub operator: FilterOperator,
    pub presence_prefix: String,
    /// Normalized value: `true`/`false`, joined set members, or `Type|id`
    pub value: String,
    /// Query key overriding the `filter[...]` form
    pub param: Option<String>,
}

/// Filters keyed by wire name and operator; a later flag replaces an earlier one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    terms: BTreeMap<(String, FilterOperator), BoundFilter>,
}

impl FilterSet {
    pub fn insert(&mut self, filter: BoundFilter) {
        self.terms
            .insert((filter.wire.clone(), filter.operator), filter);
    }

    pub fn get(&self, wire: &str, operator: FilterOperator) -> Option<&BoundFilter> {
        self.terms.get(&(wire.to_string(), operator))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundFilter> {
        self.terms.values()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn to_param(&self) -> String {
        if self.descending {
            format!("-{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

/// Command-level options from the reserved flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub json: bool,
    pub omit_null: bool,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub no_auth: bool,
    pub confirm: bool,
    pub help: bool,
}

/// Everything the binder extracted from an invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    pub id: Option<String>,
    pub attributes: AttributeSet,
    /// Attribute values sent as query parameters
    pub params: AttributeSet,
    /// Body attributes dropped by a clearing switch
    pub cleared: BTreeSet<String>,
    pub relationships: RelationshipSet,
    pub filters: FilterSet,
    pub pagination: Pagination,
    pub sort: Vec<SortKey>,
    pub options: GlobalOptions,
}

/// Half-built `Type|id` value from the discrete `-type`/`-id` flags
#[derive(Debug, Default)]
struct PolyParts {
    type_name: Option<String>,
    id: Option<String>,
}

struct BindState<'a> {
    action: Action,
    binding: Binding,
    supplied: BTreeSet<&'a str>,
    relationship_parts: BTreeMap<&'a str, (&'a RelationshipDef, PolyParts)>,
    filter_parts: BTreeMap<&'a str, (&'a FilterDef, PolyParts)>,
}

/// Bind an invocation's flags against a resource schema.
///
/// Fails without side effects on unknown flags, malformed values, missing
/// required fields on create and empty updates.
pub fn bind(invocation: &Invocation, resource: &ResourceDef) -> Result<Binding, ValidationError> {
    let action = invocation.action;
    let table = FlagTable::build(resource, action).map_err(ValidationError::AmbiguousFlag)?;

    let mut state = BindState {
        action,
        binding: Binding {
            id: invocation.id.clone(),
            ..Binding::default()
        },
        supplied: BTreeSet::new(),
        relationship_parts: BTreeMap::new(),
        filter_parts: BTreeMap::new(),
    };

    let mut tokens = invocation.args.iter().peekable();
    while let Some(token) = tokens.next() {
        let Some(raw) = token.strip_prefix("--") else {
            return Err(ValidationError::UnexpectedArgument(token.clone()));
        };
        let (flag, inline) = match raw.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (raw, None),
        };

        let target = table
            .get(flag)
            .ok_or_else(|| ValidationError::UnknownFlag {
                flag: flag.to_string(),
                resource: invocation.resource.clone(),
                action,
            })?;

        let value = if target.is_switch() {
            match inline {
                Some(value) => Some(value),
                None => match tokens.peek() {
                    Some(next) if parse_bool(next).is_some() => tokens.next().cloned(),
                    _ => None,
                },
            }
        } else {
            match inline {
                Some(value) => Some(value),
                None => match tokens.peek() {
                    Some(next) if !next.starts_with("--") => tokens.next().cloned(),
                    _ => return Err(ValidationError::MissingValue(flag.to_string())),
                },
            }
        };

        state.apply(flag, target, value)?;
    }

    state.finish(resource)
}

impl<'a> BindState<'a> {
    fn apply(
        &mut self,
        flag: &str,
        target: FlagTarget<'a>,
        value: Option<String>,
    ) -> Result<(), ValidationError> {
        match target {
            FlagTarget::Attribute(attr) => self.bind_attribute(flag, attr, value)?,
            FlagTarget::NegatedAttribute(attr) => {
                let negated = Value::Bool(!switch_value(flag, value)?);
                self.store_attribute(attr, negated);
            }
            FlagTarget::Relationship(rel) => {
                self.supplied.insert(&rel.name);
                self.bind_relationship(rel, value.unwrap_or_default().trim())?;
            }
            FlagTarget::RelationshipType(rel) => {
                self.supplied.insert(&rel.name);
                let parts = self.relationship_entry(rel);
                parts.type_name = Some(value.unwrap_or_default().trim().to_string());
            }
            FlagTarget::RelationshipId(rel) => {
                self.supplied.insert(&rel.name);
                let parts = self.relationship_entry(rel);
                parts.id = Some(value.unwrap_or_default().trim().to_string());
            }
            FlagTarget::Filter(filter, op) => self.bind_filter(flag, filter, op, value)?,
            FlagTarget::NegatedFilter(filter) => {
                let negated = !switch_value(flag, value)?;
                self.push_filter(filter, FilterOperator::Equals, negated.to_string());
            }
            FlagTarget::FilterType(filter) => {
                let parts = self.filter_entry(filter);
                parts.type_name = Some(value.unwrap_or_default().trim().to_string());
            }
            FlagTarget::FilterId(filter) => {
                let parts = self.filter_entry(filter);
                parts.id = Some(value.unwrap_or_default().trim().to_string());
            }
            FlagTarget::Reserved(reserved) => self.bind_reserved(flag, reserved, value)?,
        }
        Ok(())
    }

    fn bind_attribute(
        &mut self,
        flag: &str,
        attr: &'a AttributeDef,
        value: Option<String>,
    ) -> Result<(), ValidationError> {
        let coerced = match &attr.kind {
            AttributeKind::Boolean => Value::Bool(switch_value(flag, value)?),
            AttributeKind::Feature(feature) => {
                if !switch_value(flag, value)? {
                    return Ok(());
                }
                Value::Array(vec![Value::String(feature.clone())])
            }
            kind => coerce_attribute(flag, kind, &value.unwrap_or_default())?,
        };
        self.store_attribute(attr, coerced);
        Ok(())
    }

    fn store_attribute(&mut self, attr: &'a AttributeDef, value: Value) {
        // blank values do not satisfy a required attribute
        if is_blank(&value) {
            self.supplied.remove(attr.name.as_str());
        } else {
            self.supplied.insert(&attr.name);
        }

        let wire = attr.wire_name().to_string();
        let accumulate = attr.kind.accumulates();
        match attr.placement {
            Placement::Body => store(&mut self.binding.attributes, wire, attr.key(), value, accumulate),
            Placement::Query => store(&mut self.binding.params, wire, attr.key(), value, accumulate),
            Placement::Local => {}
            Placement::Clear => {
                if value == Value::Bool(true) {
                    self.binding.cleared.insert(wire);
                } else {
                    self.binding.cleared.remove(&wire);
                }
            }
        }
    }

    fn bind_relationship(&mut self, rel: &'a RelationshipDef, raw: &str) -> Result<(), ValidationError> {
        let wire = rel.wire_name().to_string();

        if rel.cardinality == Cardinality::ToMany {
            let target = rel.targets.first().map(String::as_str).unwrap_or_default();
            let refs: Vec<ResourceRef> = split_list(raw)
                .map(|id| ResourceRef::new(target, id))
                .collect();
            if refs.is_empty() && self.action == Action::Create {
                return Err(ValidationError::EmptyRelationship(rel.name.clone()));
            }
            self.binding
                .relationships
                .insert(wire, RelationshipValue::Many(refs));
            return Ok(());
        }

        if raw.is_empty() {
            if self.action == Action::Create {
                return Err(ValidationError::EmptyRelationship(rel.name.clone()));
            }
            self.relationship_parts.remove(rel.name.as_str());
            self.binding
                .relationships
                .insert(wire, RelationshipValue::Null);
            return Ok(());
        }

        let fixed = rel.fixed_target().map(str::to_string);
        let parts = self.relationship_entry(rel);
        match raw.split_once('|') {
            Some((type_name, id)) => {
                parts.type_name = Some(type_name.trim().to_string());
                parts.id = Some(id.trim().to_string());
            }
            None => {
                if fixed.is_some() {
                    parts.type_name = fixed;
                }
                parts.id = Some(raw.to_string());
            }
        }
        Ok(())
    }

    fn bind_filter(
        &mut self,
        flag: &str,
        filter: &'a FilterDef,
        op: FilterOperator,
        value: Option<String>,
    ) -> Result<(), ValidationError> {
        let normalized = match op {
            FilterOperator::Equals if filter.constant.is_some() => {
                if !switch_value(flag, value)? {
                    return Ok(());
                }
                let member = filter.constant.clone().unwrap_or_default();
                match self.binding.filters.get(filter.wire_name(), op) {
                    Some(existing) if existing.value.split(',').any(|m| m == member) => {
                        existing.value.clone()
                    }
                    Some(existing) => format!("{},{member}", existing.value),
                    None => member,
                }
            }
            FilterOperator::Presence => switch_value(flag, value)?.to_string(),
            FilterOperator::Equals if filter.kind == FilterKind::Boolean => {
                switch_value(flag, value)?.to_string()
            }
            FilterOperator::Equals if filter.kind == FilterKind::Polymorphic => {
                let raw = value.unwrap_or_default();
                let parts = self.filter_entry(filter);
                match raw.trim().split_once('|') {
                    Some((type_name, id)) => {
                        parts.type_name = Some(type_name.trim().to_string());
                        parts.id = Some(id.trim().to_string());
                    }
                    None => {
                        if let Some(default_type) = &filter.default_type {
                            parts.type_name = Some(default_type.clone());
                        }
                        parts.id = Some(raw.trim().to_string());
                    }
                }
                return Ok(());
            }
            FilterOperator::In => {
                let raw = value.unwrap_or_default();
                // date ranges are written `start|end`
                let ranged = matches!(filter.kind, FilterKind::Date | FilterKind::Datetime);
                let list = if ranged { raw.replace('|', ",") } else { raw.clone() };
                let members: Vec<&str> = split_list(&list).collect();
                if members.is_empty() {
                    return Err(invalid(flag, &raw, "one or more comma-separated values"));
                }
                if ranged {
                    for member in &members {
                        coerce_filter(flag, filter.kind, member)?;
                    }
                }
                members.join(",")
            }
            _ => {
                let coerced = coerce_filter(flag, filter.kind, value.unwrap_or_default().trim())?;
                match &filter.default_type {
                    Some(default_type) if !coerced.contains('|') => format!("{default_type}|{coerced}"),
                    _ => coerced,
                }
            }
        };

        self.push_filter(filter, op, normalized);
        Ok(())
    }

    fn push_filter(&mut self, filter: &FilterDef, operator: FilterOperator, value: String) {
        self.push_filter_at(filter.wire_name(), filter, operator, value);
    }

    fn push_filter_at(&mut self, wire: &str, filter: &FilterDef, operator: FilterOperator, value: String) {
        self.binding.filters.insert(BoundFilter {
            wire: wire.to_string(),
            operator,
            presence_prefix: filter.presence_prefix().to_string(),
            value,
            param: filter.param.clone(),
        });
    }

    fn bind_reserved(
        &mut self,
        flag: &str,
        reserved: Reserved,
        value: Option<String>,
    ) -> Result<(), ValidationError> {
        let options = &mut self.binding.options;
        match reserved {
            Reserved::Json => options.json = switch_value(flag, value)?,
            Reserved::OmitNull => options.omit_null = switch_value(flag, value)?,
            Reserved::NoAuth => options.no_auth = switch_value(flag, value)?,
            Reserved::Confirm => options.confirm = switch_value(flag, value)?,
            Reserved::Help => options.help = switch_value(flag, value)?,
            Reserved::BaseUrl => options.base_url = value.filter(|v| !v.trim().is_empty()),
            Reserved::Token => options.token = value.filter(|v| !v.trim().is_empty()),
            Reserved::Limit => {
                self.binding.pagination.limit = parse_page(flag, &value.unwrap_or_default())?
            }
            Reserved::Offset => {
                self.binding.pagination.offset = parse_page(flag, &value.unwrap_or_default())?
            }
            Reserved::Sort => self.binding.sort = parse_sort(flag, &value.unwrap_or_default())?,
        }
        Ok(())
    }

    fn relationship_entry(&mut self, rel: &'a RelationshipDef) -> &mut PolyParts {
        &mut self
            .relationship_parts
            .entry(rel.name.as_str())
            .or_insert_with(|| (rel, PolyParts::default()))
            .1
    }

    fn filter_entry(&mut self, filter: &'a FilterDef) -> &mut PolyParts {
        &mut self
            .filter_parts
            .entry(filter.name.as_str())
            .or_insert_with(|| (filter, PolyParts::default()))
            .1
    }

    fn finish(mut self, resource: &ResourceDef) -> Result<Binding, ValidationError> {
        for (name, (rel, parts)) in std::mem::take(&mut self.relationship_parts) {
            let (type_name, id) = complete(name, parts)?;
            let type_name = relationship_type(rel, &type_name);
            if !rel.accepts_target(&type_name) {
                return Err(ValidationError::InvalidRelationshipType {
                    flag: name.to_string(),
                    type_name,
                    allowed: rel.targets.join(", "),
                });
            }
            self.binding.relationships.insert(
                rel.wire_name().to_string(),
                RelationshipValue::One(ResourceRef::new(type_name, id)),
            );
        }

        for (name, (filter, parts)) in std::mem::take(&mut self.filter_parts) {
            let type_name = parts
                .type_name
                .filter(|t| !t.is_empty())
                .map(|t| filter_type(&t));
            let id = parts.id.filter(|id| !id.is_empty());
            match (type_name, id) {
                (Some(type_name), Some(id)) => self.push_filter_at(
                    filter.pair_wire(),
                    filter,
                    FilterOperator::Equals,
                    format!("{type_name}|{id}"),
                ),
                (Some(type_name), None) => match filter.type_wire() {
                    Some(wire) => self.push_filter_at(wire, filter, FilterOperator::Equals, type_name),
                    None => return Err(ValidationError::IncompleteRelationship(name.to_string())),
                },
                _ => return Err(ValidationError::IncompleteRelationship(name.to_string())),
            }
        }

        // help never reaches the network, so it skips the completeness checks
        if self.binding.options.help {
            return Ok(self.binding);
        }

        if self.action.takes_id() && self.binding.id.is_none() {
            return Err(ValidationError::MissingId(self.action));
        }

        match self.action {
            Action::Create => {
                let missing: Vec<String> = resource
                    .required_for(Action::Create)
                    .iter()
                    .filter(|field| !self.supplied.contains(field.as_str()))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(ValidationError::MissingRequired(missing));
                }
            }
            Action::Update => {
                let binding = &self.binding;
                if binding.attributes.is_empty()
                    && binding.params.is_empty()
                    && binding.cleared.is_empty()
                    && binding.relationships.is_empty()
                {
                    return Err(ValidationError::NoUpdateFields);
                }
            }
            _ => {}
        }

        Ok(self.binding)
    }
}

fn complete(name: &str, parts: PolyParts) -> Result<(String, String), ValidationError> {
    match (parts.type_name, parts.id) {
        (Some(type_name), Some(id)) if !type_name.is_empty() && !id.is_empty() => Ok((type_name, id)),
        _ => Err(ValidationError::IncompleteRelationship(name.to_string())),
    }
}

/// Whether a bound value leaves a required field effectively unset
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Store a value at `wire` (or `wire.key`), combining with an earlier value
/// when the attribute accumulates
fn store(map: &mut AttributeSet, wire: String, key: Option<&str>, value: Value, accumulate: bool) {
    let combine = |existing: Option<Value>, value: Value| -> Value {
        match (existing, value) {
            (Some(Value::Array(mut items)), Value::Array(more)) if accumulate => {
                for item in more {
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
                Value::Array(items)
            }
            (Some(Value::Object(mut fields)), Value::Object(more)) if accumulate => {
                fields.extend(more);
                Value::Object(fields)
            }
            (_, value) => value,
        }
    };

    match key {
        None => {
            let existing = map.remove(&wire);
            map.insert(wire, combine(existing, value));
        }
        Some(key) => {
            let mut nested = match map.remove(&wire) {
                Some(Value::Object(fields)) => fields,
                _ => Map::new(),
            };
            let existing = nested.remove(key);
            nested.insert(key.to_string(), combine(existing, value));
            map.insert(wire, Value::Object(nested));
        }
    }
}

/// JSON:API type for a relationship value written as a class (`Broker`,
/// `MaterialSite`) or as a type (`brokers`)
fn relationship_type(rel: &RelationshipDef, raw: &str) -> String {
    let kebab = kebab_case(raw);
    if rel.targets.iter().any(|t| *t == kebab) {
        return kebab;
    }
    pluralize(&kebab)
}

/// Class-style type for polymorphic filter values: `material-sites` -> `MaterialSite`
pub(crate) fn filter_type(raw: &str) -> String {
    if raw.chars().any(|c| c.is_ascii_uppercase()) {
        return raw.to_string();
    }
    let words: Vec<&str> = raw.split(['-', '_']).filter(|w| !w.is_empty()).collect();
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let word = if i + 1 == words.len() {
                singularize(word)
            } else {
                word.to_string()
            };
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn kebab_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut after_word_char = false;
    for c in raw.trim().chars() {
        if c == '_' || c == ' ' {
            out.push('-');
            after_word_char = false;
        } else if c.is_ascii_uppercase() {
            if after_word_char {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            after_word_char = false;
        } else {
            out.push(c);
            after_word_char = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s') || word.ends_with("equipment") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if ["ch", "sh", "x", "z"].iter().any(|suffix| word.ends_with(suffix)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies").filter(|stem| !stem.is_empty()) {
        return format!("{stem}y");
    }
    if ["ses", "xes", "zes", "ches", "shes"].iter().any(|suffix| word.ends_with(suffix)) {
        return word[..word.len() - 2].to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Usage text for one resource action, generated from its flag table
pub fn usage(name: &str, resource: &ResourceDef, action: Action) -> String {
    let verb = Verb::for_action(action);
    let id = if action.takes_id() { " <id>" } else { "" };
    let mut out = format!(
        "Usage: xbe {} {} {}{} [flags]\n\nFlags:\n",
        verb.as_str(),
        name,
        action,
        id
    );

    let Ok(table) = FlagTable::build(resource, action) else {
        return out;
    };
    let required = resource.required_for(action);
    for (flag, target) in &table.flags {
        let marker = if required.iter().any(|r| r == flag) {
            " (required)"
        } else {
            ""
        };
        out.push_str(&format!("  --{:<36} {}{}\n", flag, target.describe(), marker));
    }
    out
}

/// Parse a boolean the way Go's `strconv.ParseBool` spells them
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn switch_value(flag: &str, value: Option<String>) -> Result<bool, ValidationError> {
    match value {
        None => Ok(true),
        Some(raw) => parse_bool(raw.trim()).ok_or_else(|| invalid(flag, &raw, "true or false")),
    }
}

fn invalid(flag: &str, value: &str, expected: &str) -> ValidationError {
    ValidationError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn is_date(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

fn is_datetime(raw: &str) -> bool {
    DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").is_ok()
        || is_date(raw)
}

fn coerce_attribute(flag: &str, kind: &AttributeKind, raw: &str) -> Result<Value, ValidationError> {
    let trimmed = raw.trim();

    // an empty value clears non-string attributes; an empty list is sent as []
    if trimmed.is_empty() && !matches!(kind, AttributeKind::String | AttributeKind::List) {
        return Ok(Value::Null);
    }

    match kind {
        AttributeKind::String => Ok(Value::String(raw.to_string())),
        AttributeKind::Boolean | AttributeKind::Feature(_) => parse_bool(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| invalid(flag, raw, "true or false")),
        AttributeKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(flag, raw, "an integer")),
        AttributeKind::Decimal => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid(flag, raw, "a decimal number")),
        AttributeKind::Date => {
            if is_date(trimmed) {
                Ok(Value::String(trimmed.to_string()))
            } else {
                Err(invalid(flag, raw, "a date (YYYY-MM-DD)"))
            }
        }
        AttributeKind::Datetime => {
            if is_datetime(trimmed) {
                Ok(Value::String(trimmed.to_string()))
            } else {
                Err(invalid(flag, raw, "an ISO 8601 datetime"))
            }
        }
        AttributeKind::Json => {
            serde_json::from_str(trimmed).map_err(|_| invalid(flag, raw, "valid JSON"))
        }
        AttributeKind::Enum(values) => {
            if values.iter().any(|v| v == trimmed) {
                Ok(Value::String(trimmed.to_string()))
            } else {
                Err(invalid(flag, raw, &format!("one of {}", values.join(", "))))
            }
        }
        AttributeKind::List => Ok(Value::Array(
            split_list(trimmed)
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        AttributeKind::Pairs => {
            let (key, value) = trimmed
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .ok_or_else(|| invalid(flag, raw, "key=value"))?;
            let mut pair = Map::new();
            pair.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
            Ok(Value::Object(pair))
        }
        AttributeKind::Object => match serde_json::from_str(trimmed) {
            Ok(Value::Object(fields)) => Ok(Value::Object(fields)),
            _ => Err(invalid(flag, raw, "a JSON object")),
        },
    }
}

fn coerce_filter(flag: &str, kind: FilterKind, raw: &str) -> Result<String, ValidationError> {
    let valid = match kind {
        FilterKind::Integer => raw.parse::<i64>().is_ok(),
        FilterKind::Date => is_date(raw),
        FilterKind::Datetime => is_datetime(raw),
        FilterKind::Boolean => parse_bool(raw).is_some(),
        FilterKind::String | FilterKind::Polymorphic => !raw.is_empty(),
    };
    if !valid {
        let expected = match kind {
            FilterKind::Integer => "an integer",
            FilterKind::Date => "a date (YYYY-MM-DD)",
            FilterKind::Datetime => "an ISO 8601 datetime",
            FilterKind::Boolean => "true or false",
            FilterKind::String | FilterKind::Polymorphic => "a non-empty value",
        };
        return Err(invalid(flag, raw, expected));
    }

    Ok(match kind {
        FilterKind::Boolean => parse_bool(raw).unwrap_or_default().to_string(),
        _ => raw.to_string(),
    })
}

fn parse_page(flag: &str, raw: &str) -> Result<Option<u32>, ValidationError> {
    let n = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| invalid(flag, raw, "a non-negative integer"))?;
    Ok((n > 0).then_some(n))
}

fn parse_sort(flag: &str, raw: &str) -> Result<Vec<SortKey>, ValidationError> {
    split_list(raw)
        .map(|field| {
            let (descending, name) = match field.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, field),
            };
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(invalid(flag, raw, "comma-separated field names"));
            }
            Ok(SortKey {
                field: name.to_string(),
                descending,
            })
        })
        .collect()
}
