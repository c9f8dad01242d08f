//! Command Dispatch
//!
//! Runs one invocation through the pipeline: lookup, bind, gate, resolve
//! credentials, compile, execute and normalize. Every local check happens
//! before the transport is touched.

use serde_json::Value;

use super::binder::{bind, usage, Invocation, Verb};
use super::compiler::compile;
use super::gate::{guard, Gate};
use super::normalizer::{normalize_for, Normalized, Record};
use super::registry::{Action, Registry};
use crate::api::{ApiClient, TokenResolver, Transport};
use crate::error::{CliError, ValidationError};

/// Result of a successful command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Record(Record),
    Records(Vec<Record>),
    /// Generated usage text for `--help`
    Help(String),
}

/// Outcome plus the output preferences bound from `--json` and `--omit-null`
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub outcome: Outcome,
    pub json: bool,
    pub omit_null: bool,
}

/// Pipeline entry point, holding everything a command needs besides its arguments
pub struct Dispatcher<'a> {
    registry: &'a Registry,
    resolver: &'a TokenResolver,
    transport: &'a dyn Transport,
    default_base_url: String,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        registry: &'a Registry,
        resolver: &'a TokenResolver,
        transport: &'a dyn Transport,
        default_base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            resolver,
            transport,
            default_base_url: default_base_url.into(),
        }
    }

    /// Execute an invocation
    pub async fn execute(&self, invocation: &Invocation) -> Result<Completion, CliError> {
        let action = invocation.action;
        tracing::info!(
            "execute: verb={}, resource={}, action={}",
            invocation.verb.as_str(),
            invocation.resource,
            action
        );

        if !invocation.verb.permits(action) {
            return Err(ValidationError::VerbMismatch {
                verb: invocation.verb.as_str(),
                expected: Verb::for_action(action).as_str(),
                action,
            }
            .into());
        }

        let resource = self.registry.lookup(&invocation.resource, action)?;
        let binding = bind(invocation, resource)?;
        let json = binding.options.json;
        let omit_null = binding.options.omit_null;
        let complete = |outcome| Completion {
            outcome,
            json,
            omit_null,
        };

        if binding.options.help {
            return Ok(complete(Outcome::Help(usage(
                &invocation.resource,
                resource,
                action,
            ))));
        }

        if guard(action, binding.options.confirm) == Gate::Deny {
            return Err(ValidationError::ConfirmationRequired {
                resource: invocation.resource.clone(),
                id: binding.id.clone().unwrap_or_default(),
            }
            .into());
        }

        let base_url = binding
            .options
            .base_url
            .clone()
            .unwrap_or_else(|| self.default_base_url.clone());
        validate_base_url(&base_url)?;

        let credential = if binding.options.no_auth {
            None
        } else {
            Some(
                self.resolver
                    .resolve(&base_url, binding.options.token.as_deref())?,
            )
        };

        let request = compile(resource, action, &binding);
        let client = ApiClient::new(&base_url, credential, self.transport);
        let document = client.execute(&request).await?;

        if action == Action::Delete {
            return Ok(complete(Outcome::Record(deleted_record(
                binding.id.as_deref().unwrap_or_default(),
            ))));
        }

        let document =
            document.ok_or_else(|| CliError::Transport("unexpected empty response body".into()))?;

        match normalize_for(&document, resource)? {
            Normalized::One(record) => Ok(complete(Outcome::Record(record))),
            Normalized::Many(mut records) => {
                if let Some(limit) = binding.pagination.limit {
                    records.truncate(limit as usize);
                }
                Ok(complete(Outcome::Records(records)))
            }
        }
    }
}

fn deleted_record(id: &str) -> Record {
    let mut record = Record::new();
    record.insert("id".to_string(), Value::String(id.to_string()));
    record.insert("deleted".to_string(), Value::Bool(true));
    record
}

fn validate_base_url(raw: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = url::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        "http" | "https" => Err(invalid("missing host")),
        _ => Err(invalid("scheme must be http or https")),
    }
}
