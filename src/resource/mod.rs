//! Resource abstraction layer
//!
//! This module provides a data-driven approach to XBE resources. Resource
//! definitions are loaded from JSON files at compile time, so new resources
//! are added without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and validates resource definitions from embedded JSON
//! - [`binder`] - Binds command-line flags to typed attribute, relationship and filter values
//! - [`compiler`] - Builds JSON:API requests from bound values
//! - [`gate`] - Confirmation check for destructive actions
//! - [`normalizer`] - Flattens JSON:API responses into records
//! - [`dispatch`] - Runs an invocation through the whole pipeline
//!
//! # Example
//!
//! ```ignore
//! use xbe::resource::{Action, Dispatcher, Invocation, Verb};
//!
//! async fn list_brokers(dispatcher: &Dispatcher<'_>) -> Result<(), xbe::error::CliError> {
//!     let invocation = Invocation::new(Verb::View, "brokers", Action::List, ["--limit", "10"]);
//!     let outcome = dispatcher.execute(&invocation).await?;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod compiler;
pub mod dispatch;
pub mod gate;
pub mod normalizer;
mod registry;

pub use binder::{
    bind, usage, Binding, BoundFilter, FilterSet, GlobalOptions, Invocation, Pagination,
    RelationshipValue, ResourceRef, SortKey, Verb,
};
pub use compiler::{compile, CompiledRequest, Method};
pub use dispatch::{Completion, Dispatcher, Outcome};
pub use gate::{guard, Gate};
pub use normalizer::{normalize, normalize_for, NormalizeError, Normalized, Record};
pub use registry::*;
