//! XBE API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - Token resolution per base URL
//! - [`client`] - Executes compiled requests and classifies failures
//! - [`http`] - Transport seam and the reqwest implementation

pub mod auth;
pub mod client;
pub mod http;

pub use auth::{normalize_base_url, AuthError, Credential, TokenResolver, TokenSource};
pub use client::ApiClient;
pub use http::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportError};
