//! XBE Authentication
//!
//! Resolves the API token for a base URL. Precedence: `--token`, then the
//! `XBE_TOKEN` and `XBE_API_TOKEN` environment variables, then the token
//! stored for that base URL.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::config::Config;

/// Environment variables checked for a token, in order
pub const TOKEN_ENV_VARS: &[&str] = &["XBE_TOKEN", "XBE_API_TOKEN"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication required for {base_url}. Run 'xbe auth login' first.")]
    Missing { base_url: String },
}

/// Where a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Flag,
    Environment,
    Store,
}

/// Token bound to the base URL it was resolved for
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    base_url: String,
    token: String,
    source: TokenSource,
}

impl Credential {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn source(&self) -> TokenSource {
        self.source
    }
}

// Security: never print the token itself
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Token lookup over the environment and the stored token map
#[derive(Clone, Default)]
pub struct TokenResolver {
    env_token: Option<String>,
    store: BTreeMap<String, String>,
}

impl TokenResolver {
    pub fn new(env_token: Option<String>, store: &BTreeMap<String, String>) -> Self {
        let store = store
            .iter()
            .filter(|(_, token)| !token.trim().is_empty())
            .map(|(url, token)| (normalize_base_url(url), token.trim().to_string()))
            .collect();

        Self {
            env_token: env_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            store,
        }
    }

    /// Resolver backed by the process environment and the config token store
    pub fn from_env(config: &Config) -> Self {
        let env_token = TOKEN_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty());
        Self::new(env_token, &config.tokens)
    }

    pub fn resolve(&self, base_url: &str, explicit: Option<&str>) -> Result<Credential, AuthError> {
        let base_url = normalize_base_url(base_url);
        let credential = |token: &str, source| Credential {
            base_url: base_url.clone(),
            token: token.to_string(),
            source,
        };

        if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(credential(token, TokenSource::Flag));
        }
        if let Some(token) = &self.env_token {
            return Ok(credential(token, TokenSource::Environment));
        }
        if let Some(token) = self.store.get(&base_url) {
            tracing::debug!("Using stored token for {}", base_url);
            return Ok(credential(token, TokenSource::Store));
        }

        Err(AuthError::Missing { base_url })
    }
}

impl fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResolver")
            .field("env_token", &self.env_token.as_ref().map(|_| "[REDACTED]"))
            .field("stored_urls", &self.store.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Canonical form of a base URL: lowercase scheme and host, default port
/// dropped, no trailing slash. Unparseable input is only trimmed.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(url) if url.has_host() => {
            let mut out = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
            if let Some(port) = url.port() {
                out.push_str(&format!(":{port}"));
            }
            out.push_str(url.path().trim_end_matches('/'));
            out
        }
        _ => trimmed.trim_end_matches('/').to_string(),
    }
}
