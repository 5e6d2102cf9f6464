use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::config_parser::AuthConfig;
use crate::error::{Error, ErrorDetails};

/// Opaque identifier of the signed-in user, as issued by the identity provider.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == id.len() {
            Some(Self(id))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user resolved for the current request, if any. Inserted as a request extension
/// by [`attach_current_user`]; handlers that run without that middleware see `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentUser(pub Option<UserId>);

impl CurrentUser {
    pub fn user_id(&self) -> Option<&UserId> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}

// API keys are stored as lowercase hex SHA-256 digests, never in the clear
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolves the current user from request headers.
#[derive(Debug, Clone)]
pub struct Auth {
    api_keys: Arc<HashMap<String, UserId>>,
    trusted_header: Option<HeaderName>,
}

impl Auth {
    pub fn new(api_keys: HashMap<String, UserId>, trusted_header: Option<HeaderName>) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            trusted_header,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, Error> {
        let mut api_keys = HashMap::with_capacity(config.api_keys.len());
        for (hash, user) in &config.api_keys {
            let user_id = UserId::new(user.as_str()).ok_or_else(|| {
                Error::new(ErrorDetails::Config {
                    message: format!("API key `{hash}` maps to an empty user id"),
                })
            })?;
            api_keys.insert(hash.to_lowercase(), user_id);
        }

        let trusted_header = config
            .trusted_header
            .as_deref()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    Error::new(ErrorDetails::Config {
                        message: format!("Invalid `auth.trusted_header` `{name}`: {e}"),
                    })
                })
            })
            .transpose()?;

        Ok(Self::new(api_keys, trusted_header))
    }

    pub fn api_key_count(&self) -> usize {
        self.api_keys.len()
    }

    /// Trusted header first, then a bearer API key. Unknown keys resolve to no user.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<UserId> {
        if let Some(header) = &self.trusted_header {
            if let Some(user) = headers
                .get(header)
                .and_then(|v| v.to_str().ok())
                .and_then(UserId::new)
            {
                return Some(user);
            }
        }

        let key = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim())
            .map(|s| s.strip_prefix("Bearer ").unwrap_or(s))?;
        if key.is_empty() {
            return None;
        }

        let user = self.api_keys.get(&hash_api_key(key)).cloned();
        if user.is_none() {
            tracing::debug!("Request presented an unknown API key");
        }
        user
    }
}

/// Represents the authentication state of the gateway
#[derive(Debug, Clone)]
pub enum AuthenticationInfo {
    Enabled(Auth),
    Disabled,
}

impl AuthenticationInfo {
    pub fn from_config(config: &AuthConfig) -> Result<Self, Error> {
        if config.enabled {
            Ok(AuthenticationInfo::Enabled(Auth::from_config(config)?))
        } else {
            Ok(AuthenticationInfo::Disabled)
        }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Option<UserId> {
        match self {
            AuthenticationInfo::Enabled(auth) => auth.resolve(headers),
            AuthenticationInfo::Disabled => None,
        }
    }
}

/// Middleware that records the resolved user on the request. It never rejects: handlers
/// decide what an anonymous request gets.
pub async fn attach_current_user(
    State(auth): State<AuthenticationInfo>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = auth.resolve(request.headers());
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}
