//! Resolves the project's connections (search service, OpenAI resource) to
//! an endpoint and credential.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::config::ProjectConnection;
use crate::constants;
use crate::error::{RagError, Result};
use crate::http::{endpoint_url, json_or_api_error};
use crate::identity::TokenProvider;
use crate::Secret;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    AzureAiSearch,
    AzureOpenAi,
}

impl ConnectionType {
    /// Category name the registry files this connection type under.
    pub fn category(self) -> &'static str {
        match self {
            ConnectionType::AzureAiSearch => "CognitiveSearch",
            ConnectionType::AzureOpenAi => "AzureOpenAI",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAuth {
    ApiKey(Secret),
    /// Callers authenticate with their own bearer token.
    EntraId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub kind: ConnectionType,
    pub endpoint_url: String,
    pub auth: ConnectionAuth,
}

/// Endpoint and key of the search service backing the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConnection {
    pub name: String,
    pub endpoint_url: String,
    pub key: Secret,
}

impl TryFrom<Connection> for SearchConnection {
    type Error = RagError;

    fn try_from(connection: Connection) -> Result<Self> {
        match connection.auth {
            ConnectionAuth::ApiKey(key) => Ok(Self {
                name: connection.name,
                endpoint_url: connection.endpoint_url,
                key,
            }),
            ConnectionAuth::EntraId => Err(RagError::Registry(format!(
                "search connection '{}' is not key-based",
                connection.name
            ))),
        }
    }
}

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Returns the project's default connection of `kind`, credentials
    /// included.
    async fn default_connection(&self, kind: ConnectionType) -> Result<Connection>;
}

#[derive(Deserialize, Debug)]
struct ConnectionList {
    #[serde(default)]
    value: Vec<ConnectionResource>,
}

#[derive(Deserialize, Debug)]
struct ConnectionResource {
    name: String,
    properties: ConnectionProperties,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ConnectionProperties {
    #[serde(default)]
    category: Option<String>,
    target: String,
    auth_type: String,
    #[serde(default)]
    is_default: Option<bool>,
    #[serde(default)]
    credentials: Option<ConnectionCredentials>,
}

#[derive(Deserialize, Debug)]
struct ConnectionCredentials {
    #[serde(default)]
    key: Option<String>,
}

/// HTTP client for the project's connection endpoints.
pub struct ProjectClient {
    base_url: String,
    credential: Arc<dyn TokenProvider>,
    client: Client,
}

impl ProjectClient {
    pub fn new(project: &ProjectConnection, credential: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(
            format!("{}{}", project.endpoint(), project.workspace_path()),
            credential,
        )
    }

    /// `base_url` is the full workspace URL the `/connections` paths hang off.
    pub fn with_base_url(base_url: impl Into<String>, credential: Arc<dyn TokenProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            client: Client::new(),
        }
    }

    async fn list(&self, kind: ConnectionType, token: &Secret) -> Result<Vec<ConnectionResource>> {
        let url = endpoint_url(&self.base_url, &["connections"])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .query(&[
                ("category", kind.category()),
                ("includeAll", "true"),
                ("api-version", constants::CONNECTIONS_API_VERSION),
            ])
            .send()
            .await?;
        let list: ConnectionList = json_or_api_error(response).await?;
        Ok(list.value)
    }

    async fn with_secrets(&self, name: &str, token: &Secret) -> Result<ConnectionResource> {
        let url = endpoint_url(&self.base_url, &["connections", name, "listsecrets"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token.expose())
            .query(&[("api-version", constants::CONNECTIONS_API_VERSION)])
            .json(&json!({ "ignored": "ignore" }))
            .send()
            .await?;
        json_or_api_error(response).await
    }
}

#[async_trait]
impl ConnectionRegistry for ProjectClient {
    #[instrument(skip(self))]
    async fn default_connection(&self, kind: ConnectionType) -> Result<Connection> {
        let token = self.credential.token(constants::MANAGEMENT_SCOPE).await?;

        let listed = self.list(kind, &token).await?;
        debug!(count = listed.len(), "Listed connections");
        // The server filters by category, but not every deployment honours it.
        let mut candidates = listed.into_iter().filter(|c| {
            c.properties
                .category
                .as_deref()
                .map_or(true, |cat| cat == kind.category())
        });
        let first = candidates
            .next()
            .ok_or_else(|| RagError::Registry(format!("no default {} connection found", kind)))?;
        let chosen = if first.properties.is_default == Some(true) {
            first
        } else {
            candidates
                .find(|c| c.properties.is_default == Some(true))
                .unwrap_or(first)
        };

        let resource = self.with_secrets(&chosen.name, &token).await?;
        let auth = if resource.properties.auth_type.eq_ignore_ascii_case("ApiKey") {
            let key = resource
                .properties
                .credentials
                .and_then(|c| c.key)
                .ok_or_else(|| {
                    RagError::Registry(format!("connection '{}' returned no key", resource.name))
                })?;
            ConnectionAuth::ApiKey(Secret::new(key))
        } else {
            ConnectionAuth::EntraId
        };

        info!(name = %resource.name, endpoint = %resource.properties.target, "Resolved {} connection", kind);
        Ok(Connection {
            name: resource.name,
            kind,
            endpoint_url: resource.properties.target,
            auth,
        })
    }
}
