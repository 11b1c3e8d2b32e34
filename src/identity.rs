//! Bearer-token sources for the platform APIs.

use std::env;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::constants;
use crate::error::{RagError, Result};
use crate::Secret;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    async fn token(&self, scope: &str) -> Result<Secret>;
}

/// A token handed in from outside, e.g. `AZURE_ACCESS_TOKEN`.
#[derive(Debug, Clone)]
pub struct StaticToken(Secret);

impl StaticToken {
    pub fn new(token: impl Into<Secret>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    fn name(&self) -> &'static str {
        "static token"
    }

    async fn token(&self, _scope: &str) -> Result<Secret> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
}

/// Service principal credential using the client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: Secret,
    authority_host: String,
    client: reqwest::Client,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<Secret>,
        authority_host: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: authority_host.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Built from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET`; `None` unless all three are set.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Same as [`ClientSecretCredential::from_env`], reading variables
    /// through `var`. `AZURE_AUTHORITY_HOST` overrides the public cloud
    /// login host.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let tenant_id = var("AZURE_TENANT_ID")?;
        let client_id = var("AZURE_CLIENT_ID")?;
        let client_secret = var("AZURE_CLIENT_SECRET")?;
        let authority_host = var("AZURE_AUTHORITY_HOST")
            .unwrap_or_else(|| constants::DEFAULT_AUTHORITY_HOST.to_string());
        Some(Self::new(tenant_id, client_id, client_secret, authority_host))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    fn name(&self) -> &'static str {
        "environment client secret"
    }

    #[instrument(skip(self), fields(tenant = %self.tenant_id))]
    async fn token(&self, scope: &str) -> Result<Secret> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
            ("scope", scope),
        ];

        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(RagError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| RagError::Auth(format!("unreadable token response: {}", e)))?;
        debug!("Acquired token from client secret credential");
        Ok(Secret::new(token.access_token))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
}

/// Asks a logged-in Azure CLI for a token.
#[derive(Debug, Clone, Default)]
pub struct AzureCliCredential;

impl AzureCliCredential {
    fn program() -> &'static str {
        if cfg!(windows) {
            "az.cmd"
        } else {
            "az"
        }
    }
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    fn name(&self) -> &'static str {
        "Azure CLI"
    }

    async fn token(&self, scope: &str) -> Result<Secret> {
        let output = Command::new(Self::program())
            .args(["account", "get-access-token", "--scope", scope, "--output", "json"])
            .output()
            .await
            .map_err(|e| RagError::Auth(format!("could not run the Azure CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RagError::Auth(format!(
                "az account get-access-token failed: {}",
                stderr.trim()
            )));
        }

        let token: CliTokenResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| RagError::Auth(format!("unreadable Azure CLI output: {}", e)))?;
        Ok(Secret::new(token.access_token))
    }
}

/// Tries each provider in turn and returns the first token obtained.
pub struct DefaultCredential {
    providers: Vec<Box<dyn TokenProvider>>,
}

impl DefaultCredential {
    pub fn new(providers: Vec<Box<dyn TokenProvider>>) -> Self {
        Self { providers }
    }

    /// Static token, then environment service principal, then the Azure CLI.
    pub fn from_env() -> Self {
        let mut providers: Vec<Box<dyn TokenProvider>> = Vec::new();
        if let Ok(token) = env::var("AZURE_ACCESS_TOKEN") {
            if !token.is_empty() {
                providers.push(Box::new(StaticToken::new(token)));
            }
        }
        if let Some(credential) = ClientSecretCredential::from_env() {
            providers.push(Box::new(credential));
        }
        providers.push(Box::new(AzureCliCredential));
        Self::new(providers)
    }
}

#[async_trait]
impl TokenProvider for DefaultCredential {
    fn name(&self) -> &'static str {
        "default credential chain"
    }

    async fn token(&self, scope: &str) -> Result<Secret> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.token(scope).await {
                Ok(token) => {
                    info!(provider = provider.name(), "Authenticated");
                    return Ok(token);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Credential unavailable");
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(RagError::Auth(format!(
            "no credential could provide a token ({})",
            if failures.is_empty() {
                "none configured".to_string()
            } else {
                failures.join("; ")
            }
        )))
    }
}
