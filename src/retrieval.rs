//! The grounding block that tells the chat backend which search index to
//! answer from.

use serde::Serialize;

use crate::registry::SearchConnection;
use crate::Secret;

/// How the backend should authenticate against the search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchAuth {
    ApiKey { key: Secret },
}

/// A data source entry for the `data_sources` request field.
///
/// Serializes as
/// `{"type":"azure_search","parameters":{"endpoint","index_name","authentication"}}`.
/// Values are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalDirective {
    endpoint: String,
    index_name: String,
    auth: SearchAuth,
}

#[derive(Serialize)]
struct Parameters<'a> {
    endpoint: &'a str,
    index_name: &'a str,
    authentication: &'a SearchAuth,
}

#[derive(Serialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
enum DataSource<'a> {
    AzureSearch(Parameters<'a>),
}

impl RetrievalDirective {
    pub fn new(endpoint: impl Into<String>, index_name: impl Into<String>, key: Secret) -> Self {
        Self {
            endpoint: endpoint.into(),
            index_name: index_name.into(),
            auth: SearchAuth::ApiKey { key },
        }
    }

    pub fn from_connection(connection: &SearchConnection, index_name: &str) -> Self {
        Self::new(
            connection.endpoint_url.clone(),
            index_name,
            connection.key.clone(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn auth(&self) -> &SearchAuth {
        &self.auth
    }
}

impl Serialize for RetrievalDirective {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        DataSource::AzureSearch(Parameters {
            endpoint: &self.endpoint,
            index_name: &self.index_name,
            authentication: &self.auth,
        })
        .serialize(serializer)
    }
}
