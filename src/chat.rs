//! Chat-completions collaborator: sends the transcript plus data sources and
//! returns the first choice.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::constants;
use crate::error::{RagError, Result};
use crate::http::{endpoint_url, json_or_api_error};
use crate::identity::TokenProvider;
use crate::registry::{Connection, ConnectionAuth};
use crate::retrieval::RetrievalDirective;
use crate::{Secret, Turn};

/// Body of one chat-completions call.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Turn],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<RetrievalDirective>,
}

/// A source document the backend grounded its answer in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
}

impl Citation {
    /// Best human-readable label for this citation.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.url.as_deref())
            .or(self.filepath.as_deref())
            .unwrap_or("(untitled source)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub citations: Vec<Citation>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            citations: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatReply>;
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    context: Option<MessageContext>,
}

#[derive(Deserialize, Debug)]
struct MessageContext {
    #[serde(default)]
    citations: Vec<Citation>,
}

impl ChatCompletionResponse {
    /// The first choice's content; anything else is ignored.
    fn into_reply(self) -> Result<ChatReply> {
        let message = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::MalformedResponse("response has no choices".to_string()))?
            .message;
        let content = message.content.ok_or_else(|| {
            RagError::MalformedResponse("first choice has no message content".to_string())
        })?;
        Ok(ChatReply {
            content,
            citations: message.context.map(|c| c.citations).unwrap_or_default(),
        })
    }
}

enum ChatAuth {
    ApiKey(Secret),
    Bearer(Arc<dyn TokenProvider>),
}

/// Calls `{endpoint}/openai/deployments/{model}/chat/completions`.
pub struct AzureOpenAiClient {
    endpoint: String,
    api_version: String,
    auth: ChatAuth,
    client: Client,
}

impl AzureOpenAiClient {
    pub fn with_api_key(
        endpoint: impl Into<String>,
        api_version: impl Into<String>,
        key: Secret,
    ) -> Self {
        Self::build(endpoint.into(), api_version.into(), ChatAuth::ApiKey(key))
    }

    pub fn with_token_provider(
        endpoint: impl Into<String>,
        api_version: impl Into<String>,
        credential: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::build(endpoint.into(), api_version.into(), ChatAuth::Bearer(credential))
    }

    /// Uses the connection's key if it has one, otherwise `credential`.
    pub fn from_connection(
        connection: &Connection,
        api_version: impl Into<String>,
        credential: Arc<dyn TokenProvider>,
    ) -> Self {
        match &connection.auth {
            ConnectionAuth::ApiKey(key) => {
                Self::with_api_key(connection.endpoint_url.clone(), api_version, key.clone())
            }
            ConnectionAuth::EntraId => Self::with_token_provider(
                connection.endpoint_url.clone(),
                api_version,
                credential,
            ),
        }
    }

    fn build(endpoint: String, api_version: String, auth: ChatAuth) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version,
            auth,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for AzureOpenAiClient {
    #[instrument(skip(self, request), fields(model = request.model, turns = request.messages.len()))]
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatReply> {
        let url = endpoint_url(
            &self.endpoint,
            &["openai", "deployments", request.model, "chat", "completions"],
        )?;

        let builder = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .json(request);
        let builder = match &self.auth {
            ChatAuth::ApiKey(key) => builder.header("api-key", key.expose()),
            ChatAuth::Bearer(credential) => {
                let token = credential
                    .token(constants::COGNITIVE_SERVICES_SCOPE)
                    .await?;
                builder.bearer_auth(token.expose())
            }
        };

        let response = builder.send().await?;
        let body: ChatCompletionResponse = json_or_api_error(response).await?;
        let reply = body.into_reply()?;
        debug!(citations = reply.citations.len(), "Received chat completion");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let turns = vec![Turn::system("sys"), Turn::user("hello")];
        let request = ChatRequest {
            model: "gpt-4o",
            messages: &turns,
            data_sources: vec![RetrievalDirective::new(
                "https://svc.example",
                "margies-index",
                Secret::new("k"),
            )],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][1], json!({"role": "user", "content": "hello"}));
        assert_eq!(value["data_sources"][0]["type"], "azure_search");
        assert_eq!(
            value["data_sources"][0]["parameters"]["index_name"],
            "margies-index"
        );
    }

    #[test]
    fn test_reply_takes_first_choice() {
        let raw = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first", "context": {
                    "citations": [{"title": "Dubai brochure", "url": null}]
                }}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let reply = response.into_reply().unwrap();
        assert_eq!(reply.content, "first");
        assert_eq!(reply.citations.len(), 1);
        assert_eq!(reply.citations[0].label(), "Dubai brochure");
    }

    #[test]
    fn test_reply_without_choices_is_malformed() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            response.into_reply(),
            Err(RagError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_reply_with_null_content_is_malformed() {
        let response: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": null}}]})).unwrap();
        assert!(matches!(
            response.into_reply(),
            Err(RagError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_citation_label_fallbacks() {
        let citation = Citation {
            title: Some(String::new()),
            url: None,
            filepath: Some("brochures/london.pdf".to_string()),
        };
        assert_eq!(citation.label(), "brochures/london.pdf");
    }
}
