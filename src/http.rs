use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::{RagError, Result};

/// Turns a non-2xx response into [`RagError::Api`], otherwise decodes the
/// JSON body.
pub(crate) async fn json_or_api_error<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        error!(%status, %body, "API request failed");
        return Err(RagError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| RagError::MalformedResponse(e.to_string()))
}

/// Appends `segments` to the path of `base`, percent-encoding each one so a
/// `/` or `?` inside a name stays part of that segment.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| RagError::Config(format!("invalid endpoint '{}': {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| RagError::Config(format!("endpoint '{}' cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
