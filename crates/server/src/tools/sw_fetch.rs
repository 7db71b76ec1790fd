//! sw_fetch tool implementation.
//!
//! Routes one request through the worker exactly as a page fetch would be.

use hearth_client::{Worker, canonicalize};
use hearth_core::{Destination, Error, Request, RequestMode};
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// The URL to request.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// What the request loads: document, script, style, image, font or
    /// empty (default).
    #[serde(default)]
    pub destination: Destination,

    /// Request mode; "navigate" marks a page navigation (default: cors).
    #[serde(default)]
    pub mode: RequestMode,

    /// Optional request body, sent as UTF-8.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    pub status: u16,
    /// network, cache, precache or fallback.
    pub source: String,
    pub headers: Vec<HeaderPair>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &Worker, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    if params.method.trim().is_empty() {
        return Err(Error::InvalidInput("method cannot be empty".into()).into());
    }

    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let mut request = Request::new(params.method.trim(), url)
        .with_destination(params.destination)
        .with_mode(params.mode);
    if let Some(body) = params.body {
        request = request.with_body(body.into_bytes());
    }

    let served = worker.handle_fetch(request).await?;

    let output = SwFetchOutput {
        status: served.response.status,
        source: served.source.as_str().to_string(),
        headers: served
            .response
            .headers
            .iter()
            .map(|(name, value)| HeaderPair { name: name.clone(), value: value.clone() })
            .collect(),
        body: served.response.text(),
        body_bytes: served.response.body.len(),
    };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::offline_worker;

    fn params(url: &str) -> SwFetchParams {
        SwFetchParams {
            url: url.into(),
            method: default_method(),
            destination: Destination::Empty,
            mode: RequestMode::Cors,
            body: None,
        }
    }

    #[tokio::test]
    async fn test_offline_navigation_served_fallback() {
        let worker = offline_worker().await;
        let mut params = params("https://app.test/dashboard");
        params.mode = RequestMode::Navigate;

        let result = fetch_impl(&worker, params).await.unwrap();

        assert!(!result.is_error.unwrap_or(false));
        let text = serde_json::to_string(&result.content).unwrap();
        assert!(text.contains("fallback"));
    }

    #[tokio::test]
    async fn test_offline_subresource_is_error() {
        let worker = offline_worker().await;
        let result = fetch_impl(&worker, params("https://app.test/api/budget")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let worker = offline_worker().await;
        let result = fetch_impl(&worker, params("ftp://app.test/file")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_method() {
        let worker = offline_worker().await;
        let mut params = params("https://app.test/");
        params.method = " ".into();
        assert!(fetch_impl(&worker, params).await.is_err());
    }

    #[test]
    fn test_params_defaults() {
        let params: SwFetchParams = serde_json::from_str(r#"{"url":"https://app.test/"}"#).unwrap();
        assert_eq!(params.method, "GET");
        assert_eq!(params.destination, Destination::Empty);
        assert_eq!(params.mode, RequestMode::Cors);
    }
}
