//! sw_post_message tool implementation.
//!
//! Posts a control message through the server's coordination client and
//! waits for the worker's acknowledgement.

use std::time::Duration;

use hearth_client::{CoordinationClient, Worker};
use hearth_core::{ClientNotice, ControlMessage, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Input parameters for sw_post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwPostMessageParams {
    /// The message, e.g. {"type": "CLEAR_ALL_CACHES"}.
    pub message: ControlMessage,

    /// How long to wait for the acknowledgement (default: 5000ms).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Output structure for sw_post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwPostMessageOutput {
    /// Acknowledgement received, if the message has one.
    pub acknowledgement: Option<ClientNotice>,
    /// Lifecycle state after the message was handled.
    pub state: String,
}

/// Implementation of the sw_post_message tool.
pub async fn post_message_impl(
    worker: &Worker, client: &Mutex<CoordinationClient>, params: SwPostMessageParams,
) -> Result<CallToolResult, McpError> {
    if params.timeout_ms == 0 {
        return Err(Error::InvalidInput("timeout_ms must be positive".into()).into());
    }

    let acknowledgement = client
        .lock()
        .await
        .request(params.message, Duration::from_millis(params.timeout_ms))
        .await?;

    let output = SwPostMessageOutput { acknowledgement, state: worker.state().await.as_str().to_string() };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::offline_worker;

    #[tokio::test]
    async fn test_clear_all_caches_acknowledged() {
        let handle = offline_worker().await.start();
        let client = Mutex::new(handle.connect().await);

        let params = SwPostMessageParams { message: ControlMessage::ClearAllCaches, timeout_ms: 2000 };
        let result = post_message_impl(handle.worker(), &client, params).await.unwrap();

        let text = serde_json::to_string(&result.content).unwrap();
        assert!(text.contains("ALL_CACHES_CLEARED"));
        assert!(handle.worker().store().list_cache_names().await.unwrap().is_empty());

        drop(client);
        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let handle = offline_worker().await.start();
        let client = Mutex::new(handle.connect().await);

        let params = SwPostMessageParams { message: ControlMessage::SkipWaiting, timeout_ms: 0 };
        assert!(post_message_impl(handle.worker(), &client, params).await.is_err());

        drop(client);
        handle.shutdown(false).await;
    }

    #[test]
    fn test_params_wire_format() {
        let params: SwPostMessageParams =
            serde_json::from_str(r#"{"message":{"type":"CLEAR_ONBOARDING_CACHE"}}"#).unwrap();
        assert_eq!(params.message, ControlMessage::ClearOnboardingCache);
        assert_eq!(params.timeout_ms, 5000);
    }
}
