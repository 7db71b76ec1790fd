//! Control protocol between foreground clients and the worker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Foreground → worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Drop the onboarding and pages caches.
    ClearOnboardingCache,
    /// Drop every cache.
    ClearAllCaches,
    /// Activate a waiting worker now.
    SkipWaiting,
}

impl ControlMessage {
    /// Acknowledgement clients receive once the message has been handled,
    /// if the message has one.
    pub fn acknowledgement(&self) -> Option<ClientNotice> {
        match self {
            ControlMessage::ClearOnboardingCache => Some(ClientNotice::CacheCleared),
            ControlMessage::ClearAllCaches => Some(ClientNotice::AllCachesCleared),
            ControlMessage::SkipWaiting => None,
        }
    }
}

/// Worker → every connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientNotice {
    CacheCleared,
    AllCachesCleared,
    /// The worker took control of this client after activating.
    ControllerChanged,
}
