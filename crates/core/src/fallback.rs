//! Offline page served when a navigation gets neither network nor cache.
//!
//! The page lives in its own cache, outside the route table and outside any
//! expiration rule. It is written at install time and only disappears when
//! every cache is cleared.

use crate::Error;
use crate::cache::{CacheStore, RequestKey};
use crate::http::Response;

pub const OFFLINE_CACHE: &str = "offline-cache-v1";
pub const OFFLINE_PATH: &str = "/offline.html";

/// Self-contained: inline styles, no external resources.
pub const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline - Family Finance</title>
<style>
body { font-family: Arial, sans-serif; text-align: center; padding: 50px; background: #f5f5f5; }
.offline-container { max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
</style>
</head>
<body>
<div class="offline-container">
<h1>You're Offline</h1>
<p>Please check your internet connection and try again.</p>
<button onclick="window.location.reload()">Retry</button>
</div>
</body>
</html>
"#;

pub fn offline_key() -> RequestKey {
    RequestKey::get(OFFLINE_PATH)
}

/// Write the offline page into its cache.
pub async fn install_fallback(store: &CacheStore) -> Result<(), Error> {
    store.put(OFFLINE_CACHE, &offline_key(), &Response::html(OFFLINE_HTML)).await?;
    tracing::debug!(cache = OFFLINE_CACHE, "stored offline page");
    Ok(())
}

/// The stored offline page, if it has been installed and not cleared since.
pub async fn offline_response(store: &CacheStore) -> Result<Option<Response>, Error> {
    Ok(store.get(OFFLINE_CACHE, &offline_key()).await?.map(|entry| entry.response))
}
