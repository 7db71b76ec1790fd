//! URL canonicalization and cache key normalization.

use regex::Regex;

use hearth_core::{Request, RequestKey};

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid ignored-parameter pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Canonicalize a URL string typed by a person or host process.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Strips query parameters that should not split the cache.
///
/// One-time auth and flow parameters (`code`, `state`, `step`) would
/// otherwise make every visit a miss.
#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    ignored: Vec<Regex>,
}

impl QueryNormalizer {
    /// Compile the ignored-parameter patterns.
    pub fn new(patterns: &[String]) -> Result<Self, UrlError> {
        let ignored = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| UrlError::InvalidPattern { pattern: pattern.clone(), reason: e.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ignored })
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|re| re.is_match(name))
    }

    /// `url` without its fragment and without ignored query parameters.
    ///
    /// The query is only re-serialized when a parameter was dropped, so
    /// URLs without ignored parameters keep their exact encoding.
    pub fn normalize(&self, url: &url::Url) -> url::Url {
        let mut normalized = url.clone();
        normalized.set_fragment(None);

        if url.query().is_none() {
            return normalized;
        }

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let kept: Vec<&(String, String)> = pairs.iter().filter(|(name, _)| !self.is_ignored(name)).collect();

        if kept.len() == pairs.len() {
            return normalized;
        }

        if kept.is_empty() {
            normalized.set_query(None);
        } else {
            normalized
                .query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        normalized
    }

    /// Cache key for `request`.
    pub fn key_for(&self, request: &Request) -> RequestKey {
        RequestKey::new(&request.method, self.normalize(&request.url).as_str())
    }
}
