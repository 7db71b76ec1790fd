//! Route table: which strategy and cache serve a request.
//!
//! The table is an ordered list fixed at construction. Resolution walks it
//! top to bottom and stops at the first route whose method and predicate
//! both match; a request no route matches bypasses the cache entirely.

use std::fmt;
use std::time::Duration;

use regex::Regex;

use crate::Error;
use crate::cache::{DAY, ExpirationRule, MINUTE, YEAR};
use crate::config::RoutesConfig;
use crate::http::{Destination, Request, Response};

pub const GOOGLE_FONTS_CACHE: &str = "google-fonts-cache";
pub const GSTATIC_FONTS_CACHE: &str = "gstatic-fonts-cache";
pub const IMAGES_CACHE: &str = "images-cache";
pub const ONBOARDING_CACHE: &str = "onboarding-cache";
pub const PAGES_CACHE: &str = "pages-cache";
pub const ASSETS_CACHE: &str = "assets-cache";
pub const API_CACHE: &str = "api-cache";

/// Route predicate over the full request.
pub type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync>;

/// How a matched request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fresh cache entry if present, otherwise network.
    CacheFirst,
    /// Network within `timeout`, otherwise cache.
    NetworkFirst { timeout: Duration },
    /// Cache immediately, refresh from network in the background.
    StaleWhileRevalidate,
    /// Network only; no cache is read or written.
    NetworkOnly,
}

/// Decides whether a network response may be written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheFilter {
    /// Store only status 200.
    #[default]
    Ok200,
    /// Never store.
    Never,
}

impl CacheFilter {
    pub fn allows(&self, response: &Response) -> bool {
        match self {
            CacheFilter::Ok200 => response.is_ok(),
            CacheFilter::Never => false,
        }
    }
}

/// Rewrites the response handed back to the caller. Stored entries are
/// never affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseTransform {
    #[default]
    None,
    /// Mark 200 responses as uncacheable for the browser's HTTP cache.
    NoStore,
}

impl ResponseTransform {
    pub fn apply(&self, mut response: Response) -> Response {
        match self {
            ResponseTransform::None => response,
            ResponseTransform::NoStore => {
                if response.is_ok() {
                    response.set_header("Cache-Control", "no-store, no-cache, must-revalidate");
                    response.set_header("Pragma", "no-cache");
                }
                response
            }
        }
    }
}

/// What to do when neither network nor cache produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureHandler {
    #[default]
    Propagate,
    /// Serve the offline page (navigations only).
    OfflinePage,
}

/// Cache a route reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCache {
    pub name: String,
    pub rule: ExpirationRule,
}

/// One binding in the route table.
pub struct Route {
    pub name: &'static str,
    pub method: &'static str,
    predicate: Predicate,
    pub strategy: Strategy,
    pub cache: Option<RouteCache>,
    pub filter: CacheFilter,
    pub transform: ResponseTransform,
    pub on_failure: FailureHandler,
}

impl Route {
    pub fn new(
        name: &'static str, method: &'static str, strategy: Strategy,
        predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            method,
            predicate: Box::new(predicate),
            strategy,
            cache: None,
            filter: CacheFilter::default(),
            transform: ResponseTransform::default(),
            on_failure: FailureHandler::default(),
        }
    }

    pub fn with_cache(mut self, name: &str, rule: ExpirationRule) -> Self {
        self.cache = Some(RouteCache { name: name.to_string(), rule });
        self
    }

    pub fn with_filter(mut self, filter: CacheFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_transform(mut self, transform: ResponseTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_failure_handler(mut self, on_failure: FailureHandler) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn matches(&self, request: &Request) -> bool {
        request.method == self.method && (self.predicate)(request)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("strategy", &self.strategy)
            .field("cache", &self.cache)
            .field("filter", &self.filter)
            .field("transform", &self.transform)
            .field("on_failure", &self.on_failure)
            .finish_non_exhaustive()
    }
}

/// Ordered route list.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// First route matching `request`, if any.
    pub fn resolve(&self, request: &Request) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(request))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// The application's route table.
    ///
    /// Onboarding navigations are listed before general navigations since
    /// both predicates match them.
    pub fn standard(config: &RoutesConfig) -> Result<Self, Error> {
        let [font_css_host, font_file_host] = match config.font_hosts.as_slice() {
            [a, b] => [a.to_ascii_lowercase(), b.to_ascii_lowercase()],
            _ => return Err(Error::InvalidInput("routes.font_hosts must list exactly two hosts".into())),
        };

        let extensions: Vec<String> = config.image_extensions.iter().map(|e| regex::escape(e)).collect();
        let images = Regex::new(&format!(r"(?i)\.(?:{})$", extensions.join("|")))
            .map_err(|e| Error::InvalidInput(format!("image extension pattern: {e}")))?;

        let onboarding = config.onboarding_segment.clone();
        let api_prefix = config.api_prefix.clone();
        let identity_host = config.identity_host.clone();
        let token_path = config.token_refresh_path.clone();

        let routes = vec![
            Route::new("google-fonts", "GET", Strategy::CacheFirst, move |req| {
                req.url.host_str() == Some(font_css_host.as_str())
            })
            .with_cache(GOOGLE_FONTS_CACHE, ExpirationRule::new(10, YEAR)),
            Route::new("gstatic-fonts", "GET", Strategy::CacheFirst, move |req| {
                req.url.host_str() == Some(font_file_host.as_str())
            })
            .with_cache(GSTATIC_FONTS_CACHE, ExpirationRule::new(10, YEAR)),
            Route::new("images", "GET", Strategy::CacheFirst, move |req| images.is_match(req.url.path()))
                .with_cache(IMAGES_CACHE, ExpirationRule::new(50, 30 * DAY)),
            Route::new(
                "onboarding",
                "GET",
                Strategy::NetworkFirst { timeout: Duration::from_secs(2) },
                move |req| req.is_navigation() && req.url.path().contains(onboarding.as_str()),
            )
            .with_cache(ONBOARDING_CACHE, ExpirationRule::new(10, 5 * MINUTE))
            .with_filter(CacheFilter::Never)
            .with_transform(ResponseTransform::NoStore)
            .with_failure_handler(FailureHandler::OfflinePage),
            Route::new("pages", "GET", Strategy::NetworkFirst { timeout: Duration::from_secs(3) }, |req| {
                req.is_navigation()
            })
            .with_cache(PAGES_CACHE, ExpirationRule::new(50, 7 * DAY))
            .with_failure_handler(FailureHandler::OfflinePage),
            Route::new("assets", "GET", Strategy::StaleWhileRevalidate, |req| {
                matches!(req.destination, Destination::Script | Destination::Style)
            })
            .with_cache(ASSETS_CACHE, ExpirationRule::new(100, 30 * DAY)),
            Route::new("api", "GET", Strategy::NetworkFirst { timeout: Duration::from_secs(5) }, move |req| {
                req.url.path().contains(api_prefix.as_str())
            })
            .with_cache(API_CACHE, ExpirationRule::new(50, 5 * MINUTE)),
            Route::new("token-refresh", "POST", Strategy::NetworkOnly, move |req| {
                req.url.host_str().is_some_and(|h| h.contains(identity_host.as_str()))
                    && req.url.path().contains(token_path.as_str())
            }),
        ];

        Ok(Self::new(routes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn table() -> RouteTable {
        RouteTable::standard(&RoutesConfig::default()).unwrap()
    }

    fn resolve_name(table: &RouteTable, request: &Request) -> Option<&'static str> {
        table.resolve(request).map(|r| r.name)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_onboarding_navigation_beats_pages() {
        let table = table();
        let req = Request::navigate(url("https://app.test/onboarding"));
        let route = table.resolve(&req).unwrap();
        assert_eq!(route.name, "onboarding");
        assert_eq!(route.strategy, Strategy::NetworkFirst { timeout: Duration::from_secs(2) });
        assert_eq!(route.cache.as_ref().unwrap().name, ONBOARDING_CACHE);

        let nested = Request::navigate(url("https://app.test/onboarding/family?step=2"));
        assert_eq!(resolve_name(&table, &nested), Some("onboarding"));
    }

    #[test]
    fn test_general_navigation_uses_pages() {
        let table = table();
        let route = table.resolve(&Request::navigate(url("https://app.test/dashboard"))).unwrap();
        assert_eq!(route.name, "pages");
        assert_eq!(route.cache.as_ref().unwrap().rule, ExpirationRule::new(50, 7 * DAY));
        assert_eq!(route.on_failure, FailureHandler::OfflinePage);
    }

    #[test]
    fn test_onboarding_subresource_is_not_onboarding_route() {
        let req = Request::get(url("https://app.test/onboarding/data.json"));
        assert_eq!(resolve_name(&table(), &req), None);
    }

    #[test]
    fn test_font_hosts() {
        let table = table();
        assert_eq!(
            resolve_name(&table, &Request::get(url("https://fonts.googleapis.com/css2?family=Inter"))),
            Some("google-fonts")
        );
        assert_eq!(
            resolve_name(&table, &Request::get(url("https://fonts.gstatic.com/s/inter/v1.woff2"))),
            Some("gstatic-fonts")
        );
    }

    #[test]
    fn test_images_by_extension() {
        let table = table();
        let route = table.resolve(&Request::get(url("https://app.test/pwa-192x192.png"))).unwrap();
        assert_eq!(route.name, "images");
        assert_eq!(route.strategy, Strategy::CacheFirst);
        assert_eq!(resolve_name(&table, &Request::get(url("https://cdn.test/a/B.JPEG"))), Some("images"));
        assert_eq!(resolve_name(&table, &Request::get(url("https://app.test/png"))), None);
    }

    #[test]
    fn test_scripts_and_styles() {
        let table = table();
        for destination in [Destination::Script, Destination::Style] {
            let req = Request::get(url("https://app.test/_app/immutable/start.js")).with_destination(destination);
            let route = table.resolve(&req).unwrap();
            assert_eq!(route.name, "assets");
            assert_eq!(route.strategy, Strategy::StaleWhileRevalidate);
        }
    }

    #[test]
    fn test_api_prefix() {
        let route_table = table();
        let route = route_table
            .resolve(&Request::get(url("https://app.test/api/check-family")))
            .unwrap();
        assert_eq!(route.name, "api");
        assert_eq!(route.strategy, Strategy::NetworkFirst { timeout: Duration::from_secs(5) });
        assert_eq!(route.cache.as_ref().unwrap().rule, ExpirationRule::new(50, 5 * MINUTE));
    }

    #[test]
    fn test_token_refresh_requires_post() {
        let table = table();
        let post = Request::new("POST", url("https://abc.supabase.co/auth/v1/token?grant_type=refresh_token"));
        let route = table.resolve(&post).unwrap();
        assert_eq!(route.name, "token-refresh");
        assert_eq!(route.strategy, Strategy::NetworkOnly);
        assert!(route.cache.is_none());

        let get = Request::get(url("https://abc.supabase.co/auth/v1/token"));
        assert_eq!(resolve_name(&table, &get), None);
    }

    #[test]
    fn test_unmatched_bypasses() {
        let table = table();
        assert!(table.resolve(&Request::get(url("https://app.test/manifest.webmanifest"))).is_none());
        assert!(table.resolve(&Request::new("PUT", url("https://app.test/api/accounts"))).is_none());
    }

    #[test]
    fn test_filters_and_transforms() {
        assert!(CacheFilter::Ok200.allows(&Response::new(200, "")));
        assert!(!CacheFilter::Ok200.allows(&Response::new(404, "")));
        assert!(!CacheFilter::Never.allows(&Response::new(200, "")));

        let resp = ResponseTransform::NoStore.apply(Response::new(200, "").with_header("Cache-Control", "max-age=60"));
        assert_eq!(resp.header("cache-control"), Some("no-store, no-cache, must-revalidate"));
        assert_eq!(resp.header("pragma"), Some("no-cache"));

        let not_found = ResponseTransform::NoStore.apply(Response::new(404, ""));
        assert!(not_found.header("pragma").is_none());
    }

    #[test]
    fn test_font_host_count_checked() {
        let config = RoutesConfig { font_hosts: vec![], ..Default::default() };
        assert!(matches!(RouteTable::standard(&config), Err(Error::InvalidInput(_))));
    }
}
