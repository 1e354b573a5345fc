//! Request classification.
//!
//! An ordered rule list maps each request to exactly one [`Route`]. The first
//! matching rule wins and the last rule matches everything, so classification
//! is total. Nothing here touches the network or the cache.

use http::Method;
use louder_core::CacheConfig;
use louder_net::{Destination, Request};

use crate::partition::PartitionKind;

/// Body of the 503 served for audio while offline.
pub const AUDIO_UNAVAILABLE: &str = "Audio not available offline";

/// What a network-only route serves when the network fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineFallback {
    /// Empty 200; the failure never reaches the page.
    Empty,
    /// 503 with a plain-text reason.
    Unavailable(&'static str),
}

/// Strategy plus target partition for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the browser handles it normally.
    Passthrough,
    /// Network only, never cached.
    NetworkOnly(OfflineFallback),
    CacheFirst(PartitionKind),
    StaleWhileRevalidate(PartitionKind),
    /// Network first; successes land in the runtime partition.
    NetworkFirst,
}

impl Route {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Route::Passthrough => "passthrough",
            Route::NetworkOnly(_) => "network-only",
            Route::CacheFirst(_) => "cache-first",
            Route::StaleWhileRevalidate(_) => "stale-while-revalidate",
            Route::NetworkFirst => "network-first",
        }
    }

    pub fn partition(&self) -> Option<PartitionKind> {
        match self {
            Route::CacheFirst(kind) | Route::StaleWhileRevalidate(kind) => Some(*kind),
            Route::NetworkFirst => Some(PartitionKind::Runtime),
            Route::Passthrough | Route::NetworkOnly(_) => None,
        }
    }
}

/// Predicate over a request.
#[derive(Debug, Clone)]
pub enum RequestMatcher {
    /// Method differs from the given one.
    MethodIsNot(Method),
    /// URL scheme equals.
    Scheme(String),
    /// Host equals.
    Host(String),
    /// Path contains substring.
    PathContains(String),
    /// Path ends with `.{ext}` for any listed extension.
    PathExtension(Vec<String>),
    /// Destination equals.
    Destination(Destination),
    /// `Accept` header contains substring.
    AcceptContains(String),
    /// Any inner matcher matches.
    AnyOf(Vec<RequestMatcher>),
    /// Always matches.
    Any,
}

impl RequestMatcher {
    pub fn matches(&self, request: &Request) -> bool {
        let url = &request.url;
        match self {
            RequestMatcher::MethodIsNot(method) => request.method != *method,
            RequestMatcher::Scheme(scheme) => url.scheme() == scheme,
            RequestMatcher::Host(host) => url.host_str() == Some(host.as_str()),
            RequestMatcher::PathContains(fragment) => url.path().contains(fragment.as_str()),
            RequestMatcher::PathExtension(exts) => {
                let path = url.path();
                exts.iter().any(|ext| {
                    path.len() > ext.len()
                        && path.ends_with(ext.as_str())
                        && path.as_bytes()[path.len() - ext.len() - 1] == b'.'
                })
            }
            RequestMatcher::Destination(destination) => request.destination == *destination,
            RequestMatcher::AcceptContains(fragment) => request
                .headers
                .get(http::header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.contains(fragment.as_str()))
                .unwrap_or(false),
            RequestMatcher::AnyOf(inner) => inner.iter().any(|m| m.matches(request)),
            RequestMatcher::Any => true,
        }
    }
}

/// One row of the routing table.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: &'static str,
    pub matcher: RequestMatcher,
    pub route: Route,
}

/// Ordered routing table.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<RouteRule>,
}

impl Router {
    /// Build the site's routing table.
    pub fn from_config(config: &CacheConfig) -> Self {
        use RequestMatcher as M;

        let mut analytics: Vec<RequestMatcher> =
            config.analytics_hosts.iter().cloned().map(M::Host).collect();
        analytics.push(M::PathContains(config.analytics_path_fragment.clone()));

        let mut passthrough = vec![M::MethodIsNot(Method::GET)];
        passthrough.extend(config.passthrough_schemes.iter().cloned().map(M::Scheme));

        let rules = vec![
            RouteRule {
                name: "passthrough",
                matcher: M::AnyOf(passthrough),
                route: Route::Passthrough,
            },
            RouteRule {
                name: "analytics",
                matcher: M::AnyOf(analytics),
                route: Route::NetworkOnly(OfflineFallback::Empty),
            },
            RouteRule {
                name: "images",
                matcher: M::AnyOf(vec![
                    M::Destination(Destination::Image),
                    M::PathExtension(config.image_extensions.clone()),
                ]),
                route: Route::CacheFirst(PartitionKind::Images),
            },
            RouteRule {
                name: "fonts",
                matcher: M::AnyOf(vec![
                    M::Destination(Destination::Font),
                    M::Host(config.font_host.clone()),
                ]),
                route: Route::CacheFirst(PartitionKind::Runtime),
            },
            RouteRule {
                name: "styles-and-scripts",
                matcher: M::AnyOf(vec![
                    M::Destination(Destination::Style),
                    M::Destination(Destination::Script),
                ]),
                route: Route::StaleWhileRevalidate(PartitionKind::Runtime),
            },
            RouteRule {
                name: "documents",
                matcher: M::AnyOf(vec![
                    M::Destination(Destination::Document),
                    M::AcceptContains("text/html".to_string()),
                ]),
                route: Route::NetworkFirst,
            },
            RouteRule {
                name: "audio",
                matcher: M::AnyOf(vec![
                    M::Destination(Destination::Audio),
                    M::PathContains(config.audio_extension.clone()),
                ]),
                route: Route::NetworkOnly(OfflineFallback::Unavailable(AUDIO_UNAVAILABLE)),
            },
            RouteRule {
                name: "default",
                matcher: M::Any,
                route: Route::NetworkFirst,
            },
        ];

        Self { rules }
    }

    /// First rule matching `request`.
    pub fn rule_for(&self, request: &Request) -> &RouteRule {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(request))
            .unwrap_or_else(|| &self.rules[self.rules.len() - 1])
    }

    /// Route for `request`.
    pub fn classify(&self, request: &Request) -> Route {
        self.rule_for(request).route.clone()
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
