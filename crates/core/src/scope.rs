//! Scope policy
//!
//! Classifies routes as in-scope public pages or one of the out-of-scope
//! categories. The same policy gates expectations at learn-time and the
//! Observer's page-discovery frontier at runtime.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of example routes kept per category in a report
pub const DEFAULT_EXAMPLE_CAP: usize = 10;

/// Built-in auth/account/admin path prefixes
pub const BUILTIN_AUTH_PATTERNS: &[&str] = &[
    "/account",
    "/accounts",
    "/admin",
    "/auth",
    "/billing",
    "/dashboard",
    "/login",
    "/logout",
    "/me",
    "/oauth",
    "/profile",
    "/register",
    "/settings",
    "/sign-in",
    "/sign-up",
    "/signin",
    "/signout",
    "/signup",
];

/// Path segments that can only be resolved with runtime data:
/// `:id`, `:id?`, `[id]`, `[...slug]`, `{id}`, `*`, `(regex)`, `segment?`
static DYNAMIC_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(^|/)(:[A-Za-z_][\w-]*\??|\[[^/\]]+\]|\{[^/}]+\}\??|[^/]*\*[^/]*|[^/]*\([^/]*\)[^/]*|[^/?]+\?)(/|$)",
    )
    .expect("dynamic segment pattern is valid")
});

/// Drop a query string. A `?` that closes a segment marks an optional route
/// parameter and stays.
fn strip_query(path: &str) -> &str {
    let mut chars = path.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '?' && !matches!(chars.peek(), None | Some((_, '/'))) {
            return &path[..idx];
        }
    }
    path
}

static ABSOLUTE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)([a-z][a-z0-9+.-]*:)?//([^/?#]*)(.*)$").expect("absolute url pattern is valid")
});

/// Scope tag attached to a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeClassification {
    InScopePublic,
    OutOfScopeAuth,
    OutOfScopeDynamic,
    OutOfScopeExternal,
    OutOfScopeUnknown,
}

impl ScopeClassification {
    pub fn is_in_scope(self) -> bool {
        matches!(self, ScopeClassification::InScopePublic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeClassification::InScopePublic => "IN_SCOPE_PUBLIC",
            ScopeClassification::OutOfScopeAuth => "OUT_OF_SCOPE_AUTH",
            ScopeClassification::OutOfScopeDynamic => "OUT_OF_SCOPE_DYNAMIC",
            ScopeClassification::OutOfScopeExternal => "OUT_OF_SCOPE_EXTERNAL",
            ScopeClassification::OutOfScopeUnknown => "OUT_OF_SCOPE_UNKNOWN",
        }
    }
}

impl std::fmt::Display for ScopeClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route classification rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePolicy {
    auth_patterns: Vec<String>,
    base_origin: Option<String>,
    example_cap: usize,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self::new(&[], None, DEFAULT_EXAMPLE_CAP)
    }
}

impl ScopePolicy {
    /// Create a policy from user auth patterns (added to the built-in set),
    /// the run's base origin, and the per-category example cap.
    pub fn new(extra_auth_patterns: &[String], base_origin: Option<&str>, example_cap: usize) -> Self {
        let mut patterns: BTreeSet<String> = BUILTIN_AUTH_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();
        for pattern in extra_auth_patterns {
            let pattern = pattern.trim().trim_end_matches('/').to_ascii_lowercase();
            if pattern.is_empty() {
                continue;
            }
            if pattern.starts_with('/') {
                patterns.insert(pattern);
            } else {
                patterns.insert(format!("/{}", pattern));
            }
        }

        Self {
            auth_patterns: patterns.into_iter().collect(),
            base_origin: base_origin
                .map(|o| o.trim().trim_end_matches('/').to_ascii_lowercase())
                .filter(|o| !o.is_empty()),
            example_cap,
        }
    }

    pub fn auth_patterns(&self) -> &[String] {
        &self.auth_patterns
    }

    /// Classify a single route. Pure: depends only on the route and the
    /// configured patterns.
    pub fn classify(&self, route: &str) -> ScopeClassification {
        let route = route.trim();
        if route.is_empty() {
            return ScopeClassification::OutOfScopeUnknown;
        }

        let lowered = route.to_ascii_lowercase();
        if ["javascript:", "mailto:", "tel:", "data:", "blob:"]
            .iter()
            .any(|scheme| lowered.starts_with(scheme))
        {
            return ScopeClassification::OutOfScopeUnknown;
        }

        let path = match ABSOLUTE_URL.captures(route) {
            Some(caps) => {
                let scheme = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
                let host = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
                if host.is_empty() {
                    return ScopeClassification::OutOfScopeUnknown;
                }
                if let Some(base) = &self.base_origin {
                    if !same_origin(base, scheme.as_deref(), &host) {
                        return ScopeClassification::OutOfScopeExternal;
                    }
                }
                caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string()
            }
            None if lowered.contains(':') && !route.starts_with('/') && !route.contains('/') => {
                // opaque scheme we do not know about
                return ScopeClassification::OutOfScopeUnknown;
            }
            None => route.to_string(),
        };

        let path = strip_query(path.split('#').next().unwrap_or(""));
        if DYNAMIC_SEGMENT.is_match(path) {
            return ScopeClassification::OutOfScopeDynamic;
        }

        let path = path.to_ascii_lowercase();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };

        if self
            .auth_patterns
            .iter()
            .any(|prefix| path == *prefix || path.starts_with(&format!("{}/", prefix)))
        {
            return ScopeClassification::OutOfScopeAuth;
        }

        ScopeClassification::InScopePublic
    }

    /// Partition routes by classification, keeping capped examples of each
    /// out-of-scope category so filtered routes stay visible.
    pub fn classify_many<S: AsRef<str>>(&self, routes: &[S]) -> ScopeReport {
        let mut report = ScopeReport {
            total: routes.len(),
            ..ScopeReport::default()
        };

        for route in routes {
            let route = route.as_ref();
            let tag = self.classify(route);
            *report.counts.entry(tag).or_insert(0) += 1;

            if tag.is_in_scope() {
                report.in_scope.push(route.to_string());
                continue;
            }

            let examples = report.examples.entry(tag).or_default();
            if examples.len() < self.example_cap {
                examples.push(route.to_string());
            }
        }

        debug!(
            "Scope partition: {} routes, {} in scope",
            report.total,
            report.in_scope.len()
        );
        report
    }
}

fn same_origin(base: &str, scheme: Option<&str>, host: &str) -> bool {
    match ABSOLUTE_URL.captures(base) {
        Some(caps) => {
            let base_scheme = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
            let base_host = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let scheme_ok = match (scheme, base_scheme.as_deref()) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            };
            scheme_ok && base_host == host
        }
        // bare host given as origin
        None => base == host,
    }
}

/// Result of classifying a list of routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReport {
    pub total: usize,
    pub in_scope: Vec<String>,
    pub counts: BTreeMap<ScopeClassification, usize>,
    pub examples: BTreeMap<ScopeClassification, Vec<String>>,
}

impl ScopeReport {
    pub fn out_of_scope_count(&self) -> usize {
        self.total - self.in_scope.len()
    }
}

/// Why the frontier accepted or rejected a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierReason {
    InScope,
    Duplicate,
    OutOfScopeRuntime,
}

/// Decision recorded for every route offered to the frontier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierDecision {
    pub route: String,
    pub added: bool,
    pub reason: FrontierReason,
    pub classification: ScopeClassification,
}

/// Runtime page-discovery frontier guarded by the scope policy.
///
/// Routes that slipped past the learn-time gate are still blocked here and
/// recorded with `added = false`.
#[derive(Debug, Clone)]
pub struct ScopeFrontier {
    policy: ScopePolicy,
    seen: BTreeSet<String>,
    decisions: Vec<FrontierDecision>,
}

impl ScopeFrontier {
    pub fn new(policy: ScopePolicy) -> Self {
        Self {
            policy,
            seen: BTreeSet::new(),
            decisions: Vec::new(),
        }
    }

    /// Offer a discovered route to the frontier.
    pub fn try_add(&mut self, route: &str) -> FrontierDecision {
        let classification = self.policy.classify(route);
        let normalized = normalize_route(route);

        let decision = if !classification.is_in_scope() {
            FrontierDecision {
                route: route.to_string(),
                added: false,
                reason: FrontierReason::OutOfScopeRuntime,
                classification,
            }
        } else if !self.seen.insert(normalized) {
            FrontierDecision {
                route: route.to_string(),
                added: false,
                reason: FrontierReason::Duplicate,
                classification,
            }
        } else {
            FrontierDecision {
                route: route.to_string(),
                added: true,
                reason: FrontierReason::InScope,
                classification,
            }
        };

        if !decision.added {
            debug!("Frontier rejected {} ({:?})", route, decision.reason);
        }
        self.decisions.push(decision.clone());
        decision
    }

    pub fn decisions(&self) -> &[FrontierDecision] {
        &self.decisions
    }

    pub fn into_decisions(self) -> Vec<FrontierDecision> {
        self.decisions
    }
}

fn normalize_route(route: &str) -> String {
    let route = route.trim().split('#').next().unwrap_or("");
    let trimmed = route.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn policy() -> ScopePolicy {
        ScopePolicy::new(&["internal".to_string()], Some("https://shop.example.com"), 2)
    }

    #[test_case("/about", ScopeClassification::InScopePublic)]
    #[test_case("/", ScopeClassification::InScopePublic)]
    #[test_case("/search?q=shoes", ScopeClassification::InScopePublic)]
    #[test_case("/search?q=a*b", ScopeClassification::InScopePublic)]
    #[test_case("/about?ref=(home)", ScopeClassification::InScopePublic)]
    #[test_case("/docs?page=[2]#intro", ScopeClassification::InScopePublic)]
    #[test_case("/login?next=/cart", ScopeClassification::OutOfScopeAuth)]
    #[test_case("/users/:id?/edit", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/users/:id", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/users/:id?", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/blog/[slug]", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/files/*", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/item/{sku}", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/post/(\\d+)", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/admin/:id", ScopeClassification::OutOfScopeDynamic)]
    #[test_case("/login", ScopeClassification::OutOfScopeAuth)]
    #[test_case("/Admin/users", ScopeClassification::OutOfScopeAuth)]
    #[test_case("/internal/tools", ScopeClassification::OutOfScopeAuth)]
    #[test_case("/administrator", ScopeClassification::InScopePublic)]
    #[test_case("https://shop.example.com/pricing", ScopeClassification::InScopePublic)]
    #[test_case("https://shop.example.com/login", ScopeClassification::OutOfScopeAuth)]
    #[test_case("https://cdn.other.com/x", ScopeClassification::OutOfScopeExternal)]
    #[test_case("//cdn.other.com/x", ScopeClassification::OutOfScopeExternal)]
    #[test_case("mailto:team@example.com", ScopeClassification::OutOfScopeUnknown)]
    #[test_case("javascript:void(0)", ScopeClassification::OutOfScopeUnknown)]
    #[test_case("", ScopeClassification::OutOfScopeUnknown)]
    fn test_classify(route: &str, expected: ScopeClassification) {
        assert_eq!(policy().classify(route), expected);
    }

    #[test]
    fn test_dynamic_checked_before_auth() {
        let p = ScopePolicy::default();
        assert_eq!(p.classify("/account/[id]"), ScopeClassification::OutOfScopeDynamic);
    }

    #[test]
    fn test_classify_is_referentially_transparent() {
        let p = policy();
        for route in ["/about", "/users/:id", "/login", "https://x.io/"] {
            assert_eq!(p.classify(route), p.classify(route));
        }
    }

    #[test]
    fn test_classify_many_caps_examples() {
        let routes = ["/a/:id", "/b/:id", "/c/:id", "/about", "/login"];
        let report = policy().classify_many(&routes);

        assert_eq!(report.total, 5);
        assert_eq!(report.in_scope, vec!["/about".to_string()]);
        assert_eq!(report.counts[&ScopeClassification::OutOfScopeDynamic], 3);
        assert_eq!(report.examples[&ScopeClassification::OutOfScopeDynamic].len(), 2);
        assert_eq!(report.examples[&ScopeClassification::OutOfScopeAuth], vec!["/login".to_string()]);
        assert_eq!(report.out_of_scope_count(), 4);
    }

    #[test]
    fn test_frontier_blocks_and_records() {
        let mut frontier = ScopeFrontier::new(policy());

        assert!(frontier.try_add("/about").added);
        let dup = frontier.try_add("/about/");
        assert!(!dup.added);
        assert_eq!(dup.reason, FrontierReason::Duplicate);

        let blocked = frontier.try_add("/settings/profile");
        assert!(!blocked.added);
        assert_eq!(blocked.reason, FrontierReason::OutOfScopeRuntime);
        assert_eq!(blocked.classification, ScopeClassification::OutOfScopeAuth);

        assert_eq!(frontier.decisions().len(), 3);
    }
}
