// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-method rules for requests that bypass authentication.

use std::collections::HashMap;

use http::header::ACCESS_CONTROL_REQUEST_METHOD;
use http::Method;
use regex::Regex;

use super::extractor::AuthRequest;
use crate::config::{ConfigError, PathRule};

#[derive(Debug, Clone)]
enum PathMatcher {
    Exact(String),
    Pattern(Regex),
}

impl PathMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(expected) => expected == path,
            PathMatcher::Pattern(pattern) => pattern.is_match(path),
        }
    }
}

/// Decides whether a request skips authentication.
///
/// CORS preflights always skip. Otherwise the rules configured for the
/// request's lowercased method are tried in order. Patterns are unanchored
/// unless they anchor themselves.
#[derive(Debug, Clone, Default)]
pub struct SkipEvaluator {
    rules: HashMap<String, Vec<PathMatcher>>,
}

impl SkipEvaluator {
    /// Compile the configured rules. Method keys are lowercased.
    pub fn new(skip_paths: &HashMap<String, Vec<PathRule>>) -> Result<Self, ConfigError> {
        let mut rules: HashMap<String, Vec<PathMatcher>> = HashMap::new();

        for (method, paths) in skip_paths {
            let method = method.to_ascii_lowercase();
            let compiled = rules.entry(method.clone()).or_default();
            for rule in paths {
                compiled.push(match rule {
                    PathRule::Exact(path) => PathMatcher::Exact(path.clone()),
                    PathRule::Pattern { pattern } => {
                        let regex =
                            Regex::new(pattern).map_err(|source| ConfigError::InvalidSkipPattern {
                                method: method.clone(),
                                pattern: pattern.clone(),
                                source,
                            })?;
                        PathMatcher::Pattern(regex)
                    }
                });
            }
        }

        Ok(Self { rules })
    }

    pub fn should_skip<R: AuthRequest + ?Sized>(&self, request: &R) -> bool {
        is_preflight(request) || self.matches(request.method(), request.path())
    }

    /// Whether a rule for `method` matches `path`.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.rules
            .get(&method.as_str().to_ascii_lowercase())
            .is_some_and(|rules| rules.iter().any(|rule| rule.matches(path)))
    }
}

/// `OPTIONS` carrying a non-empty `Access-Control-Request-Method`.
pub fn is_preflight<R: AuthRequest + ?Sized>(request: &R) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .get(ACCESS_CONTROL_REQUEST_METHOD)
            .is_some_and(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn evaluator(rules: &[(&str, PathRule)]) -> SkipEvaluator {
        let mut map: HashMap<String, Vec<PathRule>> = HashMap::new();
        for (method, rule) in rules {
            map.entry(method.to_string()).or_default().push(rule.clone());
        }
        SkipEvaluator::new(&map).unwrap()
    }

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder().method(method).uri(path).body(()).unwrap()
    }

    #[test]
    fn preflight_always_skips() {
        let skip = SkipEvaluator::default();
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/private")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(())
            .unwrap();

        assert!(skip.should_skip(&preflight));
        assert!(!skip.should_skip(&request(Method::OPTIONS, "/private")));
    }

    #[test]
    fn exact_rules_match_whole_path() {
        let skip = evaluator(&[("get", PathRule::exact("/health"))]);

        assert!(skip.should_skip(&request(Method::GET, "/health")));
        assert!(!skip.should_skip(&request(Method::GET, "/health/deep")));
        assert!(!skip.should_skip(&request(Method::POST, "/health")));
    }

    #[test]
    fn patterns_search_the_path() {
        let skip = evaluator(&[
            ("GET", PathRule::pattern("^/public/")),
            ("get", PathRule::pattern("docs")),
        ]);

        assert!(skip.should_skip(&request(Method::GET, "/public/logo.png")));
        assert!(skip.should_skip(&request(Method::GET, "/api/docs/index.html")));
        assert!(!skip.should_skip(&request(Method::GET, "/api/public/")));
    }

    #[test]
    fn mixed_rules_across_methods() {
        let skip = evaluator(&[
            ("get", PathRule::exact("/ping")),
            ("post", PathRule::pattern(r"^/foo/[a-z]+/bar$")),
        ]);

        assert!(skip.should_skip(&request(Method::GET, "/ping")));
        assert!(skip.should_skip(&request(Method::POST, "/foo/xyz/bar")));
        assert!(!skip.should_skip(&request(Method::GET, "/anywhere/else")));
        assert!(!skip.should_skip(&request(Method::GET, "/foo/xyz/bar")));
    }

    #[test]
    fn method_keys_are_case_insensitive() {
        let skip = evaluator(&[("PoSt", PathRule::exact("/webhooks"))]);
        assert!(skip.should_skip(&request(Method::POST, "/webhooks")));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let mut map = HashMap::new();
        map.insert("get".to_string(), vec![PathRule::pattern("(unclosed")]);
        assert!(matches!(
            SkipEvaluator::new(&map),
            Err(ConfigError::InvalidSkipPattern { .. })
        ));
    }
}
