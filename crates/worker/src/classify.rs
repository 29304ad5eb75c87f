//! Request classification.
//!
//! A pure decision table mapping request metadata to the strategy that will
//! handle it. First match wins:
//!
//! 1. non-GET methods bypass the caching layer entirely
//! 2. foreign origins bypass unless explicitly allow-listed (web fonts)
//! 3. API path prefixes
//! 4. static-asset extensions and install-manifest paths
//! 5. top-level navigations
//! 6. everything else

use std::collections::HashSet;

use offcast_core::{AppConfig, Error};
use url::{Origin, Url};

/// How the caching layer treats an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Api,
    Static,
    Navigation,
    Other,
}

/// Whether a request is handled at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Pass straight through to the network, no strategy involved.
    Bypass,
    /// Handled by the strategy selected for this class.
    Handle(ResourceClass),
}

/// Distinguishes a top-level page load from a sub-resource fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Subresource,
}

/// Pure classifier over request metadata.
///
/// Holds only derived configuration; classification is a deterministic
/// function of (method, URL, mode) with no side effects.
#[derive(Debug)]
pub struct Classifier {
    own_origin: Origin,
    allowed_origins: Vec<Origin>,
    api_prefixes: Vec<String>,
    static_extensions: Vec<String>,
    precache_paths: HashSet<String>,
}

impl Classifier {
    pub fn new(cfg: &AppConfig) -> Result<Self, Error> {
        let upstream = Url::parse(&cfg.upstream).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut allowed_origins = Vec::with_capacity(cfg.allowed_origins.len());
        for origin in &cfg.allowed_origins {
            let parsed = Url::parse(origin).map_err(|e| Error::InvalidUrl(format!("{origin}: {e}")))?;
            allowed_origins.push(parsed.origin());
        }

        // The root document stays a navigation even when it is precached.
        let precache_paths = cfg
            .precache
            .iter()
            .filter(|p| p.as_str() != "/")
            .cloned()
            .collect();

        Ok(Self {
            own_origin: upstream.origin(),
            allowed_origins,
            api_prefixes: cfg.api_prefixes.clone(),
            static_extensions: cfg.static_extensions.iter().map(|e| e.to_lowercase()).collect(),
            precache_paths,
        })
    }

    /// Classify one request. Pure and deterministic.
    pub fn classify(&self, method: &str, url: &Url, mode: RequestMode) -> Decision {
        if !method.eq_ignore_ascii_case("GET") {
            return Decision::Bypass;
        }

        let origin = url.origin();
        if origin != self.own_origin && !self.allowed_origins.contains(&origin) {
            return Decision::Bypass;
        }

        let path = url.path();

        if self.api_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Decision::Handle(ResourceClass::Api);
        }

        if self.is_static(path) {
            return Decision::Handle(ResourceClass::Static);
        }

        if mode == RequestMode::Navigate {
            return Decision::Handle(ResourceClass::Navigation);
        }

        Decision::Handle(ResourceClass::Other)
    }

    fn is_static(&self, path: &str) -> bool {
        if self.precache_paths.contains(path) {
            return true;
        }

        match path.rfind('.') {
            Some(idx) => {
                let ext = path[idx + 1..].to_lowercase();
                self.static_extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&AppConfig::default()).unwrap()
    }

    fn own(path: &str) -> Url {
        Url::parse(&format!("http://127.0.0.1:8080{path}")).unwrap()
    }

    #[test]
    fn test_non_get_bypasses() {
        let c = classifier();
        assert_eq!(c.classify("POST", &own("/api/v1/comments"), RequestMode::Subresource), Decision::Bypass);
        assert_eq!(c.classify("DELETE", &own("/api/v1/videos/3"), RequestMode::Subresource), Decision::Bypass);
    }

    #[test]
    fn test_foreign_origin_bypasses() {
        let c = classifier();
        let url = Url::parse("https://www.youtube.com/watch?v=abc").unwrap();
        assert_eq!(c.classify("GET", &url, RequestMode::Subresource), Decision::Bypass);
    }

    #[test]
    fn test_allow_listed_font_origin_is_intercepted() {
        let c = classifier();
        let css = Url::parse("https://fonts.googleapis.com/css2?family=Roboto").unwrap();
        assert_eq!(c.classify("GET", &css, RequestMode::Subresource), Decision::Handle(ResourceClass::Other));

        let woff = Url::parse("https://fonts.gstatic.com/s/roboto/v30/KFOm.woff2").unwrap();
        assert_eq!(c.classify("GET", &woff, RequestMode::Subresource), Decision::Handle(ResourceClass::Static));
    }

    #[test]
    fn test_api_prefixes() {
        let c = classifier();
        assert_eq!(
            c.classify("GET", &own("/api/v1/videos?limit=12"), RequestMode::Subresource),
            Decision::Handle(ResourceClass::Api)
        );
        assert_eq!(
            c.classify("GET", &own("/backend/api/categories"), RequestMode::Subresource),
            Decision::Handle(ResourceClass::Api)
        );
    }

    #[test]
    fn test_api_wins_over_navigation_mode() {
        let c = classifier();
        assert_eq!(
            c.classify("GET", &own("/api/v1/videos"), RequestMode::Navigate),
            Decision::Handle(ResourceClass::Api)
        );
    }

    #[test]
    fn test_static_extensions() {
        let c = classifier();
        for path in ["/assets/app.js", "/styles/main.css", "/img/logo.PNG", "/fonts/body.woff2"] {
            assert_eq!(
                c.classify("GET", &own(path), RequestMode::Subresource),
                Decision::Handle(ResourceClass::Static),
                "{path}"
            );
        }
    }

    #[test]
    fn test_precache_path_is_static() {
        let c = classifier();
        assert_eq!(
            c.classify("GET", &own("/manifest.json"), RequestMode::Subresource),
            Decision::Handle(ResourceClass::Static)
        );
    }

    #[test]
    fn test_root_navigation() {
        let c = classifier();
        assert_eq!(c.classify("GET", &own("/"), RequestMode::Navigate), Decision::Handle(ResourceClass::Navigation));
        assert_eq!(
            c.classify("GET", &own("/watch/123"), RequestMode::Navigate),
            Decision::Handle(ResourceClass::Navigation)
        );
    }

    #[test]
    fn test_other_fallthrough() {
        let c = classifier();
        assert_eq!(
            c.classify("GET", &own("/watch/123"), RequestMode::Subresource),
            Decision::Handle(ResourceClass::Other)
        );
    }

    #[test]
    fn test_classification_is_pure() {
        let c = classifier();
        let url = own("/api/v1/videos?limit=12");
        let first = c.classify("GET", &url, RequestMode::Subresource);
        let second = c.classify("GET", &url, RequestMode::Subresource);
        assert_eq!(first, second);
    }
}
