//! Request routing: which strategy answers a request.

use regex::Regex;
use url::Url;

use offcache_core::{AppConfig, ConfigError};

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Try the network, fall back to the offline JSON body.
    NetworkFirst,
    /// Serve from the cache, fetch and populate on a miss.
    CacheFirst,
}

/// Decides whether a URL belongs to a dynamic (API) endpoint.
pub trait RoutePredicate: Send + Sync {
    fn is_dynamic(&self, url: &Url) -> bool;

    fn strategy(&self, url: &Url) -> Strategy {
        if self.is_dynamic(url) { Strategy::NetworkFirst } else { Strategy::CacheFirst }
    }
}

impl<F> RoutePredicate for F
where
    F: Fn(&Url) -> bool + Send + Sync,
{
    fn is_dynamic(&self, url: &Url) -> bool {
        self(url)
    }
}

/// The default predicate: substring markers plus optional regexes, matched
/// against the full URL text.
#[derive(Debug, Clone, Default)]
pub struct UrlMarkers {
    markers: Vec<String>,
    patterns: Vec<Regex>,
}

impl UrlMarkers {
    pub fn new(markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { markers: markers.into_iter().map(Into::into).collect(), patterns: Vec::new() }
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Build from `api_markers` and `api_patterns`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let mut markers = Self::new(config.api_markers.iter().cloned());
        for pattern in &config.api_patterns {
            let regex = Regex::new(pattern).map_err(|e| ConfigError::Invalid {
                field: "api_patterns".into(),
                reason: format!("{pattern}: {e}"),
            })?;
            markers = markers.with_pattern(regex);
        }
        Ok(markers)
    }
}

impl RoutePredicate for UrlMarkers {
    fn is_dynamic(&self, url: &Url) -> bool {
        let text = url.as_str();
        self.markers.iter().any(|m| text.contains(m.as_str())) || self.patterns.iter().any(|p| p.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_default_markers() {
        let routes = UrlMarkers::from_config(&AppConfig::default()).unwrap();
        assert_eq!(routes.strategy(&url("https://cellar.example/search?q=x")), Strategy::NetworkFirst);
        assert_eq!(routes.strategy(&url("https://cellar.example/wine/42")), Strategy::NetworkFirst);
        assert_eq!(routes.strategy(&url("https://cellar.example/index.html")), Strategy::CacheFirst);
    }

    #[test]
    fn test_marker_matches_anywhere_in_url() {
        let routes = UrlMarkers::new(["/search"]);
        assert!(routes.is_dynamic(&url("https://api.example/v1/search")));
        assert!(routes.is_dynamic(&url("https://cellar.example/app.js?next=/search")));
    }

    #[test]
    fn test_pattern() {
        let routes = UrlMarkers::new(Vec::<String>::new()).with_pattern(Regex::new(r"/api/v\d+/").unwrap());
        assert!(routes.is_dynamic(&url("https://cellar.example/api/v2/bottles")));
        assert!(!routes.is_dynamic(&url("https://cellar.example/api/docs")));
    }

    #[test]
    fn test_empty_predicate_is_cache_first() {
        let routes = UrlMarkers::default();
        assert_eq!(routes.strategy(&url("https://cellar.example/search")), Strategy::CacheFirst);
    }

    #[test]
    fn test_closure_predicate() {
        let routes = |u: &Url| u.path().starts_with("/live");
        assert_eq!(routes.strategy(&url("https://cellar.example/live/feed")), Strategy::NetworkFirst);
    }

    #[test]
    fn test_invalid_pattern() {
        let config = AppConfig { api_patterns: vec!["(".into()], ..Default::default() };
        assert!(UrlMarkers::from_config(&config).is_err());
    }
}
