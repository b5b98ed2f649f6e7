//! Scope predicates for where ZenView applies
//!
//! A tab is on the *target site* when its hostname contains the configured
//! domain, and on a *watched page* when it is additionally on the canonical
//! video-view path.

use url::Url;

use crate::config::SiteConfig;

/// Target site / watched page predicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteScope {
    domain: String,
    watch_path: String,
}

impl Default for SiteScope {
    fn default() -> Self {
        Self::from_config(&SiteConfig::default())
    }
}

impl SiteScope {
    pub fn new(domain: impl Into<String>, watch_path: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            watch_path: watch_path.into(),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(config.domain.clone(), config.watch_path.clone())
    }

    /// Whether the location is on the target site
    pub fn is_target_site(&self, location: &str) -> bool {
        match Url::parse(location) {
            Ok(url) => url
                .host_str()
                .is_some_and(|host| host.contains(self.domain.as_str())),
            Err(_) => false,
        }
    }

    /// Whether the location is a watched page on the target site
    pub fn is_watched_page(&self, location: &str) -> bool {
        match Url::parse(location) {
            Ok(url) => {
                url.host_str()
                    .is_some_and(|host| host.contains(self.domain.as_str()))
                    && url.path() == self.watch_path
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> SiteScope {
        SiteScope::new("youtube.com", "/watch")
    }

    #[test]
    fn test_target_site() {
        let s = scope();
        assert!(s.is_target_site("https://www.youtube.com/"));
        assert!(s.is_target_site("https://m.youtube.com/feed"));
        assert!(!s.is_target_site("https://example.com/youtube.com"));
        assert!(!s.is_target_site("not a url"));
    }

    #[test]
    fn test_watched_page() {
        let s = scope();
        assert!(s.is_watched_page("https://www.youtube.com/watch?v=abc"));
        assert!(!s.is_watched_page("https://www.youtube.com/watch/later"));
        assert!(!s.is_watched_page("https://www.youtube.com/"));
        assert!(!s.is_watched_page("https://example.com/watch?v=abc"));
    }
}
