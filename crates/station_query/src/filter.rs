//! Station URL filter, used to exclude stations while diagnosing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct StationFilter {
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl StationFilter {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// Reject exactly the given URLs.
    pub fn deny_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let denied: HashSet<String> = urls.into_iter().map(Into::into).collect();
        Self::new(move |url| !denied.contains(url))
    }

    pub fn allows(&self, url: &str) -> bool {
        (self.predicate)(url)
    }
}

impl Default for StationFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl fmt::Debug for StationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationFilter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_everything() {
        assert!(StationFilter::default().allows("http://10.0.0.5:80/fk/v1"));
    }

    #[test]
    fn deny_urls_rejects_only_listed() {
        let filter = StationFilter::deny_urls(["http://10.0.0.5:80/fk/v1"]);
        assert!(!filter.allows("http://10.0.0.5:80/fk/v1"));
        assert!(filter.allows("http://10.0.0.6:80/fk/v1"));
    }

    #[test]
    fn custom_predicate() {
        let filter = StationFilter::new(|url| url.starts_with("http://192.168.2."));
        assert!(filter.allows("http://192.168.2.1:80/fk/v1"));
        assert!(!filter.allows("http://10.0.0.5:80/fk/v1"));
    }
}
