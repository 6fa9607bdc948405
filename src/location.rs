//! Parsed URL value
//!
//! Relative hrefs are resolved against a base with the `url` crate; the
//! query string is re-parsed with [`Query`] so serialization is normalized.

use crate::error::RouteError;
use crate::params::Query;
use std::fmt;

/// Immutable parsed URL
///
/// # Example
///
/// ```
/// use route_pilot::Url;
///
/// let base = Url::parse("http://localhost/inbox/", None).unwrap();
/// let url = Url::parse("msg/42?b=2&a=1#top", Some(&base)).unwrap();
///
/// assert_eq!(url.pathname(), "/inbox/msg/42");
/// assert_eq!(url.query().get_str("a"), Some("1"));
/// assert_eq!(url.to_string(), "http://localhost/inbox/msg/42?a=1&b=2#top");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    protocol: String,
    host: String,
    pathname: String,
    query: Query,
    hash: String,
}

impl Url {
    /// Base used when a relative href is parsed without one
    pub const DEFAULT_BASE: &'static str = "http://localhost/";

    /// Parse `href`, resolving it against `base` (or [`Url::DEFAULT_BASE`])
    pub fn parse(href: &str, base: Option<&Url>) -> Result<Self, RouteError> {
        let base_href = base.map_or_else(|| Self::DEFAULT_BASE.to_string(), Url::href);

        let invalid = |message: String| RouteError::InvalidUrl {
            url: href.to_string(),
            message,
        };

        let base = ::url::Url::parse(&base_href).map_err(|e| invalid(e.to_string()))?;
        let parsed = base.join(href).map_err(|e| invalid(e.to_string()))?;

        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };

        Ok(Self {
            protocol: format!("{}:", parsed.scheme()),
            host,
            pathname: parsed.path().to_string(),
            query: parsed.query().map(Query::parse).unwrap_or_default(),
            hash: parsed.fragment().unwrap_or_default().to_string(),
        })
    }

    /// Scheme with the trailing colon, e.g. `https:`
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Host with optional port
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Percent-encoded path, always starting with `/`
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Fragment without the `#`
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// `protocol//host`
    pub fn origin(&self) -> String {
        format!("{}//{}", self.protocol, self.host)
    }

    /// Serialized query with the leading `?`, or empty
    pub fn search(&self) -> String {
        if self.query.is_empty() {
            String::new()
        } else {
            format!("?{}", self.query.to_query_string())
        }
    }

    /// Full normalized href
    pub fn href(&self) -> String {
        self.to_string()
    }

    /// Copy of this URL with another query
    pub fn with_query(&self, query: Query) -> Self {
        Self {
            query,
            ..self.clone()
        }
    }

    /// Copy of this URL without the fragment
    pub fn without_hash(&self) -> Self {
        Self {
            hash: String::new(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.origin(), self.pathname, self.search())?;
        if !self.hash.is_empty() {
            write!(f, "#{}", self.hash)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let url = Url::parse("https://example.com:8080/a/b?x=1#frag", None).unwrap();
        assert_eq!(url.protocol(), "https:");
        assert_eq!(url.host(), "example.com:8080");
        assert_eq!(url.pathname(), "/a/b");
        assert_eq!(url.query().get_str("x"), Some("1"));
        assert_eq!(url.hash(), "frag");
    }

    #[test]
    fn test_parse_relative_uses_default_base() {
        let url = Url::parse("/users/7", None).unwrap();
        assert_eq!(url.href(), "http://localhost/users/7");
    }

    #[test]
    fn test_parse_relative_to_base() {
        let base = Url::parse("/inbox/123?page=2", None).unwrap();
        let url = Url::parse("?page=3", Some(&base)).unwrap();
        assert_eq!(url.pathname(), "/inbox/123");
        assert_eq!(url.query().get_str("page"), Some("3"));
    }

    #[test]
    fn test_to_string_round_trip() {
        let url = Url::parse("/search?tags[]=a&tags[]=b&q=x", None).unwrap();
        let again = Url::parse(&url.to_string(), None).unwrap();
        assert_eq!(url, again);
        assert_eq!(url.search(), "?q=x&tags[]=a&tags[]=b");
    }

    #[test]
    fn test_with_query_and_without_hash() {
        let url = Url::parse("/a?x=1#h", None).unwrap();
        let bare = url.with_query(Query::new()).without_hash();
        assert_eq!(bare.href(), "http://localhost/a");
    }

    #[test]
    fn test_invalid_base_is_error() {
        let result = Url::parse("http://[::1", None);
        assert!(matches!(result, Err(RouteError::InvalidUrl { .. })));
    }
}
