//! Navigation requests
//!
//! A [`Request`] describes one navigation attempt. The router fills in the
//! route id, params and alias while resolving it; afterwards the only thing
//! that can still change is the redirect target, which is set at most once.

use crate::error::RouteError;
use crate::location::Url;
use crate::params::{Query, RouteParams};
use crate::NavigationDirection;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Caller-supplied navigation details
///
/// # Example
///
/// ```
/// use route_pilot::{NavDetails, NavigationDirection};
///
/// let details = NavDetails::new().replace().force();
/// assert!(details.force);
/// assert_eq!(details.direction, NavigationDirection::Replace);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavDetails {
    /// Run the pipeline even if the target equals the active URL
    pub force: bool,
    pub direction: NavigationDirection,
    /// Arbitrary payload handed to access checks and model fetches
    pub data: Option<Value>,
}

impl NavDetails {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Replace the current history entry instead of pushing
    #[must_use]
    pub fn replace(mut self) -> Self {
        self.direction = NavigationDirection::Replace;
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: NavigationDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// One navigation attempt
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    /// Normalized full href of `url`
    pub href: String,
    /// Percent-encoded pathname
    pub path: String,
    pub query: Query,
    /// Decoded route parameters, filled in by the matching route
    pub params: RouteParams,
    /// Id of the matched route
    pub route_id: Option<String>,
    /// Href of the previous committed request
    pub referrer: Option<String>,
    /// Name of the alias pattern that matched, if any
    pub alias: Option<String>,
    pub details: NavDetails,
    // Shared between clones so handlers holding a snapshot can redirect.
    redirect: Arc<OnceLock<String>>,
    interrupt_redirect: bool,
}

impl Request {
    pub fn new(url: Url, referrer: Option<String>, details: NavDetails) -> Self {
        Self {
            href: url.href(),
            path: url.pathname().to_string(),
            query: url.query().clone(),
            url,
            params: RouteParams::new(),
            route_id: None,
            referrer,
            alias: None,
            details,
            redirect: Arc::new(OnceLock::new()),
            interrupt_redirect: false,
        }
    }

    /// Make [`Request::redirect_to`] return the redirect signal as an error
    #[must_use]
    pub fn interrupting(mut self, interrupt: bool) -> Self {
        self.interrupt_redirect = interrupt;
        self
    }

    /// Ask the router to continue at `href`
    ///
    /// Only the first call records a target. In interrupting mode the
    /// redirect signal is returned so it can be propagated with `?`.
    ///
    /// # Example
    ///
    /// ```
    /// use route_pilot::{NavDetails, Request, Url};
    ///
    /// let url = Url::parse("/old", None).unwrap();
    /// let request = Request::new(url, None, NavDetails::new());
    ///
    /// request.redirect_to("/new").unwrap();
    /// request.redirect_to("/ignored").unwrap();
    /// assert_eq!(request.redirect_href(), Some("/new"));
    /// ```
    pub fn redirect_to(&self, href: impl Into<String>) -> Result<(), RouteError> {
        let href = href.into();
        let stored = self.redirect.get_or_init(|| href);

        if self.interrupt_redirect {
            Err(RouteError::redirect(stored.clone()))
        } else {
            Ok(())
        }
    }

    /// Records a redirect without raising the signal
    pub(crate) fn set_redirect(&self, href: String) {
        let _ = self.redirect.set(href);
    }

    /// Redirect target recorded on this request
    pub fn redirect_href(&self) -> Option<&str> {
        self.redirect.get().map(String::as_str)
    }

    /// Shorthand for `self.params.get(name)`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

/// Anything `nav()` accepts
#[derive(Debug, Clone)]
pub enum NavTarget {
    Href(String),
    Url(Url),
    Request(Box<Request>),
}

impl From<&str> for NavTarget {
    fn from(href: &str) -> Self {
        NavTarget::Href(href.to_string())
    }
}

impl From<String> for NavTarget {
    fn from(href: String) -> Self {
        NavTarget::Href(href)
    }
}

impl From<&String> for NavTarget {
    fn from(href: &String) -> Self {
        NavTarget::Href(href.clone())
    }
}

impl From<Url> for NavTarget {
    fn from(url: Url) -> Self {
        NavTarget::Url(url)
    }
}

impl From<Request> for NavTarget {
    fn from(request: Request) -> Self {
        NavTarget::Request(Box::new(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(href: &str) -> Request {
        Request::new(Url::parse(href, None).unwrap(), None, NavDetails::new())
    }

    #[test]
    fn test_request_fields() {
        let request = request("/users/7?tab=posts");
        assert_eq!(request.href, "http://localhost/users/7?tab=posts");
        assert_eq!(request.path, "/users/7");
        assert_eq!(request.query.get_str("tab"), Some("posts"));
        assert!(request.route_id.is_none());
        assert!(request.redirect_href().is_none());
    }

    #[test]
    fn test_redirect_is_shared_with_clones() {
        let original = request("/a");
        let snapshot = original.clone();

        snapshot.redirect_to("/b").unwrap();
        assert_eq!(original.redirect_href(), Some("/b"));
    }

    #[test]
    fn test_interrupting_redirect_returns_signal() {
        let request = request("/a").interrupting(true);

        let error = request.redirect_to("/login").unwrap_err();
        assert_eq!(error, RouteError::redirect("/login"));
        assert_eq!(request.redirect_href(), Some("/login"));
    }

    #[test]
    fn test_nav_target_conversions() {
        assert!(matches!(NavTarget::from("/x"), NavTarget::Href(_)));
        assert!(matches!(
            NavTarget::from(request("/x")),
            NavTarget::Request(_)
        ));
    }
}
