//! Error handling for the router
//!
//! Provides the crate error type, the normalized [`Status`] object surfaced
//! through `route-fail` events, and the [`NavigationResult`] of a finished
//! navigation.

use thiserror::Error;

// ============================================================================
// Navigation Result Types
// ============================================================================

/// Outcome of a navigation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationResult {
    /// The navigation committed and the router now points at `href`
    Committed { href: String },
    /// The target equals the active URL, nothing was run
    Unchanged { href: String },
    /// A newer navigation took over before this one could commit
    Superseded { href: String },
    /// The navigation was redirected and the redirect target settled
    Redirected { from: String, to: String },
}

impl NavigationResult {
    /// Check if navigation committed its own target
    pub fn is_committed(&self) -> bool {
        matches!(self, NavigationResult::Committed { .. })
    }

    /// Check if navigation was a no-op
    pub fn is_unchanged(&self) -> bool {
        matches!(self, NavigationResult::Unchanged { .. })
    }

    /// Check if navigation was abandoned for a newer one
    pub fn is_superseded(&self) -> bool {
        matches!(self, NavigationResult::Superseded { .. })
    }

    /// Check if navigation ended up somewhere else
    pub fn is_redirected(&self) -> bool {
        matches!(self, NavigationResult::Redirected { .. })
    }

    /// Get redirect target if redirected
    pub fn redirect_path(&self) -> Option<&str> {
        match self {
            NavigationResult::Redirected { to, .. } => Some(to),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while building routes or navigating
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No route matches the URL
    #[error("Route not found: {url}")]
    NotFound { url: String },

    /// An access check rejected the navigation
    #[error("Access denied ({status}): {reason}")]
    AccessDenied { status: u16, reason: String },

    /// A named model failed to load
    #[error("Model '{name}' failed ({status}): {message}")]
    ModelFetch {
        name: String,
        status: u16,
        message: String,
    },

    /// `wait_for` asked for a model the loader does not declare
    #[error("Unknown model: {name}")]
    UnknownModel { name: String },

    /// Not a failure: the navigation must continue at `href`
    #[error("Redirect to {href}")]
    Redirect { href: String },

    /// A URL could not be built from a pattern
    #[error("Cannot build URL for '{pattern}': missing parameter '{param}'")]
    PatternBuild { pattern: String, param: String },

    /// A route pattern could not be compiled
    #[error("Invalid route pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A route id does not carry the `#` marker
    #[error("Invalid route id '{id}': route ids must start with '#'")]
    InvalidRouteId { id: String },

    /// Two routes share one id
    #[error("Duplicate route id: {id}")]
    DuplicateRoute { id: String },

    /// Lookup of an id that was never registered
    #[error("Unknown route: {id}")]
    UnknownRoute { id: String },

    /// A href could not be parsed
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Application-defined failure
    #[error("{message}")]
    Custom { status: u16, message: String },
}

impl RouteError {
    /// Create an application error with a status code
    pub fn custom(status: u16, message: impl Into<String>) -> Self {
        RouteError::Custom {
            status,
            message: message.into(),
        }
    }

    /// Create a redirect signal
    pub fn redirect(href: impl Into<String>) -> Self {
        RouteError::Redirect { href: href.into() }
    }

    /// HTTP-like status code of this error
    pub fn status(&self) -> u16 {
        match self {
            RouteError::NotFound { .. } | RouteError::UnknownRoute { .. } => 404,
            RouteError::AccessDenied { status, .. }
            | RouteError::ModelFetch { status, .. }
            | RouteError::Custom { status, .. } => *status,
            RouteError::Redirect { .. } => 302,
            RouteError::InvalidUrl { .. } => 400,
            RouteError::UnknownModel { .. }
            | RouteError::PatternBuild { .. }
            | RouteError::InvalidPattern { .. }
            | RouteError::InvalidRouteId { .. }
            | RouteError::DuplicateRoute { .. } => 500,
        }
    }

    /// Check if this is a redirect signal rather than a failure
    pub fn is_redirect(&self) -> bool {
        matches!(self, RouteError::Redirect { .. })
    }

    /// Get redirect target if this is a redirect signal
    pub fn redirect_path(&self) -> Option<&str> {
        match self {
            RouteError::Redirect { href } => Some(href),
            _ => None,
        }
    }
}

/// Normalized failure status attached to `route-fail` events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub message: String,
}

impl Status {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 4xx statuses
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }
}

impl From<&RouteError> for Status {
    fn from(error: &RouteError) -> Self {
        Status::new(error.status(), error.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_result_committed() {
        let result = NavigationResult::Committed {
            href: "http://localhost/home".to_string(),
        };
        assert!(result.is_committed());
        assert!(!result.is_unchanged());
        assert!(!result.is_superseded());
        assert!(!result.is_redirected());
    }

    #[test]
    fn test_navigation_result_redirected() {
        let result = NavigationResult::Redirected {
            from: "http://localhost/admin".to_string(),
            to: "http://localhost/login".to_string(),
        };
        assert!(result.is_redirected());
        assert_eq!(result.redirect_path(), Some("http://localhost/login"));
    }

    #[test]
    fn test_error_status_codes() {
        let not_found = RouteError::NotFound {
            url: "/missing".to_string(),
        };
        assert_eq!(not_found.status(), 404);

        let denied = RouteError::AccessDenied {
            status: 403,
            reason: "admins only".to_string(),
        };
        assert_eq!(denied.status(), 403);

        assert_eq!(RouteError::custom(418, "teapot").status(), 418);
        assert_eq!(RouteError::redirect("/login").status(), 302);
    }

    #[test]
    fn test_error_display() {
        let error = RouteError::NotFound {
            url: "/test".to_string(),
        };
        assert_eq!(error.to_string(), "Route not found: /test");

        let error = RouteError::PatternBuild {
            pattern: "/users/:id".to_string(),
            param: "id".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot build URL for '/users/:id': missing parameter 'id'"
        );
    }

    #[test]
    fn test_redirect_signal() {
        let signal = RouteError::redirect("/login");
        assert!(signal.is_redirect());
        assert_eq!(signal.redirect_path(), Some("/login"));
        assert!(!RouteError::custom(500, "boom").is_redirect());
    }

    #[test]
    fn test_status_from_error() {
        let status = Status::from(&RouteError::NotFound {
            url: "/nope".to_string(),
        });
        assert_eq!(status.code, 404);
        assert!(status.is_client_error());
        assert_eq!(status.message, "Route not found: /nope");
    }
}
