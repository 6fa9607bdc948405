//! Route access checks
//!
//! An access check runs before any model is fetched and can allow the
//! navigation, deny it with a status, or send it somewhere else. Checks
//! declared on a group apply to every route below it unless a route declares
//! its own.

use crate::request::Request;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

/// Result of an access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    /// Allow navigation to proceed
    Allow,

    /// Deny navigation
    Deny {
        /// Status reported through `route-fail`
        status: u16,
        /// Reason for denying navigation
        reason: String,
    },

    /// Navigate to a different href instead
    Redirect {
        /// Href to redirect to
        to: String,
    },
}

impl AccessResult {
    /// Create an allow result
    pub fn allow() -> Self {
        AccessResult::Allow
    }

    /// Create a 403 deny result
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::deny_with_status(403, reason)
    }

    /// Create a deny result with a specific status
    pub fn deny_with_status(status: u16, reason: impl Into<String>) -> Self {
        AccessResult::Deny {
            status,
            reason: reason.into(),
        }
    }

    /// Create a redirect result
    pub fn redirect(to: impl Into<String>) -> Self {
        AccessResult::Redirect { to: to.into() }
    }

    /// Check if result is allow
    pub fn is_allow(&self) -> bool {
        matches!(self, AccessResult::Allow)
    }

    /// Check if result is deny
    pub fn is_deny(&self) -> bool {
        matches!(self, AccessResult::Deny { .. })
    }

    /// Check if result is redirect
    pub fn is_redirect(&self) -> bool {
        matches!(self, AccessResult::Redirect { .. })
    }

    /// Get redirect target if this is a redirect
    pub fn redirect_path(&self) -> Option<&str> {
        match self {
            AccessResult::Redirect { to } => Some(to.as_str()),
            _ => None,
        }
    }
}

/// Trait for route access checks
///
/// Checks use an associated `Future` type so concrete checks need no boxing.
///
/// # Example
///
/// ```
/// use route_pilot::{AccessResult, Request, RouteAccess};
/// use std::future::{ready, Ready};
///
/// struct SignedIn {
///     signed_in: bool,
/// }
///
/// impl RouteAccess for SignedIn {
///     type Future = Ready<AccessResult>;
///
///     fn check(&self, _request: &Request) -> Self::Future {
///         ready(if self.signed_in {
///             AccessResult::allow()
///         } else {
///             AccessResult::redirect("/login")
///         })
///     }
/// }
/// ```
pub trait RouteAccess: Send + Sync + 'static {
    /// The future returned by check
    type Future: Future<Output = AccessResult> + Send + 'static;

    /// Decide whether `request` may proceed
    ///
    /// `request` already carries the matched route id and decoded params.
    fn check(&self, request: &Request) -> Self::Future;

    /// Get check name (for debugging and error messages)
    fn name(&self) -> &str {
        "RouteAccess"
    }

    /// Higher priority checks run first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }
}

/// Boxed access check for dynamic dispatch
pub type BoxedAccess = Box<dyn RouteAccess<Future = BoxFuture<'static, AccessResult>>>;

/// Shared access check, as stored on routes
pub type SharedAccess = Arc<dyn RouteAccess<Future = BoxFuture<'static, AccessResult>>>;

/// Box any access check, erasing its future type
pub fn boxed<A: RouteAccess>(access: A) -> BoxedAccess {
    Box::new(Erased(access))
}

struct Erased<A>(A);

impl<A: RouteAccess> RouteAccess for Erased<A> {
    type Future = BoxFuture<'static, AccessResult>;

    fn check(&self, request: &Request) -> Self::Future {
        self.0.check(request).boxed()
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn priority(&self) -> i32 {
        self.0.priority()
    }
}

/// Create an access check from an async function or closure
///
/// # Example
///
/// ```
/// use route_pilot::{access_fn, AccessResult};
///
/// let admins_only = access_fn(|request| {
///     let is_admin = request.query.get_str("role") == Some("admin");
///     async move {
///         if is_admin {
///             AccessResult::allow()
///         } else {
///             AccessResult::deny("admins only")
///         }
///     }
/// });
/// ```
pub fn access_fn<F, Fut>(f: F) -> FnAccess<F>
where
    F: Fn(&Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AccessResult> + Send + 'static,
{
    FnAccess { f }
}

/// Access check created from a function or closure
pub struct FnAccess<F> {
    f: F,
}

impl<F, Fut> RouteAccess for FnAccess<F>
where
    F: Fn(&Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AccessResult> + Send + 'static,
{
    type Future = Fut;

    fn check(&self, request: &Request) -> Self::Future {
        (self.f)(request)
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Combines multiple checks with AND logic
///
/// Checks run in priority order. The first result other than `Allow` is
/// returned.
pub struct AccessChecks {
    checks: Vec<BoxedAccess>,
}

impl AccessChecks {
    pub fn new(checks: Vec<BoxedAccess>) -> Self {
        Self { checks }
    }

    /// Add a check to the composition
    #[must_use]
    pub fn check<A: RouteAccess>(mut self, access: A) -> Self {
        self.checks.push(boxed(access));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl RouteAccess for AccessChecks {
    type Future = BoxFuture<'static, AccessResult>;

    fn check(&self, request: &Request) -> Self::Future {
        let mut sorted: Vec<_> = self.checks.iter().collect();
        sorted.sort_by_key(|check| -check.priority());

        let pending: Vec<_> = sorted.iter().map(|check| check.check(request)).collect();

        Box::pin(async move {
            for future in pending {
                match future.await {
                    AccessResult::Allow => continue,
                    other => return other,
                }
            }
            AccessResult::Allow
        })
    }

    fn name(&self) -> &str {
        "AccessChecks"
    }

    fn priority(&self) -> i32 {
        self.checks
            .iter()
            .map(|check| check.priority())
            .max()
            .unwrap_or(0)
    }
}

/// Inverts an access result
///
/// Allow becomes a 403 Deny, Deny becomes Allow, Redirect is preserved.
pub struct NotAccess {
    access: BoxedAccess,
}

impl NotAccess {
    pub fn new<A: RouteAccess>(access: A) -> Self {
        Self {
            access: boxed(access),
        }
    }
}

impl RouteAccess for NotAccess {
    type Future = BoxFuture<'static, AccessResult>;

    fn check(&self, request: &Request) -> Self::Future {
        let future = self.access.check(request);

        Box::pin(async move {
            match future.await {
                AccessResult::Allow => AccessResult::deny("inverted check allowed"),
                AccessResult::Deny { .. } => AccessResult::Allow,
                redirect @ AccessResult::Redirect { .. } => redirect,
            }
        })
    }

    fn name(&self) -> &str {
        "NotAccess"
    }

    fn priority(&self) -> i32 {
        self.access.priority()
    }
}
