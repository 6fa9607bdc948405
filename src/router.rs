//! Router: route resolution, navigation pipeline and commits
//!
//! A navigation runs through resolving, access checking and model fetching,
//! then commits synchronously. Only the most recently started navigation may
//! commit; older ones resolve to [`NavigationResult::Superseded`].

#[cfg(feature = "cache")]
use crate::cache::{CacheStats, RouteCache};
use crate::access::AccessResult;
use crate::action_queue::Action;
use crate::emitter::{Emitter, ListenerId};
use crate::error::{NavigationResult, RouteError, Status};
use crate::history::History;
use crate::loader::Model;
use crate::location::Url;
use crate::params::{Query, RouteParams};
use crate::request::{NavDetails, NavTarget, Request};
use crate::route::{build_tree, Route, RouteDef};
use crate::{debug_log, error_log, info_log, trace_log, warn_log, NavigationDirection};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type NavFuture = BoxFuture<'static, Result<NavigationResult, RouteError>>;

// ============================================================================
// Events
// ============================================================================

/// Router-level events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterEventKind {
    /// A navigation started
    BeforeRoute,
    /// A navigation committed
    Route,
    /// A navigation finished, successfully or not
    RouteEnd,
    /// A navigation failed
    RouteFail,
    /// A listener failed
    Error,
}

impl RouterEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterEventKind::BeforeRoute => "before-route",
            RouterEventKind::Route => "route",
            RouterEventKind::RouteEnd => "route-end",
            RouterEventKind::RouteFail => "route-fail",
            RouterEventKind::Error => "error",
        }
    }
}

impl fmt::Display for RouterEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a router event
#[derive(Debug, Clone)]
pub struct RouterEvent {
    pub kind: RouterEventKind,
    pub request: Request,
    /// Matched route, if resolution got that far
    pub route_id: Option<String>,
    /// Set on `route-fail` and on the `route-end` that follows it
    pub status: Option<Status>,
    /// The failure (`route-fail`) or the listener error (`error`)
    pub error: Option<RouteError>,
    /// Event a failing listener was handling
    pub phase: Option<&'static str>,
}

// ============================================================================
// Options
// ============================================================================

/// Router configuration
///
/// # Example
///
/// ```
/// use route_pilot::RouterOptions;
///
/// let options = RouterOptions::new()
///     .base_url("http://example.com/app/")
///     .interrupt_on_redirect(true)
///     .history_limit(50);
/// ```
#[derive(Debug, Clone)]
pub struct RouterOptions {
    base_url: String,
    interrupt_on_redirect: bool,
    cache_capacity: usize,
    history_limit: usize,
    max_redirects: usize,
}

impl RouterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base that relative hrefs are resolved against
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Make `Request::redirect_to` return the redirect signal as an error
    #[must_use]
    pub fn interrupt_on_redirect(mut self, interrupt: bool) -> Self {
        self.interrupt_on_redirect = interrupt;
        self
    }

    /// Capacity of the route resolution cache
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Maximum number of history entries (0 = unlimited)
    #[must_use]
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Redirects followed by one navigation before it fails
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            base_url: Url::DEFAULT_BASE.to_string(),
            interrupt_on_redirect: false,
            cache_capacity: 256,
            history_limit: 1000,
            max_redirects: 10,
        }
    }
}

/// Query handling for [`Router::get_url`]
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UrlQuery {
    /// No query string
    #[default]
    Empty,
    /// Exactly this query
    With(Query),
    /// Copy the router's current query
    Inherit,
}

impl From<Query> for UrlQuery {
    fn from(query: Query) -> Self {
        UrlQuery::With(query)
    }
}

// ============================================================================
// Router
// ============================================================================

#[derive(Debug)]
struct RouterState {
    url: Option<Url>,
    request: Option<Request>,
    route: Option<usize>,
    model: Model,
    /// Target of the navigation in progress, or the committed href
    active_url: Option<String>,
    /// Bumped by every navigation that starts
    seq: u64,
    /// Bumped by every commit
    commits: u64,
    history: History,
}

struct RouterInner {
    routes: Vec<Arc<Route>>,
    index: HashMap<String, usize>,
    options: RouterOptions,
    base: Url,
    state: Mutex<RouterState>,
    events: Emitter<RouterEventKind, RouterEvent>,
    #[cfg(feature = "cache")]
    cache: Mutex<RouteCache>,
}

/// Outcome of the asynchronous part of a navigation
enum Step {
    Commit(usize, Model),
    Redirect(String),
    Stale,
}

/// Navigation router
///
/// Cloning is cheap; clones share one route tree and one state.
///
/// # Example
///
/// ```
/// use route_pilot::{create, ModelDef, RouteDef};
/// use serde_json::json;
///
/// let router = create(
///     RouteDef::default()
///         .route("#home", RouteDef::new("/"))
///         .route(
///             "#user",
///             RouteDef::new("/users/:id")
///                 .model("name", ModelDef::sync(|request| json!(request.param("id")))),
///         ),
/// )
/// .unwrap();
///
/// pollster::block_on(router.nav("/users/7")).unwrap();
/// assert_eq!(router.route().unwrap().id(), "#user");
/// assert_eq!(router.model()["name"], json!("7"));
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

/// Build a router with default options
pub fn create(root: RouteDef) -> Result<Router, RouteError> {
    Router::create(root)
}

impl Router {
    pub fn create(root: RouteDef) -> Result<Self, RouteError> {
        Self::create_with(root, RouterOptions::default())
    }

    /// Build the route tree; structural errors fail here
    pub fn create_with(root: RouteDef, options: RouterOptions) -> Result<Self, RouteError> {
        let base = Url::parse(&options.base_url, None)?;
        let routes = build_tree(root)?;
        let index = routes
            .iter()
            .enumerate()
            .map(|(i, route)| (route.id().to_string(), i))
            .collect();

        info_log!("router created with {} routes", routes.len());

        Ok(Self {
            inner: Arc::new(RouterInner {
                index,
                base,
                state: Mutex::new(RouterState {
                    url: None,
                    request: None,
                    route: None,
                    model: Model::new(),
                    active_url: None,
                    seq: 0,
                    commits: 0,
                    history: History::with_max_size(options.history_limit),
                }),
                events: Emitter::new(),
                #[cfg(feature = "cache")]
                cache: Mutex::new(RouteCache::with_capacity(options.cache_capacity)),
                routes,
                options,
            }),
        })
    }

    // ========================================================================
    // Read model
    // ========================================================================

    /// Last committed URL
    pub fn url(&self) -> Option<Url> {
        self.inner.state.lock().url.clone()
    }

    /// Last committed request
    pub fn request(&self) -> Option<Request> {
        self.inner.state.lock().request.clone()
    }

    /// Last committed route
    pub fn route(&self) -> Option<Arc<Route>> {
        let index = self.inner.state.lock().route?;
        self.inner.routes.get(index).cloned()
    }

    /// Model of the last commit, flattened over the route and its ancestors
    pub fn model(&self) -> Model {
        self.inner.state.lock().model.clone()
    }

    /// Href of the navigation in progress, or of the last commit
    pub fn active_url(&self) -> Option<String> {
        self.inner.state.lock().active_url.clone()
    }

    pub fn route_by_id(&self, id: &str) -> Option<&Arc<Route>> {
        self.inner.index.get(id).map(|&i| &self.inner.routes[i])
    }

    /// Every route, parents before their children
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.inner.routes
    }

    pub fn history(&self) -> History {
        self.inner.state.lock().history.clone()
    }

    pub fn can_go_back(&self) -> bool {
        self.inner.state.lock().history.can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.inner.state.lock().history.can_go_forward()
    }

    #[cfg(feature = "cache")]
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.lock().stats().clone()
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn on<F>(&self, kind: RouterEventKind, handler: F) -> ListenerId
    where
        F: Fn(&RouterEvent) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn one<F>(&self, kind: RouterEventKind, handler: F) -> ListenerId
    where
        F: Fn(&RouterEvent) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.inner.events.one(kind, handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to `target`
    ///
    /// The navigation starts immediately: by the time this returns, it is
    /// the active one and `before-route` has fired. Navigating to the
    /// active URL is a no-op unless forced.
    pub fn nav(&self, target: impl Into<NavTarget>) -> NavFuture {
        self.navigate(target.into(), None, 0)
    }

    /// Navigate with explicit details
    pub fn nav_with(&self, target: impl Into<NavTarget>, details: NavDetails) -> NavFuture {
        self.navigate(target.into(), Some(details), 0)
    }

    /// Navigate to a route by id
    pub fn go(&self, id: &str, params: &RouteParams, query: UrlQuery) -> NavFuture {
        match self.get_url(id, params, query) {
            Ok(href) => self.nav(href),
            Err(error) => future::ready(Err(error)).boxed(),
        }
    }

    /// Build a URL for a route by id
    pub fn get_url(
        &self,
        id: &str,
        params: &RouteParams,
        query: UrlQuery,
    ) -> Result<String, RouteError> {
        let route = self
            .route_by_id(id)
            .ok_or_else(|| RouteError::UnknownRoute { id: id.to_string() })?;

        let query = match query {
            UrlQuery::Empty => None,
            UrlQuery::With(query) => Some(query),
            UrlQuery::Inherit => self.url().map(|url| url.query().clone()),
        };
        route.get_url(params, query.as_ref())
    }

    /// Re-run the pipeline for the committed URL
    pub fn reload(&self) -> Option<NavFuture> {
        let url = self.url()?;
        Some(self.nav_with(url, NavDetails::new().force().replace()))
    }

    /// Navigate one step back in history
    pub fn back(&self) -> Option<NavFuture> {
        let target = self.inner.state.lock().history.back_target()?.to_string();
        Some(self.nav_with(
            target,
            NavDetails::new().direction(NavigationDirection::Back),
        ))
    }

    /// Navigate one step forward in history
    pub fn forward(&self) -> Option<NavFuture> {
        let target = self.inner.state.lock().history.forward_target()?.to_string();
        Some(self.nav_with(
            target,
            NavDetails::new().direction(NavigationDirection::Forward),
        ))
    }

    /// Re-run the committed route's models for an application action
    ///
    /// The resulting model replaces the committed one and `model` fires on
    /// the active chain, unless a commit happened in the meantime.
    pub fn dispatch(&self, action: Action) -> BoxFuture<'static, Result<Model, RouteError>> {
        let current = {
            let state = self.inner.state.lock();
            match (state.route, &state.request) {
                (Some(index), Some(request)) => Some((index, request.clone(), state.commits)),
                _ => None,
            }
        };
        let Some((index, request, commits)) = current else {
            return future::ready(Err(RouteError::custom(
                409,
                "no committed navigation to dispatch against",
            )))
            .boxed();
        };

        let route = Arc::clone(&self.inner.routes[index]);
        debug_log!("dispatching '{}' on route '{}'", action.kind, route.id());
        let pending = route.loader().dispatch(request.clone(), action);
        let router = self.clone();

        async move {
            let model = pending.await?;

            {
                let mut state = router.inner.state.lock();
                if state.commits != commits {
                    trace_log!("dispatch result for '{}' is stale", request.href);
                    return Ok(model);
                }
                state.model = model.clone();
            }

            for i in router.chain(index) {
                for (phase, error) in router.inner.routes[i].refresh_model(&request, &model) {
                    router.report(&request, phase.as_str(), error);
                }
            }
            Ok(model)
        }
        .boxed()
    }

    fn navigate(&self, target: NavTarget, details: Option<NavDetails>, hops: usize) -> NavFuture {
        let (url, details) = match self.resolve_target(target, details) {
            Ok(resolved) => resolved,
            Err(error) => return future::ready(Err(error)).boxed(),
        };
        let href = url.href();

        let (seq, referrer) = {
            let mut state = self.inner.state.lock();
            if !details.force && state.active_url.as_deref() == Some(href.as_str()) {
                trace_log!("'{}' is already active", href);
                return future::ready(Ok(NavigationResult::Unchanged { href })).boxed();
            }
            state.seq += 1;
            state.active_url = Some(href.clone());
            (state.seq, state.url.as_ref().map(Url::href))
        };

        debug_log!("navigation #{} to '{}' started", seq, href);

        let mut request = Request::new(url.clone(), referrer, details)
            .interrupting(self.inner.options.interrupt_on_redirect);
        self.emit(RouterEventKind::BeforeRoute, &request, None, None);

        let router = self.clone();
        async move {
            let step = router.run(seq, &url, &mut request).await;

            match step {
                Ok(Step::Commit(index, model)) => match router.commit(index, &request, model) {
                    Some(to) => router.follow(seq, &request, to, hops).await,
                    None => {
                        debug_log!("navigation #{} committed '{}'", seq, request.href);
                        router.emit(RouterEventKind::Route, &request, None, None);
                        router.emit(RouterEventKind::RouteEnd, &request, None, None);
                        Ok(NavigationResult::Committed { href: request.href })
                    }
                },
                Ok(Step::Redirect(to)) => router.follow(seq, &request, to, hops).await,
                Ok(Step::Stale) => {
                    debug_log!("navigation #{} to '{}' superseded", seq, request.href);
                    Ok(NavigationResult::Superseded { href: request.href })
                }
                Err(error) => router.fail(seq, &request, error),
            }
        }
        .boxed()
    }

    fn resolve_target(
        &self,
        target: NavTarget,
        details: Option<NavDetails>,
    ) -> Result<(Url, NavDetails), RouteError> {
        Ok(match target {
            NavTarget::Href(href) => (
                Url::parse(&href, Some(&self.inner.base))?,
                details.unwrap_or_default(),
            ),
            NavTarget::Url(url) => (url, details.unwrap_or_default()),
            NavTarget::Request(request) => {
                let Request {
                    url,
                    details: own, ..
                } = *request;
                (url, details.unwrap_or(own))
            }
        })
    }

    /// Resolve, check access and fetch; suspends at access and fetch
    async fn run(&self, seq: u64, url: &Url, request: &mut Request) -> Result<Step, RouteError> {
        let index = self.find_route(url, request).ok_or_else(|| RouteError::NotFound {
            url: request.href.clone(),
        })?;
        let route = Arc::clone(&self.inner.routes[index]);
        request.route_id = Some(route.id().to_string());

        if let Some(to) = request.redirect_href() {
            return Ok(Step::Redirect(to.to_string()));
        }

        match route.access(request).await {
            AccessResult::Allow => {}
            AccessResult::Deny { status, reason } => {
                return Err(RouteError::AccessDenied { status, reason });
            }
            AccessResult::Redirect { to } => return Ok(Step::Redirect(to)),
        }

        if !self.is_current(seq) {
            return Ok(Step::Stale);
        }

        let model = match route.fetch(request.clone()).await {
            Ok(Some(model)) => model,
            Ok(None) => return Ok(Step::Stale),
            Err(RouteError::Redirect { href }) => return Ok(Step::Redirect(href)),
            Err(error) => return Err(error),
        };

        if let Some(to) = request.redirect_href() {
            return Ok(Step::Redirect(to.to_string()));
        }
        if !self.is_current(seq) {
            return Ok(Step::Stale);
        }
        Ok(Step::Commit(index, model))
    }

    /// First non-group route matching `url`, in declaration order
    fn find_route(&self, url: &Url, request: &mut Request) -> Option<usize> {
        let routes = &self.inner.routes;

        // Rules see the whole request, so an earlier route rejected on a
        // previous visit may accept now.
        #[cfg(feature = "cache")]
        {
            let cached = self.inner.cache.lock().get(&request.href);
            if let Some(cached) = cached {
                let earlier = routes[..cached]
                    .iter()
                    .position(|route| !route.is_group() && route.matches(url, request));
                match earlier {
                    Some(index) => {
                        let mut cache = self.inner.cache.lock();
                        cache.invalidate(&request.href);
                        cache.insert(request.href.clone(), index);
                        return Some(index);
                    }
                    None if routes[cached].matches(url, request) => return Some(cached),
                    None => self.inner.cache.lock().invalidate(&request.href),
                }
            }
        }

        let index = routes
            .iter()
            .position(|route| !route.is_group() && route.matches(url, request))?;

        #[cfg(feature = "cache")]
        self.inner.cache.lock().insert(request.href.clone(), index);

        Some(index)
    }

    fn is_current(&self, seq: u64) -> bool {
        self.inner.state.lock().seq == seq
    }

    /// Route indices from the root down to `index`
    fn chain(&self, index: usize) -> Vec<usize> {
        let route = &self.inner.routes[index];
        route
            .ancestors()
            .iter()
            .filter_map(|id| self.inner.index.get(id).copied())
            .chain(std::iter::once(index))
            .collect()
    }

    /// Apply a navigation; returns the redirect target if a handler set one
    fn commit(&self, index: usize, request: &Request, model: Model) -> Option<String> {
        {
            let mut state = self.inner.state.lock();
            state.url = Some(request.url.clone());
            state.request = Some(request.clone());
            state.route = Some(index);
            state.model = model.clone();
            state.active_url = Some(request.href.clone());
            state.commits += 1;
            state.history.record(
                &request.href,
                request.details.direction,
                request.details.data.clone(),
            );
        }

        let chain = self.chain(index);
        let mut errors = Vec::new();

        for (i, route) in self.inner.routes.iter().enumerate().rev() {
            if !chain.contains(&i) {
                errors.extend(route.leave(request));
            }
        }
        for &i in &chain {
            errors.extend(self.inner.routes[i].enter(request, &model));
            if request.redirect_href().is_some() {
                break;
            }
        }

        for (phase, error) in errors {
            self.report(request, phase.as_str(), error);
        }

        request.redirect_href().map(str::to_string)
    }

    async fn follow(
        &self,
        seq: u64,
        request: &Request,
        to: String,
        hops: usize,
    ) -> Result<NavigationResult, RouteError> {
        if !self.is_current(seq) {
            return Ok(NavigationResult::Superseded {
                href: request.href.clone(),
            });
        }
        if hops >= self.inner.options.max_redirects {
            let error = RouteError::custom(508, format!("too many redirects ending at '{to}'"));
            return self.fail(seq, request, error);
        }

        debug_log!("'{}' redirects to '{}'", request.href, to);
        let details = NavDetails {
            force: false,
            direction: request.details.direction,
            data: request.details.data.clone(),
        };
        let from = request.href.clone();

        match self.navigate(NavTarget::Href(to), Some(details), hops + 1).await? {
            NavigationResult::Committed { href } | NavigationResult::Unchanged { href } => {
                Ok(NavigationResult::Redirected { from, to: href })
            }
            NavigationResult::Redirected { to, .. } => Ok(NavigationResult::Redirected { from, to }),
            superseded @ NavigationResult::Superseded { .. } => Ok(superseded),
        }
    }

    fn fail(
        &self,
        seq: u64,
        request: &Request,
        error: RouteError,
    ) -> Result<NavigationResult, RouteError> {
        {
            let mut state = self.inner.state.lock();
            if state.seq != seq {
                debug_log!("failed navigation to '{}' was already superseded", request.href);
                return Ok(NavigationResult::Superseded {
                    href: request.href.clone(),
                });
            }
            state.active_url = state.url.as_ref().map(Url::href);
        }

        let status = Status::from(&error);
        if status.code >= 500 {
            error_log!("navigation #{} to '{}' failed: {}", seq, request.href, error);
        } else {
            debug_log!("navigation #{} to '{}' failed: {}", seq, request.href, error);
        }
        self.emit(
            RouterEventKind::RouteFail,
            request,
            Some(status.clone()),
            Some(error.clone()),
        );
        self.emit(RouterEventKind::RouteEnd, request, Some(status), None);
        Err(error)
    }

    fn emit(
        &self,
        kind: RouterEventKind,
        request: &Request,
        status: Option<Status>,
        error: Option<RouteError>,
    ) {
        let event = RouterEvent {
            kind,
            request: request.clone(),
            route_id: request.route_id.clone(),
            status,
            error,
            phase: None,
        };

        for error in self.inner.events.emit(kind, &event) {
            match error {
                RouteError::Redirect { href } => request.set_redirect(href),
                other => self.report(request, kind.as_str(), other),
            }
        }
    }

    /// Forward a listener failure to `error` listeners
    fn report(&self, request: &Request, phase: &'static str, error: RouteError) {
        warn_log!("listener failed during '{}': {}", phase, error);

        let event = RouterEvent {
            kind: RouterEventKind::Error,
            request: request.clone(),
            route_id: request.route_id.clone(),
            status: Some(Status::from(&error)),
            error: Some(error),
            phase: Some(phase),
        };
        for nested in self.inner.events.emit(RouterEventKind::Error, &event) {
            error_log!("error listener failed: {}", nested);
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Router")
            .field("routes", &self.inner.routes.len())
            .field("url", &state.url.as_ref().map(Url::href))
            .field("active_url", &state.active_url)
            .field("history", &state.history.len())
            .finish()
    }
}
