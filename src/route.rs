//! Route definition and configuration
//!
//! A route map is written as a tree of [`RouteDef`]s. Building the router
//! flattens it into [`Route`]s, parents first, where every child inherits its
//! parent's URL prefix, models and access checks.

use crate::access::{AccessChecks, AccessResult, BoxedAccess, RouteAccess, SharedAccess};
use crate::emitter::{Emitter, Listener, ListenerId};
use crate::error::RouteError;
use crate::loader::{Loader, LoaderOptions, Model, ModelDef};
use crate::location::Url;
use crate::matcher::RoutePattern;
use crate::params::{Query, QueryValue, RouteParams};
use crate::request::Request;
use crate::trace_log;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Id given to the top level of the route map
pub const ROOT_ID: &str = "#__root__";

// ============================================================================
// Events
// ============================================================================

/// Per-route lifecycle events, in the order they fire within a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteEventKind {
    /// First activation, before `Init`
    BeforeInit,
    /// First activation
    Init,
    /// A new model snapshot was committed
    Model,
    /// The route joins the active chain
    RouteStart,
    /// The route stays in the active chain with a new request
    RouteChange,
    /// The route is part of a committed navigation
    Route,
    /// The route leaves the active chain
    RouteEnd,
}

impl RouteEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteEventKind::BeforeInit => "before-init",
            RouteEventKind::Init => "init",
            RouteEventKind::Model => "model",
            RouteEventKind::RouteStart => "route-start",
            RouteEventKind::RouteChange => "route-change",
            RouteEventKind::Route => "route",
            RouteEventKind::RouteEnd => "route-end",
        }
    }
}

impl fmt::Display for RouteEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a route event
#[derive(Debug, Clone)]
pub struct RouteEvent {
    pub kind: RouteEventKind,
    pub route_id: String,
    pub request: Request,
    pub params: RouteParams,
    /// The route's model snapshot
    pub model: Model,
}

// ============================================================================
// URL rules
// ============================================================================

pub type DecodeFn = Arc<dyn Fn(&str, &Request) -> String + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&str, &Request) -> bool + Send + Sync>;
pub type QueryValidateFn = Arc<dyn Fn(Option<&QueryValue>, &Request) -> bool + Send + Sync>;

/// Post-processing for one path parameter
#[derive(Clone, Default)]
pub struct ParamRule {
    decode: Option<DecodeFn>,
    validate: Option<ValidateFn>,
}

impl ParamRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform the matched value
    #[must_use]
    pub fn decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(&str, &Request) -> String + Send + Sync + 'static,
    {
        self.decode = Some(Arc::new(decode));
        self
    }

    /// Reject the candidate route when this returns false
    ///
    /// Runs on the decoded value.
    #[must_use]
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&str, &Request) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }
}

/// Validation of one query key
#[derive(Clone)]
pub struct QueryRule {
    validate: QueryValidateFn,
}

impl QueryRule {
    pub fn new<F>(validate: F) -> Self
    where
        F: Fn(Option<&QueryValue>, &Request) -> bool + Send + Sync + 'static,
    {
        Self {
            validate: Arc::new(validate),
        }
    }

    /// The key must be present
    pub fn required() -> Self {
        Self::new(|value, _| value.is_some())
    }
}

/// URL pattern with optional per-param and per-query rules
///
/// # Example
///
/// ```
/// use route_pilot::{ParamRule, QueryRule, UrlPattern};
///
/// let pattern = UrlPattern::new("/users/:id")
///     .param("id", ParamRule::new().validate(|id, _| id.parse::<u32>().is_ok()))
///     .query("tab", QueryRule::required());
///
/// assert_eq!(pattern.pattern(), "/users/:id");
/// ```
#[derive(Clone, Default)]
pub struct UrlPattern {
    pattern: String,
    params: Vec<(String, ParamRule)>,
    query: Vec<(String, QueryRule)>,
}

impl UrlPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            params: Vec::new(),
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, rule: ParamRule) -> Self {
        self.params.push((name.into(), rule));
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, rule: QueryRule) -> Self {
        self.query.push((key.into(), rule));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl From<&str> for UrlPattern {
    fn from(pattern: &str) -> Self {
        UrlPattern::new(pattern)
    }
}

impl From<String> for UrlPattern {
    fn from(pattern: String) -> Self {
        UrlPattern::new(pattern)
    }
}

impl fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlPattern")
            .field("pattern", &self.pattern)
            .field(
                "params",
                &self.params.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field(
                "query",
                &self.query.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A compiled pattern plus the rules that filter its matches
#[derive(Clone)]
struct CompiledUrl {
    pattern: RoutePattern,
    params: Vec<(String, ParamRule)>,
    query: Vec<(String, QueryRule)>,
}

impl CompiledUrl {
    fn compile(
        source: &str,
        params: Vec<(String, ParamRule)>,
        query: Vec<(String, QueryRule)>,
    ) -> Result<Self, RouteError> {
        Ok(Self {
            pattern: RoutePattern::compile(source)?,
            params,
            query,
        })
    }

    /// Structural match followed by decode/validate rules
    fn resolve(&self, url: &Url, request: &Request) -> Option<RouteParams> {
        let mut params = self.pattern.matches(url.pathname())?;

        for (name, rule) in &self.params {
            let Some(raw) = params.get(name).map(str::to_string) else {
                continue;
            };
            let value = match &rule.decode {
                Some(decode) => decode(&raw, request),
                None => raw,
            };
            if let Some(validate) = &rule.validate {
                if !validate(&value, request) {
                    trace_log!("param '{}' rejected by '{}'", name, self.pattern.source());
                    return None;
                }
            }
            params.insert(name.clone(), value);
        }

        for (key, rule) in &self.query {
            if !(rule.validate)(url.query().get(key), request) {
                trace_log!("query '{}' rejected by '{}'", key, self.pattern.source());
                return None;
            }
        }

        Some(params)
    }
}

// ============================================================================
// RouteDef
// ============================================================================

/// Declarative route node
///
/// # Example
///
/// ```
/// use route_pilot::{ModelDef, RouteDef};
/// use serde_json::json;
///
/// let map = RouteDef::default()
///     .route("#index", RouteDef::new("/"))
///     .route(
///         "#user",
///         RouteDef::new("/users/:id")
///             .model("user", ModelDef::sync(|request| json!(request.param("id"))))
///             .route("#posts", RouteDef::new("posts")),
///     );
/// ```
#[derive(Default)]
pub struct RouteDef {
    url: Option<UrlPattern>,
    models: Vec<(String, ModelDef)>,
    loader_options: Option<LoaderOptions>,
    access: Vec<BoxedAccess>,
    aliases: Vec<(String, UrlPattern)>,
    handlers: Vec<(RouteEventKind, Listener<RouteEvent>)>,
    children: Vec<(String, RouteDef)>,
}

impl RouteDef {
    /// Route with a URL pattern, relative to the parent's
    pub fn new(url: impl Into<UrlPattern>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<UrlPattern>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Declare a named model
    #[must_use]
    pub fn model(mut self, name: impl Into<String>, model: ModelDef) -> Self {
        self.models.push((name.into(), model));
        self
    }

    #[must_use]
    pub fn loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader_options = Some(options);
        self
    }

    /// Add an access check; several checks must all allow
    #[must_use]
    pub fn access<A: RouteAccess>(mut self, access: A) -> Self {
        self.access.push(crate::access::boxed(access));
        self
    }

    /// Alternate pattern resolving to this route, recorded as `request.alias`
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>, url: impl Into<UrlPattern>) -> Self {
        self.aliases.push((name.into(), url.into()));
        self
    }

    /// Register a lifecycle handler
    #[must_use]
    pub fn on<F>(mut self, kind: RouteEventKind, handler: F) -> Self
    where
        F: Fn(&RouteEvent) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.handlers.push((kind, Arc::new(handler)));
        self
    }

    /// Add a child route; ids start with `#`
    #[must_use]
    pub fn route(mut self, id: impl Into<String>, child: RouteDef) -> Self {
        self.children.push((id.into(), child));
        self
    }
}

impl fmt::Debug for RouteDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDef")
            .field("url", &self.url)
            .field(
                "models",
                &self.models.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("access", &self.access.len())
            .field(
                "aliases",
                &self.aliases.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field(
                "children",
                &self.children.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// Route
// ============================================================================

#[derive(Debug, Default)]
struct RouteState {
    active: bool,
    inited: bool,
    model: Model,
    params: RouteParams,
    request: Option<Request>,
}

/// A routing node built from a [`RouteDef`]
pub struct Route {
    id: String,
    url: CompiledUrl,
    aliases: Vec<(String, CompiledUrl)>,
    parent_id: Option<String>,
    /// Root first
    ancestors: Vec<String>,
    is_group: bool,
    loader: Loader,
    access: Option<SharedAccess>,
    events: Emitter<RouteEventKind, RouteEvent>,
    state: Mutex<RouteState>,
}

impl Route {
    fn from_def(
        id: String,
        def: RouteDef,
        parent: Option<&Route>,
    ) -> Result<(Self, Vec<(String, RouteDef)>), RouteError> {
        let RouteDef {
            url,
            models,
            loader_options,
            access,
            aliases,
            handlers,
            children,
        } = def;

        let own = url.unwrap_or_default();
        let base = parent.map(|p| p.url.pattern.source());
        let source = match base {
            Some(base) => build_child_path(base, &own.pattern).into_owned(),
            None if own.pattern.is_empty() => "/".to_string(),
            None => own.pattern.clone(),
        };

        let mut param_rules = parent.map(|p| p.url.params.clone()).unwrap_or_default();
        param_rules.extend(own.params);
        let mut query_rules = parent.map(|p| p.url.query.clone()).unwrap_or_default();
        query_rules.extend(own.query);

        let compiled = CompiledUrl::compile(&source, param_rules, query_rules)?;

        let aliases = aliases
            .into_iter()
            .map(|(name, alias)| {
                let source = build_child_path(base.unwrap_or("/"), &alias.pattern).into_owned();
                let mut params = compiled.params.clone();
                params.extend(alias.params);
                let mut query = compiled.query.clone();
                query.extend(alias.query);
                CompiledUrl::compile(&source, params, query).map(|url| (name, url))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let loader = match parent {
            Some(parent) => parent.loader.extend_with(models, loader_options),
            None => Loader::new(models, loader_options.unwrap_or_default()),
        };

        let access: Option<SharedAccess> = if access.is_empty() {
            parent.and_then(|p| p.access.clone())
        } else {
            Some(Arc::new(AccessChecks::new(access)) as SharedAccess)
        };

        let ancestors = parent
            .map(|p| {
                let mut ancestors = p.ancestors.clone();
                ancestors.push(p.id.clone());
                ancestors
            })
            .unwrap_or_default();

        let events = Emitter::new();
        for (kind, handler) in handlers {
            events.register(kind, false, handler);
        }

        let route = Self {
            is_group: !children.is_empty(),
            parent_id: parent.map(|p| p.id.clone()),
            id,
            url: compiled,
            aliases,
            ancestors,
            loader,
            access,
            events,
            state: Mutex::new(RouteState::default()),
        };

        Ok((route, children))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Ancestor ids, root first
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Groups only contribute a prefix and models, they are never navigated to
    pub fn is_group(&self) -> bool {
        self.is_group
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.url.pattern
    }

    pub fn alias_names(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(|(name, _)| name.as_str())
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// True for this route and for any of its ancestors
    pub fn is(&self, id: &str) -> bool {
        self.id == id || self.ancestors.iter().any(|ancestor| ancestor == id)
    }

    /// Whether the route is in the active chain
    pub fn active(&self) -> bool {
        self.state.lock().active
    }

    /// Params of the last committed request
    pub fn params(&self) -> RouteParams {
        self.state.lock().params.clone()
    }

    /// Model of the last successful commit
    pub fn model(&self) -> Model {
        self.state.lock().model.clone()
    }

    /// Last committed request that activated this route
    pub fn request(&self) -> Option<Request> {
        self.state.lock().request.clone()
    }

    /// Match `url`, filling in `request.params` and `request.alias`
    ///
    /// The main pattern wins over aliases. A rule rejection falls through to
    /// the next alias.
    pub fn matches(&self, url: &Url, request: &mut Request) -> bool {
        if let Some(params) = self.url.resolve(url, request) {
            trace_log!("route '{}' matched '{}'", self.id, url.pathname());
            request.params = params;
            request.alias = None;
            return true;
        }

        for (name, alias) in &self.aliases {
            if let Some(params) = alias.resolve(url, request) {
                trace_log!(
                    "route '{}' matched '{}' as alias '{}'",
                    self.id,
                    url.pathname(),
                    name
                );
                request.params = params;
                request.alias = Some(name.clone());
                return true;
            }
        }

        false
    }

    /// Run the inherited access checks
    pub fn access(&self, request: &Request) -> BoxFuture<'static, AccessResult> {
        match &self.access {
            Some(access) => access.check(request),
            None => future::ready(AccessResult::Allow).boxed(),
        }
    }

    /// Fetch this route's models, including inherited ones
    pub fn fetch(
        &self,
        request: Request,
    ) -> BoxFuture<'static, Result<Option<Model>, RouteError>> {
        self.loader.fetch(request)
    }

    /// Build a path (plus query) for this route
    pub fn get_url(&self, params: &RouteParams, query: Option<&Query>) -> Result<String, RouteError> {
        let path = self.url.pattern.build(params)?;
        Ok(match query.filter(|query| !query.is_empty()) {
            Some(query) => format!("{path}?{query}"),
            None => path,
        })
    }

    pub fn on<F>(&self, kind: RouteEventKind, handler: F) -> ListenerId
    where
        F: Fn(&RouteEvent) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn one<F>(&self, kind: RouteEventKind, handler: F) -> ListenerId
    where
        F: Fn(&RouteEvent) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.events.one(kind, handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ========================================================================
    // Commit handling
    // ========================================================================

    /// Join or stay in the active chain with a committed request
    ///
    /// Stops early once the request carries a redirect. Returns listener
    /// errors with the phase they were raised in.
    pub(crate) fn enter(&self, request: &Request, flat: &Model) -> Vec<(RouteEventKind, RouteError)> {
        let (first, was_active) = {
            let mut state = self.state.lock();
            let first = !state.inited;
            let was_active = state.active;
            state.inited = true;
            state.active = true;
            state.model = self.loader.extract(flat);
            state.params = request.params.clone();
            state.request = Some(request.clone());
            (first, was_active)
        };

        let mut phases = Vec::with_capacity(5);
        if first {
            phases.push(RouteEventKind::BeforeInit);
            phases.push(RouteEventKind::Init);
        }
        phases.push(RouteEventKind::Model);
        phases.push(if was_active {
            RouteEventKind::RouteChange
        } else {
            RouteEventKind::RouteStart
        });
        phases.push(RouteEventKind::Route);

        let mut errors = Vec::new();
        for kind in phases {
            errors.extend(self.emit(kind, request));
            if request.redirect_href().is_some() {
                break;
            }
        }
        errors
    }

    /// Leave the active chain; no-op for inactive routes
    pub(crate) fn leave(&self, request: &Request) -> Vec<(RouteEventKind, RouteError)> {
        let was_active = std::mem::replace(&mut self.state.lock().active, false);
        if was_active {
            self.emit(RouteEventKind::RouteEnd, request)
        } else {
            Vec::new()
        }
    }

    /// Replace the model snapshot outside of a navigation
    pub(crate) fn refresh_model(
        &self,
        request: &Request,
        flat: &Model,
    ) -> Vec<(RouteEventKind, RouteError)> {
        self.state.lock().model = self.loader.extract(flat);
        self.emit(RouteEventKind::Model, request)
    }

    fn emit(&self, kind: RouteEventKind, request: &Request) -> Vec<(RouteEventKind, RouteError)> {
        let event = {
            let state = self.state.lock();
            RouteEvent {
                kind,
                route_id: self.id.clone(),
                request: request.clone(),
                params: state.params.clone(),
                model: state.model.clone(),
            }
        };

        self.events
            .emit(kind, &event)
            .into_iter()
            .filter_map(|error| match error {
                RouteError::Redirect { href } => {
                    request.set_redirect(href);
                    None
                }
                other => Some((kind, other)),
            })
            .collect()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("pattern", &self.url.pattern.source())
            .field("parent_id", &self.parent_id)
            .field("is_group", &self.is_group)
            .field("aliases", &self.alias_names().collect::<Vec<_>>())
            .field("loader", &self.loader)
            .field("active", &self.active())
            .finish()
    }
}

// ============================================================================
// Tree building
// ============================================================================

/// Check that a route id carries the `#` marker
pub fn validate_route_id(id: &str) -> Result<(), RouteError> {
    let valid = id.len() > 1 && id.starts_with('#') && !id.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(RouteError::InvalidRouteId { id: id.to_string() })
    }
}

/// Flatten a route map, parents before their children
pub(crate) fn build_tree(root: RouteDef) -> Result<Vec<Arc<Route>>, RouteError> {
    let mut routes = Vec::new();
    let mut seen = HashSet::new();
    add_route(ROOT_ID.to_string(), root, None, &mut routes, &mut seen)?;
    Ok(routes)
}

fn add_route(
    id: String,
    def: RouteDef,
    parent: Option<&Arc<Route>>,
    routes: &mut Vec<Arc<Route>>,
    seen: &mut HashSet<String>,
) -> Result<(), RouteError> {
    validate_route_id(&id)?;
    if !seen.insert(id.clone()) {
        return Err(RouteError::DuplicateRoute { id });
    }

    let (route, children) = Route::from_def(id, def, parent.map(Arc::as_ref))?;
    let route = Arc::new(route);
    routes.push(Arc::clone(&route));

    for (child_id, child) in children {
        add_route(child_id, child, Some(&route), routes, seen)?;
    }
    Ok(())
}

/// Join a parent pattern and a child pattern
///
/// Child patterns are always relative to their parent.
///
/// # Example
///
/// ```
/// use route_pilot::build_child_path;
///
/// assert_eq!(build_child_path("/:foo", "bar"), "/:foo/bar");
/// assert_eq!(build_child_path("/", "/users"), "/users");
/// assert_eq!(build_child_path("/", ""), "/");
/// ```
pub fn build_child_path<'a>(parent_path: &'a str, child_path: &'a str) -> Cow<'a, str> {
    let parent = parent_path.trim_end_matches('/');
    let child = child_path.trim_start_matches('/');

    if child.is_empty() {
        if parent.is_empty() {
            Cow::Borrowed("/")
        } else if parent == parent_path {
            Cow::Borrowed(parent_path)
        } else {
            Cow::Owned(parent.to_string())
        }
    } else if parent.is_empty() {
        Cow::Owned(format!("/{}", child))
    } else {
        Cow::Owned(format!("{}/{}", parent, child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::access_fn;
    use crate::request::NavDetails;
    use serde_json::json;

    fn request(href: &str) -> (Url, Request) {
        let url = Url::parse(href, None).unwrap();
        let request = Request::new(url.clone(), None, NavDetails::new());
        (url, request)
    }

    fn tree(root: RouteDef) -> Vec<Arc<Route>> {
        build_tree(root).unwrap()
    }

    fn find<'a>(routes: &'a [Arc<Route>], id: &str) -> &'a Arc<Route> {
        routes.iter().find(|route| route.id() == id).unwrap()
    }

    #[test]
    fn test_build_child_path() {
        assert_eq!(build_child_path("/dashboard", "settings"), "/dashboard/settings");
        assert_eq!(build_child_path("/dashboard/", "/settings"), "/dashboard/settings");
        assert_eq!(build_child_path("/dashboard", ""), "/dashboard");
        assert_eq!(build_child_path("", "x"), "/x");
        assert_eq!(build_child_path("/", ""), "/");
    }

    #[test]
    fn test_route_id_validation() {
        assert!(validate_route_id("#home").is_ok());
        assert!(validate_route_id("home").is_err());
        assert!(validate_route_id("#").is_err());
        assert!(validate_route_id("#a b").is_err());
    }

    #[test]
    fn test_tree_is_flattened_parents_first() {
        let routes = tree(
            RouteDef::default()
                .route("#a", RouteDef::new("/a").route("#a1", RouteDef::new("one")))
                .route("#b", RouteDef::new("/b")),
        );

        let ids: Vec<_> = routes.iter().map(|route| route.id()).collect();
        assert_eq!(ids, vec![ROOT_ID, "#a", "#a1", "#b"]);

        let a1 = find(&routes, "#a1");
        assert_eq!(a1.pattern().source(), "/a/one");
        assert_eq!(a1.parent_id(), Some("#a"));
        assert!(a1.is("#a"));
        assert!(a1.is(ROOT_ID));
        assert!(!a1.is("#b"));
        assert!(find(&routes, "#a").is_group());
        assert!(!a1.is_group());
    }

    #[test]
    fn test_structural_errors() {
        let duplicate = build_tree(
            RouteDef::default()
                .route("#a", RouteDef::new("/a"))
                .route("#a", RouteDef::new("/b")),
        );
        assert_eq!(
            duplicate.unwrap_err(),
            RouteError::DuplicateRoute {
                id: "#a".to_string()
            }
        );

        let bad_id = build_tree(RouteDef::default().route("a", RouteDef::new("/a")));
        assert!(matches!(bad_id, Err(RouteError::InvalidRouteId { .. })));

        let bad_pattern = build_tree(RouteDef::default().route("#a", RouteDef::new("/a(")));
        assert!(matches!(bad_pattern, Err(RouteError::InvalidPattern { .. })));
    }

    #[test]
    fn test_child_without_url_inherits_parent_url() {
        let routes = tree(RouteDef::default().route(
            "#section",
            RouteDef::new("/section").route("#default", RouteDef::default()),
        ));
        assert_eq!(find(&routes, "#default").pattern().source(), "/section");
    }

    #[test]
    fn test_matches_records_params() {
        let routes = tree(RouteDef::default().route("#user", RouteDef::new("/users/:id")));
        let user = find(&routes, "#user");

        let (url, mut request) = self::request("/users/42");
        assert!(user.matches(&url, &mut request));
        assert_eq!(request.param("id"), Some("42"));
        assert_eq!(request.alias, None);
    }

    #[test]
    fn test_rules_decode_then_validate() {
        let routes = tree(RouteDef::default().route(
            "#user",
            RouteDef::new(
                UrlPattern::new("/users/:name")
                    .param(
                        "name",
                        ParamRule::new()
                            .decode(|value, _| value.to_uppercase())
                            .validate(|value, _| value.chars().all(|c| c.is_ascii_uppercase())),
                    )
                    .query(
                        "page",
                        QueryRule::new(|value, _| match value {
                            None => true,
                            Some(value) => value.as_str().is_some_and(|v| v.parse::<u32>().is_ok()),
                        }),
                    ),
            ),
        ));
        let user = find(&routes, "#user");

        let (url, mut request) = self::request("/users/ada");
        assert!(user.matches(&url, &mut request));
        assert_eq!(request.param("name"), Some("ADA"));

        let (url, mut request) = self::request("/users/ada1");
        assert!(!user.matches(&url, &mut request));

        let (url, mut request) = self::request("/users/ada?page=x");
        assert!(!user.matches(&url, &mut request));
    }

    #[test]
    fn test_alias_matching() {
        let routes = tree(RouteDef::default().route(
            "#index",
            RouteDef::new("/:folder?").alias("compose", "/compose/:folder?/:id?"),
        ));
        let index = find(&routes, "#index");

        let (url, mut request) = self::request("/compose/inbox");
        assert!(index.matches(&url, &mut request));
        assert_eq!(request.alias.as_deref(), Some("compose"));
        assert_eq!(
            request.params,
            [("folder", "inbox")].into_iter().collect::<RouteParams>()
        );

        let (url, mut request) = self::request("/inbox");
        assert!(index.matches(&url, &mut request));
        assert_eq!(request.alias, None);
    }

    #[test]
    fn test_get_url() {
        let routes = tree(RouteDef::default().route("#user", RouteDef::new("/users/:id")));
        let user = find(&routes, "#user");

        let params: RouteParams = [("id", "7")].into_iter().collect();
        assert_eq!(user.get_url(&params, None).unwrap(), "/users/7");

        let query = Query::new().with("tab", "posts");
        assert_eq!(
            user.get_url(&params, Some(&query)).unwrap(),
            "/users/7?tab=posts"
        );

        assert!(matches!(
            user.get_url(&RouteParams::new(), None),
            Err(RouteError::PatternBuild { .. })
        ));
    }

    #[test]
    fn test_models_and_access_are_inherited() {
        let routes = tree(
            RouteDef::default()
                .model("session", ModelDef::value(json!("s")))
                .access(access_fn(|_| async { AccessResult::deny("closed") }))
                .route(
                    "#child",
                    RouteDef::new("/child").model("page", ModelDef::value(json!(1))),
                )
                .route(
                    "#open",
                    RouteDef::new("/open").access(access_fn(|_| async { AccessResult::allow() })),
                ),
        );

        let child = find(&routes, "#child");
        assert_eq!(child.loader().names().collect::<Vec<_>>(), vec!["session", "page"]);

        let (_, request) = request("/child");
        assert!(pollster::block_on(child.access(&request)).is_deny());
        assert!(pollster::block_on(find(&routes, "#open").access(&request)).is_allow());
    }

    #[test]
    fn test_enter_and_leave_event_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut def = RouteDef::new("/page");
        for kind in [
            RouteEventKind::BeforeInit,
            RouteEventKind::Init,
            RouteEventKind::Model,
            RouteEventKind::RouteStart,
            RouteEventKind::RouteChange,
            RouteEventKind::Route,
            RouteEventKind::RouteEnd,
        ] {
            let seen = Arc::clone(&seen);
            def = def.on(kind, move |event| {
                seen.lock().push(event.kind.as_str());
                Ok(())
            });
        }
        let routes = tree(RouteDef::default().route("#page", def));
        let page = find(&routes, "#page");
        let (_, request) = request("/page");

        assert!(page.enter(&request, &Model::new()).is_empty());
        assert!(page.active());
        page.enter(&request, &Model::new());
        page.leave(&request);
        page.leave(&request);

        assert_eq!(
            *seen.lock(),
            vec![
                "before-init",
                "init",
                "model",
                "route-start",
                "route",
                "model",
                "route-change",
                "route",
                "route-end",
            ]
        );
        assert!(!page.active());
    }

    #[test]
    fn test_listener_redirect_stops_enter() {
        let routes = tree(RouteDef::default().route(
            "#old",
            RouteDef::new("/old")
                .on(RouteEventKind::Init, |_| Err(RouteError::redirect("/new")))
                .on(RouteEventKind::Model, |_| Err(RouteError::custom(500, "unreachable"))),
        ));
        let old = find(&routes, "#old");
        let (_, request) = request("/old");

        let errors = old.enter(&request, &Model::new());
        assert!(errors.is_empty());
        assert_eq!(request.redirect_href(), Some("/new"));
    }

    #[test]
    fn test_listener_errors_carry_phase() {
        let routes = tree(RouteDef::default().route(
            "#page",
            RouteDef::new("/page").on(RouteEventKind::RouteStart, |_| {
                Err(RouteError::custom(500, "boom"))
            }),
        ));
        let (_, request) = request("/page");

        let errors = find(&routes, "#page").enter(&request, &Model::new());
        assert_eq!(
            errors,
            vec![(RouteEventKind::RouteStart, RouteError::custom(500, "boom"))]
        );
    }
}
