//! # Route Pilot
//!
//! A declarative navigation router with support for:
//!
//! - **Route Trees** - Nested route groups that share URL prefixes, models and access checks
//! - **Pattern Matching** - Named, optional and constrained params, optional groups, wildcards
//! - **Model Loaders** - Concurrent async model fetching with inter-model dependencies
//! - **Access Checks** - Allow, deny or redirect before any model is fetched
//! - **Lifecycle Events** - Router and per-route events with ordered synchronous delivery
//! - **Supersession** - Only the most recent navigation ever commits
//!
//! # Quick Start
//!
//! ```
//! use route_pilot::{create, ModelDef, RouteDef, RouteParams, UrlQuery};
//! use serde_json::json;
//!
//! let router = create(
//!     RouteDef::default()
//!         .route("#inbox", RouteDef::new("/:folder?"))
//!         .route(
//!             "#message",
//!             RouteDef::new("/messages/:id").model(
//!                 "message",
//!                 ModelDef::fetch(|request, _wait_for, _action| async move {
//!                     Ok(json!({ "id": request.param("id") }))
//!                 }),
//!             ),
//!         ),
//! )
//! .unwrap();
//!
//! pollster::block_on(router.nav("/messages/42")).unwrap();
//! assert_eq!(router.model()["message"]["id"], json!("42"));
//!
//! let params = RouteParams::new().with("folder", "sent");
//! let href = router.get_url("#inbox", &params, UrlQuery::Empty).unwrap();
//! assert_eq!(href, "/sent");
//! ```
//!
//! # Events
//!
//! ```
//! use route_pilot::{create, RouteDef, RouteEventKind, RouterEventKind};
//!
//! let router = create(RouteDef::default().route(
//!     "#home",
//!     RouteDef::new("/").on(RouteEventKind::RouteStart, |event| {
//!         println!("entered {}", event.route_id);
//!         Ok(())
//!     }),
//! ))
//! .unwrap();
//!
//! router.on(RouterEventKind::RouteFail, |event| {
//!     println!("navigation failed: {:?}", event.status);
//!     Ok(())
//! });
//! ```
//!
//! # Feature Flags
//!
//! - `cache` (default) - LRU cache of resolved routes
//! - `log` (default) - Uses the standard `log` crate for logging
//! - `tracing` - Uses the `tracing` crate for structured logging (mutually exclusive with `log`)

#![doc(html_root_url = "https://docs.rs/route-pilot/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
// Lints are configured in Cargo.toml [lints] section

// Logging abstraction
pub mod logging;

// Cache (optional)
#[cfg(feature = "cache")]
pub mod cache;

// Core routing modules
pub mod matcher;
pub mod route;
pub mod router;

// Navigation data
pub mod location;
pub mod params;
pub mod request;

// Models and actions
pub mod action_queue;
pub mod loader;

// Error handling
pub mod error;

// Access checks
pub mod access;

// Other modules
pub mod emitter;
pub mod history;

// Re-export main types for convenient access
pub use access::{
    access_fn, AccessChecks, AccessResult, BoxedAccess, FnAccess, NotAccess, RouteAccess,
};
pub use action_queue::{Action, ActionQueue, ItemId, Priority, QueueItem};
#[cfg(feature = "cache")]
pub use cache::{CacheStats, RouteCache};
pub use emitter::{Emitter, ListenerId};
pub use error::{NavigationResult, RouteError, Status};
pub use history::{History, HistoryEntry, HistoryEvent};
pub use loader::{Loader, LoaderOptions, Model, ModelDef, WaitFor};
pub use location::Url;
pub use matcher::{RoutePattern, Segment};
pub use params::{Query, QueryValue, RouteParams};
pub use request::{NavDetails, NavTarget, Request};
pub use route::{
    build_child_path, validate_route_id, ParamRule, QueryRule, Route, RouteDef, RouteEvent,
    RouteEventKind, UrlPattern, ROOT_ID,
};
pub use router::{create, NavFuture, Router, RouterEvent, RouterEventKind, RouterOptions, UrlQuery};

/// Navigation direction indicator.
///
/// Decides how a committed navigation is recorded in history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NavigationDirection {
    /// Navigating to a new entry
    #[default]
    Push,
    /// Replacing the current entry
    Replace,
    /// Navigating back in history
    Back,
    /// Navigating forward in history
    Forward,
}
