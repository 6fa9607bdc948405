//! Named model loading
//!
//! A [`Loader`] maps model names to [`ModelDef`]s. Fetching runs every model of
//! the loader concurrently for one request; models can depend on each other
//! through [`WaitFor`]. Each fetch goes through the loader's [`ActionQueue`],
//! so application actions and navigation fetches never overlap.

use crate::action_queue::{Action, ActionQueue, ItemId};
use crate::error::RouteError;
use crate::request::Request;
use crate::{debug_log, trace_log};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

/// Flat name -> value model
pub type Model = Map<String, Value>;

/// Future of one model value
pub type ModelFuture = BoxFuture<'static, Result<Value, RouteError>>;

pub type FetchFn = Arc<dyn Fn(Request, WaitFor, Action) -> ModelFuture + Send + Sync>;

/// `(route_id, request) -> bool`
pub type MatchFn = Arc<dyn Fn(&str, &Request) -> bool + Send + Sync>;

/// `(model_name, error, request, partial_model) -> replacement`
pub type ModelErrorHook =
    Arc<dyn Fn(&str, &RouteError, &Request, &Model) -> Option<Value> + Send + Sync>;

/// Post-processes a completed batch
pub type ProcessingHook = Arc<dyn Fn(&Request, &Action, Model) -> Model + Send + Sync>;

type SharedBatch = Shared<BoxFuture<'static, Result<Model, RouteError>>>;

// ============================================================================
// Model definitions
// ============================================================================

/// How one named model is obtained
#[derive(Clone)]
pub struct ModelDef {
    fetch: Option<FetchFn>,
    defaults: Value,
    matcher: Option<MatchFn>,
}

impl ModelDef {
    /// Model fetched asynchronously
    ///
    /// # Example
    ///
    /// ```
    /// use route_pilot::ModelDef;
    /// use serde_json::json;
    ///
    /// let user = ModelDef::fetch(|request, _wait_for, _action| async move {
    ///     Ok(json!({ "id": request.param("id") }))
    /// });
    /// ```
    pub fn fetch<F, Fut>(fetch: F) -> Self
    where
        F: Fn(Request, WaitFor, Action) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RouteError>> + Send + 'static,
    {
        Self {
            fetch: Some(Arc::new(move |request, wait_for, action| {
                fetch(request, wait_for, action).boxed()
            })),
            defaults: Value::Null,
            matcher: None,
        }
    }

    /// Model computed synchronously from the request
    pub fn sync<F>(compute: F) -> Self
    where
        F: Fn(&Request) -> Value + Send + Sync + 'static,
    {
        Self {
            fetch: Some(Arc::new(move |request, _, _| {
                future::ready(Ok(compute(&request))).boxed()
            })),
            defaults: Value::Null,
            matcher: None,
        }
    }

    /// Constant model
    pub fn value(value: Value) -> Self {
        Self {
            fetch: None,
            defaults: value,
            matcher: None,
        }
    }

    /// Value used when the model is skipped
    #[must_use]
    pub fn defaults(mut self, defaults: Value) -> Self {
        self.defaults = defaults;
        self
    }

    /// Only fetch when `matcher(route_id, request)` holds
    #[must_use]
    pub fn when<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str, &Request) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(matcher));
        self
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("fetch", &self.fetch.is_some())
            .field("defaults", &self.defaults)
            .field("matcher", &self.matcher.is_some())
            .finish()
    }
}

/// Loader configuration
#[derive(Clone, Default)]
pub struct LoaderOptions {
    /// Share in-flight fetches of the same href and action
    pub persist: bool,
    pub processing_model_error: Option<ModelErrorHook>,
    pub processing: Option<ProcessingHook>,
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Recover from a failing model by returning a replacement value
    #[must_use]
    pub fn on_model_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &RouteError, &Request, &Model) -> Option<Value> + Send + Sync + 'static,
    {
        self.processing_model_error = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn processing<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, &Action, Model) -> Model + Send + Sync + 'static,
    {
        self.processing = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("persist", &self.persist)
            .field(
                "processing_model_error",
                &self.processing_model_error.is_some(),
            )
            .field("processing", &self.processing.is_some())
            .finish()
    }
}

// ============================================================================
// Batches
// ============================================================================

/// Handle for awaiting sibling models of the same batch
#[derive(Clone)]
pub struct WaitFor {
    batch: Weak<Batch>,
}

impl WaitFor {
    /// Resolve another model of this batch
    ///
    /// Every model runs at most once per batch, however many times it is
    /// awaited. Names the loader does not declare fail with
    /// [`RouteError::UnknownModel`].
    pub fn get(&self, name: &str) -> ModelFuture {
        match self.batch.upgrade() {
            Some(batch) => batch.model(name),
            None => future::ready(Err(RouteError::custom(
                500,
                format!("model '{name}' requested after its batch settled"),
            )))
            .boxed(),
        }
    }
}

impl fmt::Debug for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitFor").finish_non_exhaustive()
    }
}

struct Batch {
    models: Arc<Vec<(String, ModelDef)>>,
    options: Arc<LoaderOptions>,
    request: Request,
    action: Action,
    started: Mutex<HashMap<String, Shared<ModelFuture>>>,
    partial: Arc<Mutex<Model>>,
}

impl Batch {
    fn model(self: &Arc<Self>, name: &str) -> ModelFuture {
        let mut started = self.started.lock();
        if let Some(shared) = started.get(name) {
            return shared.clone().boxed();
        }

        let Some(def) = self
            .models
            .iter()
            .find(|(model, _)| model == name)
            .map(|(_, def)| def.clone())
        else {
            return future::ready(Err(RouteError::UnknownModel {
                name: name.to_string(),
            }))
            .boxed();
        };

        let shared = self.run(name.to_string(), def).shared();
        started.insert(name.to_string(), shared.clone());
        shared.boxed()
    }

    fn run(self: &Arc<Self>, name: String, def: ModelDef) -> ModelFuture {
        let wait_for = WaitFor {
            batch: Arc::downgrade(self),
        };
        let request = self.request.clone();
        let action = self.action.clone();
        let options = Arc::clone(&self.options);
        let partial = Arc::clone(&self.partial);

        async move {
            let route_id = request.route_id.clone().unwrap_or_default();
            let matched = def
                .matcher
                .as_ref()
                .map_or(true, |matcher| matcher(&route_id, &request));

            let result = match &def.fetch {
                Some(fetch) if matched => fetch(request.clone(), wait_for, action).await,
                _ => {
                    trace_log!("model '{}' uses its defaults", name);
                    Ok(def.defaults.clone())
                }
            };

            let value = match result {
                Ok(value) => value,
                Err(error) if error.is_redirect() => return Err(error),
                Err(error) => {
                    let snapshot = partial.lock().clone();
                    let replacement = options
                        .processing_model_error
                        .as_ref()
                        .and_then(|hook| hook(&name, &error, &request, &snapshot));
                    match replacement {
                        Some(value) => {
                            debug_log!("model '{}' recovered from: {}", name, error);
                            value
                        }
                        None => return Err(error),
                    }
                }
            };

            partial.lock().insert(name, value.clone());
            Ok(value)
        }
        .boxed()
    }
}

async fn run_batch(
    models: Arc<Vec<(String, ModelDef)>>,
    options: Arc<LoaderOptions>,
    request: Request,
    action: Action,
) -> Result<Model, RouteError> {
    let batch = Arc::new(Batch {
        models: Arc::clone(&models),
        options: Arc::clone(&options),
        request: request.clone(),
        action: action.clone(),
        started: Mutex::new(HashMap::new()),
        partial: Arc::new(Mutex::new(Model::new())),
    });

    let pending: Vec<_> = models.iter().map(|(name, _)| batch.model(name)).collect();
    let values = future::try_join_all(pending).await?;

    let model: Model = models
        .iter()
        .map(|(name, _)| name.clone())
        .zip(values)
        .collect();

    Ok(match &options.processing {
        Some(processing) => processing(&request, &action, model),
        None => model,
    })
}

// ============================================================================
// Loader
// ============================================================================

struct LoaderState {
    last_key: u64,
    queue: ActionQueue<Result<Model, RouteError>>,
    turns: HashMap<ItemId, oneshot::Sender<()>>,
    persisted: HashMap<String, (u64, WeakShared<BoxFuture<'static, Result<Model, RouteError>>>)>,
    persist_generation: u64,
}

impl LoaderState {
    /// Hand out turns to every item that may start now
    fn flush(&mut self) {
        while let Some(item) = self.queue.poll() {
            trace_log!("action '{}' #{} started", item.action.kind, item.id);
            if let Some(turn) = self.turns.remove(&item.id) {
                let _ = turn.send(());
            }
        }
    }
}

/// Releases a queue slot if the fetch is dropped before it ends
struct QueueSlot {
    state: Arc<Mutex<LoaderState>>,
    id: ItemId,
    ended: bool,
}

impl QueueSlot {
    fn end(mut self, result: Result<Model, RouteError>) {
        self.ended = true;
        let mut state = self.state.lock();
        state.queue.notify_end(self.id, Some(result));
        state.flush();
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if !self.ended {
            let mut state = self.state.lock();
            state.turns.remove(&self.id);
            state.queue.remove(self.id);
            state.flush();
        }
    }
}

/// Named model fetcher for one route
#[derive(Clone)]
pub struct Loader {
    models: Arc<Vec<(String, ModelDef)>>,
    options: Arc<LoaderOptions>,
    state: Arc<Mutex<LoaderState>>,
}

impl Loader {
    pub fn new<I, S>(models: I, options: LoaderOptions) -> Self
    where
        I: IntoIterator<Item = (S, ModelDef)>,
        S: Into<String>,
    {
        let mut list: Vec<(String, ModelDef)> = Vec::new();
        for (name, def) in models {
            upsert(&mut list, name.into(), def);
        }
        Self::from_parts(list, options)
    }

    fn from_parts(models: Vec<(String, ModelDef)>, options: LoaderOptions) -> Self {
        Self {
            models: Arc::new(models),
            options: Arc::new(options),
            state: Arc::new(Mutex::new(LoaderState {
                last_key: 0,
                queue: ActionQueue::new(),
                turns: HashMap::new(),
                persisted: HashMap::new(),
                persist_generation: 0,
            })),
        }
    }

    /// New loader with the union of both model sets
    ///
    /// Names in `models` replace inherited ones. `self` is left untouched.
    pub fn extend<I, S>(&self, models: I) -> Self
    where
        I: IntoIterator<Item = (S, ModelDef)>,
        S: Into<String>,
    {
        self.extend_with(models, None)
    }

    /// Like [`Loader::extend`], optionally replacing the options
    pub fn extend_with<I, S>(&self, models: I, options: Option<LoaderOptions>) -> Self
    where
        I: IntoIterator<Item = (S, ModelDef)>,
        S: Into<String>,
    {
        let mut list = self.models.as_ref().clone();
        for (name, def) in models {
            upsert(&mut list, name.into(), def);
        }
        let options = options.unwrap_or_else(|| self.options.as_ref().clone());
        Self::from_parts(list, options)
    }

    /// Project this loader's models out of a larger model
    pub fn extract(&self, flat: &Model) -> Model {
        self.models
            .iter()
            .filter_map(|(name, _)| flat.get(name).map(|value| (name.clone(), value.clone())))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|(model, _)| model == name)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Fetch every model for a navigation
    ///
    /// Resolves to `Ok(None)` when a newer `fetch` on this loader started
    /// before this one settled.
    pub fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Option<Model>, RouteError>> {
        let key = {
            let mut state = self.state.lock();
            state.last_key += 1;
            state.last_key
        };
        let pending = self.run(request, Action::navigate());
        let state = Arc::clone(&self.state);

        async move {
            let result = pending.await;
            if state.lock().last_key != key {
                trace_log!("loader fetch #{} is stale", key);
                return Ok(None);
            }
            result.map(Some)
        }
        .boxed()
    }

    /// Run every model for an application action
    pub fn dispatch(
        &self,
        request: Request,
        action: Action,
    ) -> BoxFuture<'static, Result<Model, RouteError>> {
        self.run(request, action)
    }

    fn run(&self, request: Request, action: Action) -> BoxFuture<'static, Result<Model, RouteError>> {
        if !self.options.persist {
            return self.enqueue(request, action);
        }

        let key = format!("{} {}", action.kind, request.href);
        let in_flight = self
            .state
            .lock()
            .persisted
            .get(&key)
            .and_then(|(_, weak)| weak.upgrade());

        if let Some(shared) = in_flight {
            trace_log!("joining in-flight fetch for {}", key);
            return shared.boxed();
        }

        let inner = self.enqueue(request, action);
        let mut state = self.state.lock();
        state.persist_generation += 1;
        let generation = state.persist_generation;
        let cleanup = Arc::downgrade(&self.state);
        let entry = key.clone();

        let shared: SharedBatch = async move {
            let result = inner.await;
            if let Some(state) = cleanup.upgrade() {
                let mut state = state.lock();
                if state
                    .persisted
                    .get(&entry)
                    .is_some_and(|(current, _)| *current == generation)
                {
                    state.persisted.remove(&entry);
                }
            }
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            state.persisted.insert(key, (generation, weak));
        }
        shared.boxed()
    }

    fn enqueue(&self, request: Request, action: Action) -> BoxFuture<'static, Result<Model, RouteError>> {
        let (id, turn) = {
            let mut state = self.state.lock();
            let id = state.queue.push(request.clone(), action.clone());
            let (tx, rx) = oneshot::channel();
            state.turns.insert(id, tx);
            state.flush();
            (id, rx)
        };

        let slot = QueueSlot {
            state: Arc::clone(&self.state),
            id,
            ended: false,
        };
        let models = Arc::clone(&self.models);
        let options = Arc::clone(&self.options);

        async move {
            // The sender only goes away together with the slot.
            let _ = turn.await;
            let result = run_batch(models, options, request, action).await;
            slot.end(result.clone());
            result
        }
        .boxed()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("models", &self.names().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::from_parts(Vec::new(), LoaderOptions::default())
    }
}

fn upsert(list: &mut Vec<(String, ModelDef)>, name: String, def: ModelDef) {
    match list.iter_mut().find(|(existing, _)| *existing == name) {
        Some(slot) => slot.1 = def,
        None => list.push((name, def)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Url;
    use crate::request::NavDetails;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(href: &str) -> Request {
        let mut request = Request::new(Url::parse(href, None).unwrap(), None, NavDetails::new());
        request.route_id = Some("#page".to_string());
        request
    }

    #[test]
    fn test_fetch_all_models() {
        let loader = Loader::new(
            [
                ("a", ModelDef::value(json!(1))),
                ("b", ModelDef::fetch(|_, _, _| async { Ok(json!("two")) })),
            ],
            LoaderOptions::new(),
        );

        let model = pollster::block_on(loader.fetch(request("/")))
            .unwrap()
            .unwrap();
        assert_eq!(model.get("a"), Some(&json!(1)));
        assert_eq!(model.get("b"), Some(&json!("two")));
    }

    #[test]
    fn test_unmatched_model_uses_defaults_without_fetching() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let loader = Loader::new(
            [(
                "inbox",
                ModelDef::fetch(move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(json!(["mail"])) }
                })
                .defaults(json!([]))
                .when(|route_id, _| route_id == "#inbox"),
            )],
            LoaderOptions::new(),
        );

        let model = pollster::block_on(loader.fetch(request("/")))
            .unwrap()
            .unwrap();
        assert_eq!(model.get("inbox"), Some(&json!([])));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_for_is_memoized_per_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let loader = Loader::new(
            [
                (
                    "user",
                    ModelDef::fetch(move |_, _, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async { Ok(json!({ "name": "ada" })) }
                    }),
                ),
                (
                    "greeting",
                    ModelDef::fetch(|_, wait_for, _| async move {
                        let user = wait_for.get("user").await?;
                        Ok(json!(format!("hello {}", user["name"].as_str().unwrap_or(""))))
                    }),
                ),
            ],
            LoaderOptions::new(),
        );

        let model = pollster::block_on(loader.fetch(request("/")))
            .unwrap()
            .unwrap();
        assert_eq!(model.get("greeting"), Some(&json!("hello ada")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_for_unknown_model_fails() {
        let loader = Loader::new(
            [(
                "a",
                ModelDef::fetch(|_, wait_for, _| async move { wait_for.get("missing").await }),
            )],
            LoaderOptions::new(),
        );

        let error = pollster::block_on(loader.fetch(request("/"))).unwrap_err();
        assert_eq!(
            error,
            RouteError::UnknownModel {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_model_failure_fails_fetch() {
        let loader = Loader::new(
            [
                ("ok", ModelDef::value(json!(true))),
                (
                    "broken",
                    ModelDef::fetch(|_, _, _| async { Err(RouteError::custom(503, "down")) }),
                ),
            ],
            LoaderOptions::new(),
        );

        let error = pollster::block_on(loader.fetch(request("/"))).unwrap_err();
        assert_eq!(error.status(), 503);
    }

    #[test]
    fn test_model_error_hook_replaces_value() {
        let loader = Loader::new(
            [(
                "broken",
                ModelDef::fetch(|_, _, _| async { Err(RouteError::custom(503, "down")) }),
            )],
            LoaderOptions::new().on_model_error(|name, error, _, _| {
                assert_eq!(name, "broken");
                Some(json!({ "error": error.status() }))
            }),
        );

        let model = pollster::block_on(loader.fetch(request("/")))
            .unwrap()
            .unwrap();
        assert_eq!(model.get("broken"), Some(&json!({ "error": 503 })));
    }

    #[test]
    fn test_processing_hook() {
        let loader = Loader::new(
            [("n", ModelDef::value(json!(2)))],
            LoaderOptions::new().processing(|_, action, mut model| {
                model.insert("action".to_string(), json!(action.kind));
                model
            }),
        );

        let model = pollster::block_on(loader.dispatch(request("/"), Action::new("refresh"))).unwrap();
        assert_eq!(model.get("action"), Some(&json!("refresh")));
    }

    #[test]
    fn test_stale_fetch_resolves_to_none() {
        let (release, gate) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate)));

        let loader = Loader::new(
            [(
                "slow",
                ModelDef::fetch(move |_, _, _| {
                    let gate = gate.lock().take();
                    async move {
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        Ok(json!("done"))
                    }
                }),
            )],
            LoaderOptions::new(),
        );

        let first = loader.fetch(request("/one"));
        let second = loader.fetch(request("/two"));
        let release = async move {
            let _ = release.send(());
        };

        let (first, second, ()) =
            pollster::block_on(async { futures::join!(first, second, release) });

        assert_eq!(first, Ok(None));
        assert!(second.unwrap().is_some());
    }

    #[test]
    fn test_persist_shares_in_flight_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let loader = Loader::new(
            [(
                "data",
                ModelDef::fetch(move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(json!(1)) }
                }),
            )],
            LoaderOptions::new().persist(true),
        );

        let a = loader.dispatch(request("/same"), Action::navigate());
        let b = loader.dispatch(request("/same"), Action::navigate());
        let (a, b) = pollster::block_on(async { futures::join!(a, b) });

        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // settled entries are dropped
        pollster::block_on(loader.dispatch(request("/same"), Action::navigate())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_extend_and_extract() {
        let base = Loader::new(
            [("a", ModelDef::value(json!(1))), ("b", ModelDef::value(json!(2)))],
            LoaderOptions::new(),
        );
        let child = base.extend([("b", ModelDef::value(json!(20))), ("c", ModelDef::value(json!(3)))]);

        assert_eq!(base.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(child.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let flat = pollster::block_on(child.fetch(request("/")))
            .unwrap()
            .unwrap();
        assert_eq!(flat.get("b"), Some(&json!(20)));

        let projected = base.extract(&flat);
        assert_eq!(projected.len(), 2);
        assert!(!projected.contains_key("c"));
    }

    #[test]
    fn test_action_waits_for_running_navigation() {
        let (release, gate) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate)));
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&order);
        let loader = Loader::new(
            [(
                "data",
                ModelDef::fetch(move |_, _, action| {
                    let gate = gate.lock().take();
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(format!("start {}", action.kind));
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        log.lock().push(format!("end {}", action.kind));
                        Ok(json!(action.kind))
                    }
                }),
            )],
            LoaderOptions::new(),
        );

        let navigation = loader.fetch(request("/"));
        let save = loader.dispatch(request("/"), Action::new("save"));
        let release = async move {
            let _ = release.send(());
        };

        pollster::block_on(async { futures::join!(navigation, save, release) });

        assert_eq!(
            *order.lock(),
            vec!["start navigate", "end navigate", "start save", "end save"]
        );
    }
}
