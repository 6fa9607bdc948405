//! Priority-aware action queue
//!
//! Loaders run navigation fetches and application actions through an
//! [`ActionQueue`]. Items are polled in FIFO order, and an item may only
//! start while nothing of a different priority is running.

use crate::request::Request;
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Scheduling class of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Navigation fetches
    #[default]
    Low,
    /// Application actions dispatched on the current route
    High,
}

/// An operation submitted to a loader
///
/// # Example
///
/// ```
/// use route_pilot::{Action, Priority};
///
/// let navigate = Action::navigate();
/// assert_eq!(navigate.priority, Priority::Low);
///
/// let save = Action::new("save").with_id("draft-1");
/// assert_eq!(save.priority, Priority::High);
/// assert_eq!(save.id.as_deref(), Some("draft-1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: String,
    pub priority: Priority,
    pub id: Option<String>,
    pub payload: Option<Value>,
}

impl Action {
    /// Kind used for navigation fetches
    pub const NAVIGATE: &'static str = "navigate";

    /// Create a high priority action
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            priority: Priority::High,
            id: None,
            payload: None,
        }
    }

    /// The low priority action every navigation fetch runs as
    pub fn navigate() -> Self {
        Self {
            priority: Priority::Low,
            ..Self::new(Self::NAVIGATE)
        }
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_navigate(&self) -> bool {
        self.kind == Self::NAVIGATE
    }
}

/// Identifier of a queued item, increasing with every push
pub type ItemId = u64;

/// A queued action
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: ItemId,
    pub request: Request,
    pub action: Action,
    pub timestamp: Instant,
}

/// FIFO queue that keeps different priorities from running concurrently
///
/// `R` is the result handed to [`ActionQueue::await_end`] waiters.
#[derive(Debug)]
pub struct ActionQueue<R> {
    queue: VecDeque<QueueItem>,
    running: HashMap<ItemId, Priority>,
    waiters: HashMap<ItemId, Vec<oneshot::Sender<Option<R>>>>,
    last_id: ItemId,
}

impl<R> ActionQueue<R>
where
    R: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            running: HashMap::new(),
            waiters: HashMap::new(),
            last_id: 0,
        }
    }

    /// Append an action and return its id
    pub fn push(&mut self, request: Request, action: Action) -> ItemId {
        self.last_id += 1;
        self.queue.push_back(QueueItem {
            id: self.last_id,
            request,
            action,
            timestamp: Instant::now(),
        });
        self.last_id
    }

    /// Drop an item whether it is queued or running
    ///
    /// The item is ended without a result so its waiters are released.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let queued = self.queue.len();
        self.queue.retain(|item| item.id != id);
        let found = queued != self.queue.len() || self.running.contains_key(&id);

        if found {
            self.notify_end(id, None);
        }
        found
    }

    /// Whether the head item may start now
    pub fn can_poll(&self) -> bool {
        match self.queue.front() {
            None => false,
            Some(head) => self
                .running
                .values()
                .all(|priority| *priority == head.priority()),
        }
    }

    /// Start the head item if [`ActionQueue::can_poll`] allows it
    pub fn poll(&mut self) -> Option<QueueItem> {
        if !self.can_poll() {
            return None;
        }
        let item = self.queue.pop_front()?;
        self.running.insert(item.id, item.action.priority);
        Some(item)
    }

    /// Mark an item as finished and wake its waiters
    pub fn notify_end(&mut self, id: ItemId, result: Option<R>) {
        self.running.remove(&id);
        self.queue.retain(|item| item.id != id);

        for waiter in self.waiters.remove(&id).unwrap_or_default() {
            let _ = waiter.send(result.clone());
        }
    }

    /// Wait until an item ends
    ///
    /// Resolves immediately with `None` for items that already ended.
    pub fn await_end(&mut self, id: ItemId) -> BoxFuture<'static, Option<R>> {
        if self.is_ended(id) {
            return future::ready(None).boxed();
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.entry(id).or_default().push(tx);
        rx.map(|result| result.ok().flatten()).boxed()
    }

    fn is_ended(&self, id: ItemId) -> bool {
        id <= self.last_id
            && !self.running.contains_key(&id) && !self.queue.iter().any(|item| item.id == id)
    }

    pub fn is_running(&self, id: ItemId) -> bool {
        self.running.contains_key(&id)
    }

    /// Number of queued, not yet polled items
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

impl<R> Default for ActionQueue<R>
where
    R: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl QueueItem {
    pub fn priority(&self) -> Priority {
        self.action.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Url;
    use crate::request::NavDetails;

    fn request() -> Request {
        Request::new(Url::parse("/", None).unwrap(), None, NavDetails::new())
    }

    #[test]
    fn test_can_poll_truth_table() {
        let mut queue: ActionQueue<u32> = ActionQueue::new();

        // empty
        assert!(!queue.can_poll());

        // queued, nothing running
        queue.push(request(), Action::navigate());
        assert!(queue.can_poll());

        // same priority may follow a running item
        let first = queue.poll().unwrap();
        queue.push(request(), Action::navigate());
        assert!(queue.can_poll());
        let second = queue.poll().unwrap();

        // a different priority may not jump ahead of running items
        queue.push(request(), Action::new("save"));
        assert!(!queue.can_poll());
        assert!(queue.poll().is_none());

        queue.notify_end(first.id, Some(1));
        assert!(!queue.can_poll());
        queue.notify_end(second.id, Some(2));
        assert!(queue.can_poll());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue: ActionQueue<()> = ActionQueue::new();
        let a = queue.push(request(), Action::new("a"));
        let b = queue.push(request(), Action::new("b"));

        assert_eq!(queue.poll().map(|item| item.id), Some(a));
        assert_eq!(queue.poll().map(|item| item.id), Some(b));
        assert!(b > a);
    }

    #[test]
    fn test_await_end_receives_result() {
        let mut queue: ActionQueue<&'static str> = ActionQueue::new();
        let id = queue.push(request(), Action::navigate());
        queue.poll();

        let ended = queue.await_end(id);
        queue.notify_end(id, Some("done"));
        assert_eq!(pollster::block_on(ended), Some("done"));
    }

    #[test]
    fn test_await_end_on_ended_item_resolves_immediately() {
        let mut queue: ActionQueue<u8> = ActionQueue::new();
        let id = queue.push(request(), Action::navigate());
        queue.poll();
        queue.notify_end(id, Some(3));

        assert_eq!(pollster::block_on(queue.await_end(id)), None);
    }

    #[test]
    fn test_await_end_on_unknown_item_stays_pending() {
        let mut queue: ActionQueue<u8> = ActionQueue::new();
        assert!(queue.await_end(999).now_or_never().is_none());

        let ended = queue.await_end(2);
        queue.push(request(), Action::navigate());
        let id = queue.push(request(), Action::navigate());
        assert_eq!(id, 2);
        queue.poll();
        queue.poll();
        queue.notify_end(id, Some(7));
        assert_eq!(pollster::block_on(ended), Some(7));
    }

    #[test]
    fn test_remove_queued_item_releases_waiters() {
        let mut queue: ActionQueue<u8> = ActionQueue::new();
        let running = queue.push(request(), Action::navigate());
        queue.poll();
        let queued = queue.push(request(), Action::new("save"));

        let ended = queue.await_end(queued);
        assert!(queue.remove(queued));
        assert!(queue.is_empty());
        assert_eq!(pollster::block_on(ended), None);

        assert!(queue.is_running(running));
        assert!(queue.remove(running));
        assert_eq!(queue.running_count(), 0);
        assert!(!queue.remove(running));
    }
}
