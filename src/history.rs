//! Navigation history management
//!
//! Records committed hrefs with support for:
//! - Forward/backward navigation
//! - History truncation on new navigation
//! - Configurable history limits
//!
//! The router only moves through history once a navigation commits, so a
//! failed `back()` leaves the cursor where it was.

use crate::NavigationDirection;
use serde_json::Value;

/// Navigation history entry
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Committed href
    pub href: String,
    /// Data passed with the navigation
    pub data: Option<Value>,
}

impl HistoryEntry {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            data: None,
        }
    }

    pub fn with_data(href: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            href: href.into(),
            data,
        }
    }
}

/// Navigation history stack
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    /// `None` until the first commit
    current: Option<usize>,
    /// Maximum history size (0 = unlimited)
    max_size: usize,
}

impl History {
    const DEFAULT_MAX_SIZE: usize = 1000;

    pub fn new() -> Self {
        Self::with_max_size(Self::DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            max_size,
        }
    }

    pub fn current_href(&self) -> Option<&str> {
        self.current_entry().map(|entry| entry.href.as_str())
    }

    pub fn current_entry(&self) -> Option<&HistoryEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }

    /// Push a new entry, dropping any forward history
    pub fn push(&mut self, entry: HistoryEntry) -> HistoryEvent {
        let from = self.current_href().map(str::to_string);
        let to = entry.href.clone();

        let next = self.current.map_or(0, |index| index + 1);
        self.entries.truncate(next);
        self.entries.push(entry);
        self.current = Some(next);

        self.enforce_size_limit();

        HistoryEvent {
            from,
            to,
            direction: NavigationDirection::Push,
        }
    }

    /// Replace the current entry (pushes when history is empty)
    pub fn replace(&mut self, entry: HistoryEntry) -> HistoryEvent {
        let Some(index) = self.current else {
            let mut event = self.push(entry);
            event.direction = NavigationDirection::Replace;
            return event;
        };

        let from = Some(self.entries[index].href.clone());
        let to = entry.href.clone();
        self.entries[index] = entry;

        HistoryEvent {
            from,
            to,
            direction: NavigationDirection::Replace,
        }
    }

    /// Href one step back, without moving
    pub fn back_target(&self) -> Option<&str> {
        let index = self.current?.checked_sub(1)?;
        self.entries.get(index).map(|entry| entry.href.as_str())
    }

    /// Href one step forward, without moving
    pub fn forward_target(&self) -> Option<&str> {
        let index = self.current? + 1;
        self.entries.get(index).map(|entry| entry.href.as_str())
    }

    /// Go back in history
    pub fn back(&mut self) -> Option<HistoryEvent> {
        let to = self.back_target()?.to_string();
        let from = self.current_href().map(str::to_string);
        self.current = self.current.map(|index| index - 1);

        Some(HistoryEvent {
            from,
            to,
            direction: NavigationDirection::Back,
        })
    }

    /// Go forward in history
    pub fn forward(&mut self) -> Option<HistoryEvent> {
        let to = self.forward_target()?.to_string();
        let from = self.current_href().map(str::to_string);
        self.current = self.current.map(|index| index + 1);

        Some(HistoryEvent {
            from,
            to,
            direction: NavigationDirection::Forward,
        })
    }

    /// Record a committed navigation according to its direction
    ///
    /// Back and forward only move the cursor when `href` is the entry in
    /// that direction; otherwise the navigation is pushed.
    pub fn record(
        &mut self,
        href: &str,
        direction: NavigationDirection,
        data: Option<Value>,
    ) -> HistoryEvent {
        match direction {
            NavigationDirection::Back if self.back_target() == Some(href) => {
                if let Some(event) = self.back() {
                    return event;
                }
            }
            NavigationDirection::Forward if self.forward_target() == Some(href) => {
                if let Some(event) = self.forward() {
                    return event;
                }
            }
            NavigationDirection::Replace => {
                return self.replace(HistoryEntry::with_data(href, data));
            }
            _ => {}
        }
        self.push(HistoryEntry::with_data(href, data))
    }

    pub fn can_go_back(&self) -> bool {
        self.back_target().is_some()
    }

    pub fn can_go_forward(&self) -> bool {
        self.forward_target().is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    fn enforce_size_limit(&mut self) {
        if self.max_size > 0 && self.entries.len() > self.max_size {
            // Remove oldest entries, keeping the current href reachable
            let excess = self.entries.len() - self.max_size;
            self.entries.drain(0..excess);
            self.current = self.current.map(|index| index.saturating_sub(excess));
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

/// Movement through history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub from: Option<String>,
    pub to: String,
    pub direction: NavigationDirection,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(hrefs: &[&str]) -> History {
        let mut history = History::new();
        for href in hrefs {
            history.push(HistoryEntry::new(*href));
        }
        history
    }

    #[test]
    fn test_history_creation() {
        let history = History::new();
        assert_eq!(history.current_href(), None);
        assert!(history.is_empty());
        assert!(!history.can_go_back());
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_history_push() {
        let history = history(&["/", "/users"]);
        assert_eq!(history.current_href(), Some("/users"));
        assert_eq!(history.len(), 2);
        assert!(history.can_go_back());
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_history_back_forward() {
        let mut history = history(&["/", "/page1", "/page2"]);

        history.back();
        assert_eq!(history.current_href(), Some("/page1"));
        assert!(history.can_go_back());
        assert!(history.can_go_forward());

        history.forward();
        assert_eq!(history.current_href(), Some("/page2"));
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_history_truncation_on_push() {
        let mut history = history(&["/", "/page1", "/page2"]);
        history.back();

        // Push a new page - should truncate forward history
        history.push(HistoryEntry::new("/page3"));
        assert_eq!(history.current_href(), Some("/page3"));
        assert_eq!(history.len(), 3);
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_history_replace() {
        let mut history = history(&["/", "/page1"]);

        let event = history.replace(HistoryEntry::new("/page2"));
        assert_eq!(event.from.as_deref(), Some("/page1"));
        assert_eq!(history.current_href(), Some("/page2"));
        assert_eq!(history.len(), 2);

        let mut empty = History::new();
        empty.replace(HistoryEntry::new("/first"));
        assert_eq!(empty.current_href(), Some("/first"));
    }

    #[test]
    fn test_record_follows_direction() {
        let mut history = history(&["/a", "/b"]);

        let event = history.record("/a", NavigationDirection::Back, None);
        assert_eq!(event.direction, NavigationDirection::Back);
        assert_eq!(history.len(), 2);

        history.record("/b", NavigationDirection::Forward, None);
        assert_eq!(history.current_href(), Some("/b"));

        // a back navigation that ended elsewhere is pushed
        let event = history.record("/c", NavigationDirection::Back, None);
        assert_eq!(event.direction, NavigationDirection::Push);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_history_max_size() {
        let mut history = History::with_max_size(3);
        for href in ["/", "/page1", "/page2", "/page3", "/page4"] {
            history.push(HistoryEntry::new(href));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.current_href(), Some("/page4"));

        history.back();
        history.back();
        assert_eq!(history.current_href(), Some("/page2"));
        assert!(!history.can_go_back());
    }

    #[test]
    fn test_entry_data() {
        let mut history = History::new();
        history.record("/x", NavigationDirection::Push, Some(serde_json::json!({ "y": 1 })));
        assert_eq!(
            history.current_entry().and_then(|entry| entry.data.clone()),
            Some(serde_json::json!({ "y": 1 }))
        );
    }

    #[test]
    fn test_empty_history_boundaries() {
        let mut history = History::new();

        assert!(history.back().is_none());
        assert!(history.forward().is_none());
        history.clear();
        assert_eq!(history.current_index(), None);
    }
}
