//! Per-node running indicators.
//!
//! The backend brackets each node's execution with `start`/`stop` timer
//! directives. [`TimerBus`] fans those out to subscribed listeners (the
//! editor's spinners), and [`RunningNodes`] remembers which nodes are still
//! running so the manager can close them when the channel goes away.

use indexmap::IndexSet;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::TimerDirective;

/// What happened to a node's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerEventKind {
    /// Node started.
    Start,
    /// Node stopped.
    Stop,
    /// Node was still running when the channel closed.
    Error,
}

impl From<TimerDirective> for TimerEventKind {
    fn from(directive: TimerDirective) -> Self {
        match directive {
            TimerDirective::Start => Self::Start,
            TimerDirective::Stop => Self::Stop,
        }
    }
}

/// Timer event broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEvent {
    /// Node the event refers to.
    pub node_id: String,
    /// Event kind.
    pub kind: TimerEventKind,
}

impl TimerEvent {
    /// Creates an event.
    pub fn new(node_id: impl Into<String>, kind: TimerEventKind) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
        }
    }
}

/// Listener callback.
pub type TimerListener = Arc<dyn Fn(&TimerEvent) + Send + Sync>;

/// Handle returned by [`TimerBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe list for timer events.
///
/// Listeners run synchronously on the publishing task, outside the internal
/// lock, in subscription order.
///
/// # Examples
///
/// ```
/// use flowsync::task::{TimerBus, TimerEvent, TimerEventKind};
/// use std::sync::{Arc, Mutex};
///
/// let bus = TimerBus::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let id = bus.subscribe(Arc::new(move |e: &TimerEvent| sink.lock().unwrap().push(e.clone())));
///
/// bus.publish(&TimerEvent::new("n1", TimerEventKind::Start));
/// assert!(bus.unsubscribe(id));
/// bus.publish(&TimerEvent::new("n1", TimerEventKind::Stop));
/// assert_eq!(seen.lock().unwrap().len(), 1);
/// ```
#[derive(Default)]
pub struct TimerBus {
    listeners: RwLock<Vec<(SubscriptionId, TimerListener)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for TimerBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl TimerBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn subscribe(&self, listener: TimerListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers `event` to every listener.
    pub fn publish(&self, event: &TimerEvent) {
        let listeners: Vec<TimerListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Nodes with a `start` and no matching `stop` yet, in start order.
#[derive(Debug, Clone, Default)]
pub struct RunningNodes {
    nodes: IndexSet<String>,
}

impl RunningNodes {
    /// Records a directive for `node_id`.
    pub fn record(&mut self, node_id: &str, directive: TimerDirective) {
        match directive {
            TimerDirective::Start => {
                self.nodes.insert(node_id.to_string());
            },
            TimerDirective::Stop => {
                self.nodes.shift_remove(node_id);
            },
        }
    }

    /// Whether `node_id` is running.
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains(node_id)
    }

    /// Whether no node is running.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Publishes an `Error` event for every running node and forgets them.
    ///
    /// Returns how many nodes were closed.
    pub fn force_close(&mut self, bus: &TimerBus) -> usize {
        let count = self.nodes.len();
        for node_id in self.nodes.drain(..) {
            tracing::debug!(node_id = %node_id, "closing dangling node timer");
            bus.publish(&TimerEvent::new(node_id, TimerEventKind::Error));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_bus() -> (TimerBus, Arc<Mutex<Vec<TimerEvent>>>) {
        let bus = TimerBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Arc::new(move |e: &TimerEvent| sink.lock().push(e.clone())));
        (bus, seen)
    }

    #[test]
    fn force_close_only_unmatched_starts() {
        let (bus, seen) = recording_bus();
        let mut running = RunningNodes::default();
        running.record("a", TimerDirective::Start);
        running.record("b", TimerDirective::Start);
        running.record("a", TimerDirective::Stop);
        running.record("c", TimerDirective::Start);

        assert_eq!(running.force_close(&bus), 2);
        assert!(running.is_empty());
        assert_eq!(
            *seen.lock(),
            vec![
                TimerEvent::new("b", TimerEventKind::Error),
                TimerEvent::new("c", TimerEventKind::Error),
            ]
        );
    }

    #[test]
    fn stop_without_start_is_ignored() {
        let mut running = RunningNodes::default();
        running.record("x", TimerDirective::Stop);
        assert!(running.is_empty());
    }

    #[test]
    fn unsubscribe_unknown_id() {
        let bus = TimerBus::new();
        let id = bus.subscribe(Arc::new(|_: &TimerEvent| {}));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }
}
