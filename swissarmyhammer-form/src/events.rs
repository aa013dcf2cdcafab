//! Event relay between tags and their containers.
//!
//! Tags talk to each other over an [`EventBus`] owned by the enclosing form
//! or group, using keys of the form `{source}_{type}`. Notifications meant
//! only for the immediate wrapper go through [`TagWrapper`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::tag::Tag;

/// Build the bus key for an event.
pub fn event_key(source: &str, type_: &str) -> String {
    format!("{source}_{type_}")
}

/// Identifies one subscription on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A bus callback.
pub type EventHandler = Rc<dyn Fn(&Value)>;

/// The shared ancestor bus.
pub trait EventBus {
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId;

    /// Returns `false` if the subscription was not found.
    fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool;

    /// Deliver `payload` to every handler of `event` in subscription order.
    fn publish(&self, event: &str, payload: &Value);
}

/// In-process bus with FIFO delivery per event name.
#[derive(Default)]
pub struct LocalEventBus {
    handlers: RefCell<IndexMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: Cell<u64>,
}

impl LocalEventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total live subscriptions across all events.
    pub fn subscription_count(&self) -> usize {
        self.handlers.borrow().values().map(Vec::len).sum()
    }

    /// Live subscriptions for one event.
    pub fn listener_count(&self, event: &str) -> usize {
        self.handlers.borrow().get(event).map_or(0, Vec::len)
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        trace!(event = %event, id = id.0, "subscribed");
        id
    }

    fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.shift_remove(event);
        }
        removed
    }

    fn publish(&self, event: &str, payload: &Value) {
        // Handlers may subscribe or publish while running.
        let snapshot: Vec<EventHandler> = match self.handlers.borrow().get(event) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        trace!(event = %event, listeners = snapshot.len(), "publish");
        for handler in snapshot {
            handler(payload);
        }
    }
}

impl fmt::Debug for LocalEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        f.debug_map()
            .entries(handlers.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

/// Callback run when an `atomEvents` entry fires. Receives the listening tag.
pub type EventAction = Rc<dyn Fn(&mut Tag, &Value)>;

/// One `atomEvents` declaration: run `action` when `source` emits `type_`.
#[derive(Clone)]
pub struct AtomEvent {
    pub source: String,
    /// Event type, e.g. `change` or `init`.
    pub type_: String,
    pub action: EventAction,
}

impl AtomEvent {
    /// Declare an action for `{source}_{type_}`.
    pub fn new(
        source: impl Into<String>,
        type_: impl Into<String>,
        action: impl Fn(&mut Tag, &Value) + 'static,
    ) -> Self {
        Self {
            source: source.into(),
            type_: type_.into(),
            action: Rc::new(action),
        }
    }

    /// The bus key this declaration subscribes to.
    pub fn key(&self) -> String {
        event_key(&self.source, &self.type_)
    }
}

impl fmt::Debug for AtomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomEvent")
            .field("source", &self.source)
            .field("type", &self.type_)
            .finish_non_exhaustive()
    }
}

/// Notifications a tag sends to its immediate wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// Two-way binding update: the field path and its new value.
    Change { fields: Vec<String>, value: Value },
    Init { value: Value },
    Show,
    Hide,
}

/// The per-field wrapper around a tag.
pub trait TagWrapper {
    fn notify(&self, event: LocalEvent);

    /// Toggle whether the tag's value is included in submission.
    fn on_hook_form(&self, hooked: bool);
}

/// Accessor for the whole form's aggregated value tree.
pub trait FormDataAccessor {
    fn form_data(&self) -> Value;
}

impl<F: Fn() -> Value> FormDataAccessor for F {
    fn form_data(&self) -> Value {
        self()
    }
}

/// A wrapper that records what it is told.
///
/// Hosts that only need the submission flag and a log of local events can
/// use this directly.
#[derive(Debug)]
pub struct FieldSlot {
    hooked: Cell<bool>,
    events: RefCell<Vec<LocalEvent>>,
}

impl FieldSlot {
    /// Create a slot that starts hooked into submission.
    pub fn new() -> Self {
        Self {
            hooked: Cell::new(true),
            events: RefCell::new(Vec::new()),
        }
    }

    /// Whether the tag's value is included in submission.
    pub fn is_hooked(&self) -> bool {
        self.hooked.get()
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<LocalEvent> {
        self.events.borrow().clone()
    }

    /// Drain and return the recorded events.
    pub fn take_events(&self) -> Vec<LocalEvent> {
        self.events.take()
    }
}

impl Default for FieldSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TagWrapper for FieldSlot {
    fn notify(&self, event: LocalEvent) {
        self.events.borrow_mut().push(event);
    }

    fn on_hook_form(&self, hooked: bool) {
        self.hooked.set(hooked);
    }
}
