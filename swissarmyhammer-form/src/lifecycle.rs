//! Lifecycle states and the deferred flush queue.
//!
//! Work that must observe settled state (the `init` announcement after
//! mount, `onChange` + `validate` after a value update) is queued on a
//! [`FlushQueue`] and runs when the host drains it at the end of an update
//! cycle. Bus events that reach a tag while it is borrowed, such as a tag
//! listening to its own `init`, are queued the same way.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Weak;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::events::EventAction;
use crate::tag::Tag;

/// Where a tag is in its life. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Constructed,
    Mounted,
    Active,
    Destroyed,
}

impl LifecycleState {
    /// Lowercase state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Mounted => "mounted",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work queued until the next flush.
#[derive(Clone)]
pub enum Deferred {
    /// Publish `init` after mount.
    Announce,
    /// Run `onChange` then `validate` after a value update.
    Settle,
    /// Run an `atomEvents` action whose event arrived while the tag was busy.
    Deliver { action: EventAction, payload: Value },
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announce => f.write_str("Announce"),
            Self::Settle => f.write_str("Settle"),
            Self::Deliver { payload, .. } => f
                .debug_struct("Deliver")
                .field("payload", payload)
                .finish_non_exhaustive(),
        }
    }
}

/// Queue of deferred tag work, drained once per update cycle.
#[derive(Default)]
pub struct FlushQueue {
    pending: RefCell<VecDeque<(Weak<RefCell<Tag>>, Deferred)>>,
}

impl FlushQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `work` for `tag`.
    pub fn schedule(&self, tag: Weak<RefCell<Tag>>, work: Deferred) {
        self.pending.borrow_mut().push_back((tag, work));
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Run queued work in order, including work queued while flushing.
    ///
    /// Work for dropped or destroyed tags is discarded. Returns the number
    /// of items that ran. Reaching a tag that is currently borrowed stops the
    /// flush with that item still at the front of the queue. An error from
    /// deferred validation also stops the flush; anything still queued runs
    /// on the next call.
    pub fn flush(&self) -> Result<usize> {
        let mut ran = 0;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some((tag, work)) = next else {
                break;
            };
            let Some(handle) = tag.upgrade() else {
                debug!(?work, "skipping deferred work for dropped tag");
                continue;
            };
            let Ok(mut guard) = handle.try_borrow_mut() else {
                debug!(?work, "tag busy, flush paused");
                self.pending.borrow_mut().push_front((tag, work));
                break;
            };
            if guard.run_deferred(work)? {
                ran += 1;
            }
        }
        Ok(ran)
    }
}

impl fmt::Debug for FlushQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushQueue")
            .field("pending", &self.len())
            .finish()
    }
}
