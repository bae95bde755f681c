//! Observer interfaces for game logic.
//!
//! Listeners are registered on the [`World`](crate::world::World), which
//! hands back a [`ListenerId`] for removal. Events are delivered
//! synchronously from inside `step`, after the sub-step that produced them.

use crate::collision::PairKey;
use crate::constraints::ConstraintHandle;
use crate::dynamics::BodyHandle;

/// Returned by listener registration; pass it back to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContactEventKind {
    /// A manifold was created for the pair.
    CollisionEnter,
    /// The pair's manifold survived another sub-step.
    CollisionStay,
    /// The manifold was destroyed, either emptied or purged with a body.
    CollisionExit,
    TriggerEnter,
    TriggerExit,
}

/// Contact state change for a body pair, `body_a < body_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub kind: ContactEventKind,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

impl ContactEvent {
    pub(crate) fn new(kind: ContactEventKind, key: PairKey) -> Self {
        Self {
            kind,
            body_a: key.0,
            body_b: key.1,
        }
    }

    #[inline]
    pub fn key(&self) -> PairKey {
        PairKey(self.body_a, self.body_b)
    }

    #[inline]
    pub fn involves(&self, handle: BodyHandle) -> bool {
        self.body_a == handle || self.body_b == handle
    }
}

/// Notified around every sub-step.
pub trait StepListener {
    fn step_start(&mut self, _tick: u64, _dt: f32) {}

    fn step_end(&mut self, _tick: u64, _dt: f32) {}
}

/// Notified of contact changes. Every method defaults to doing nothing.
pub trait ContactListener {
    fn collision_enter(&mut self, _event: &ContactEvent) {}

    fn collision_stay(&mut self, _event: &ContactEvent) {}

    fn collision_exit(&mut self, _event: &ContactEvent) {}

    fn trigger_enter(&mut self, _event: &ContactEvent) {}

    fn trigger_exit(&mut self, _event: &ContactEvent) {}

    /// Routes `event` to the method for its kind.
    fn dispatch(&mut self, event: &ContactEvent) {
        match event.kind {
            ContactEventKind::CollisionEnter => self.collision_enter(event),
            ContactEventKind::CollisionStay => self.collision_stay(event),
            ContactEventKind::CollisionExit => self.collision_exit(event),
            ContactEventKind::TriggerEnter => self.trigger_enter(event),
            ContactEventKind::TriggerExit => self.trigger_exit(event),
        }
    }
}

/// Notified when a user constraint exceeds its breaking threshold.
pub trait ConstraintListener {
    fn constraint_broken(&mut self, handle: ConstraintHandle, impulse: f32);
}

/// Listeners of one kind in registration order.
pub(crate) struct ListenerList<L: ?Sized> {
    entries: Vec<(ListenerId, Box<L>)>,
}

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<L: ?Sized> ListenerList<L> {
    pub fn push(&mut self, id: ListenerId, listener: Box<L>) {
        self.entries.push((id, listener));
    }

    pub fn remove(&mut self, id: ListenerId) -> Option<Box<L>> {
        let index = self.entries.iter().position(|(entry, _)| *entry == id)?;
        Some(self.entries.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut L> {
        self.entries.iter_mut().map(|(_, listener)| listener.as_mut())
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerList<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(id, _)| id)).finish()
    }
}
