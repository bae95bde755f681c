//! Narrowphase: exact contacts for the candidate pairs of the broadphase,
//! persisted in manifolds across steps.

mod clip;
mod dispatch;
pub mod epa;
pub mod gjk;
mod midphase;
mod primitives;
mod sat;

use rustc_hash::FxHashSet;

use crate::collision::broad_phase::BodyPair;
use crate::collision::contact::{ContactDetails, PairKey};
use crate::collision::manifold::ContactManifoldList;
use crate::dynamics::{BodyHandle, BodySet, Collidable};
use crate::events::{ContactEvent, ContactEventKind};
use crate::geometry::ShapeType;

pub use clip::polyhedral;
pub use dispatch::{ContactRoutine, RoutineTable};
pub use epa::{epa, EpaResult};
pub use gjk::{distance, gjk, intersects, time_of_impact, ConvexSupport, GjkResult, Segment, Simplex, SupportMap};
pub use primitives::{capsule_capsule, capsule_hull, gjk_epa, sphere_capsule, sphere_hull, sphere_sphere};
pub use sat::{perform_sat, SatResult};

/// Contact persistence tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NarrowPhaseConfig {
    /// New points closer than this to a cached point (on body A) are dropped.
    pub duplicate_tolerance: f32,
    /// Cached points separated by more than this are dropped.
    pub separation_tolerance: f32,
    /// Cached points whose surfaces slid apart sideways by more than this are dropped.
    pub drift_tolerance: f32,
    /// Cached points on a ball or capsule that rolled this far off the
    /// surface facing the other body are dropped.
    pub rolling_tolerance: f32,
}

impl Default for NarrowPhaseConfig {
    fn default() -> Self {
        Self {
            duplicate_tolerance: 0.02,
            separation_tolerance: 0.02,
            drift_tolerance: 0.1,
            rolling_tolerance: 0.005,
        }
    }
}

/// Turns candidate pairs into persistent contact manifolds and records the
/// resulting contact events.
#[derive(Debug, Default)]
pub struct NarrowPhase {
    pub config: NarrowPhaseConfig,
    routines: RoutineTable,
    manifolds: ContactManifoldList,
    triggers: FxHashSet<PairKey>,
    events: Vec<ContactEvent>,
    scratch: Vec<ContactDetails>,
}

impl NarrowPhase {
    pub fn new(config: NarrowPhaseConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Overrides the routine used for a pair of shape types (and its mirror,
    /// unless that has its own).
    pub fn register_routine(&mut self, a: ShapeType, b: ShapeType, routine: ContactRoutine) {
        self.routines.register(a, b, routine);
    }

    #[inline]
    pub fn routines(&self) -> &RoutineTable {
        &self.routines
    }

    #[inline]
    pub fn manifolds(&self) -> &ContactManifoldList {
        &self.manifolds
    }

    #[inline]
    pub(crate) fn manifolds_mut(&mut self) -> &mut ContactManifoldList {
        &mut self.manifolds
    }

    /// Trigger pairs overlapping as of the last [`NarrowPhase::generate_contacts`].
    pub fn trigger_pairs(&self) -> impl Iterator<Item = PairKey> + '_ {
        self.triggers.iter().copied()
    }

    /// One-off contact query between two collidables, outside any manifold.
    pub fn collide(&self, a: &dyn Collidable, b: &dyn Collidable) -> Vec<ContactDetails> {
        let mut out = Vec::new();
        self.routines.collide(a, b, false, &mut out);
        out
    }

    /// Re-derives every cached point from the current poses, drops the stale
    /// ones and frees manifolds left empty.
    pub fn update_contact_manifolds(&mut self, bodies: &BodySet) {
        let config = self.config;
        let events = &mut self.events;
        self.manifolds.retain(
            |manifold| {
                manifold.update(bodies, &config);
                !manifold.is_empty()
            },
            |manifold| events.push(ContactEvent::new(ContactEventKind::CollisionExit, manifold.key())),
        );
    }

    /// Runs the contact routines over `pairs` and merges the results into the manifolds.
    ///
    /// Pairs involving a trigger only record overlap. Every manifold that was
    /// not created by this call reports a stay event.
    pub fn generate_contacts(&mut self, bodies: &BodySet, pairs: &[BodyPair]) {
        let mut triggers = FxHashSet::default();

        for &(x, y) in pairs {
            let key = PairKey::new(x, y);
            let (Some(a), Some(b)) = (bodies.get(key.0), bodies.get(key.1)) else {
                continue;
            };
            let lightweight = a.is_trigger() || b.is_trigger();

            self.scratch.clear();
            self.routines.collide(a, b, lightweight, &mut self.scratch);
            if self.scratch.is_empty() {
                continue;
            }
            if lightweight {
                triggers.insert(key);
                continue;
            }

            let (manifold, created) = self.manifolds.get_or_insert(key);
            if created {
                self.events.push(ContactEvent::new(ContactEventKind::CollisionEnter, key));
            }
            for contact in self.scratch.drain(..) {
                manifold.add_contact(contact, self.config.duplicate_tolerance);
            }
        }

        for &key in triggers.difference(&self.triggers) {
            self.events.push(ContactEvent::new(ContactEventKind::TriggerEnter, key));
        }
        for &key in self.triggers.difference(&triggers) {
            self.events.push(ContactEvent::new(ContactEventKind::TriggerExit, key));
        }
        self.triggers = triggers;

        for manifold in self.manifolds.iter_mut() {
            if manifold.fresh {
                manifold.fresh = false;
            } else {
                self.events.push(ContactEvent::new(ContactEventKind::CollisionStay, manifold.key()));
            }
        }
    }

    /// Forgets every manifold and trigger pair involving `handle`, reporting exits.
    pub fn remove_body(&mut self, handle: BodyHandle) {
        let events = &mut self.events;
        self.manifolds.retain(
            |manifold| !manifold.key().contains(handle),
            |manifold| events.push(ContactEvent::new(ContactEventKind::CollisionExit, manifold.key())),
        );
        self.triggers.retain(|key| {
            let keep = !key.contains(handle);
            if !keep {
                events.push(ContactEvent::new(ContactEventKind::TriggerExit, *key));
            }
            keep
        });
    }

    /// Takes the events recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.events)
    }
}
