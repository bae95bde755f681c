use rustc_hash::FxHashMap;

use crate::dynamics::RigidBody;

/// Number of collision layers a body can be on.
pub const LAYER_COUNT: u32 = 32;

/// Mask matching every layer.
pub const ALL_LAYERS: u32 = u32::MAX;

/// Layer pair to collide flag. Pairs without an entry collide.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionMatrix {
    pairs: FxHashMap<(u32, u32), bool>,
}

impl CollisionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables collision between two layers (in either order).
    pub fn set(&mut self, layer_a: u32, layer_b: u32, collide: bool) {
        self.pairs.insert(ordered(layer_a, layer_b), collide);
    }

    /// Forgets the entry for a layer pair, restoring the default.
    pub fn clear(&mut self, layer_a: u32, layer_b: u32) {
        self.pairs.remove(&ordered(layer_a, layer_b));
    }

    pub fn can_collide(&self, layer_a: u32, layer_b: u32) -> bool {
        self.pairs
            .get(&ordered(layer_a, layer_b))
            .copied()
            .unwrap_or(true)
    }
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// `true` when a body on `layer` matches `mask`.
#[inline]
pub fn layer_matches(layer: u32, mask: u32) -> bool {
    layer < LAYER_COUNT && mask & (1 << layer) != 0
}

/// Whether two bodies may produce contacts at all.
///
/// Two bodies that are both static or kinematic never collide, unless a
/// trigger is involved and one of them moves (a kinematic sensor sweeping
/// over static geometry). Everything else is up to the layer matrix.
pub fn can_bodies_collide(a: &RigidBody, b: &RigidBody, matrix: &CollisionMatrix) -> bool {
    if !a.is_dynamic() && !b.is_dynamic() {
        let trigger = a.is_trigger() || b.is_trigger();
        let moving = a.is_kinematic() || b.is_kinematic();
        if !(trigger && moving) {
            return false;
        }
    }
    matrix.can_collide(a.layer(), b.layer())
}
