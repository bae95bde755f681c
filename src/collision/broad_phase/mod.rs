//! Broadphase: cheap AABB pruning that feeds candidate pairs to the narrowphase.

mod basic;
mod pooled;
mod tree;

use rustc_hash::FxHashMap;

use crate::dynamics::{BodyHandle, BodySet, RigidBody};
use crate::geometry::Aabb;
use crate::math::Vec3;

use super::filter::{can_bodies_collide, CollisionMatrix};

pub use basic::BasicBroadphase;
pub use pooled::PooledBroadphase;
pub use tree::BvhBroadphase;

/// A candidate pair found by the broadphase.
pub type BodyPair = (BodyHandle, BodyHandle);

/// Tracks bodies and produces the pairs worth handing to the narrowphase.
///
/// Pair order is not stable across updates.
pub trait Broadphase {
    fn add_body(&mut self, handle: BodyHandle, body: &RigidBody);

    fn remove_body(&mut self, handle: BodyHandle);

    /// Re-syncs a body after its type, shape or placement was changed by a setter.
    fn update_body(&mut self, handle: BodyHandle, body: &RigidBody);

    /// Recomputes the candidate pairs from the current body bounds.
    fn update(&mut self, bodies: &BodySet, matrix: &CollisionMatrix);

    fn collision_pairs(&self) -> &[BodyPair];

    /// Tracked bodies that are not static.
    fn dynamic_bodies(&self, bodies: &BodySet) -> Vec<BodyHandle>;

    /// Tracked bodies whose bounds overlap `aabb`.
    fn intersects_with(&self, aabb: Aabb, bodies: &BodySet) -> Vec<BodyHandle>;

    /// Tracked bodies whose bounds the segment `start -> end` crosses.
    fn ray_intersect(&self, start: Vec3, end: Vec3, bodies: &BodySet) -> Vec<BodyHandle>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered set of handles with O(1) swap-remove.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandleList {
    handles: Vec<BodyHandle>,
    index: FxHashMap<BodyHandle, usize>,
}

impl HandleList {
    pub fn insert(&mut self, handle: BodyHandle) -> bool {
        if self.index.contains_key(&handle) {
            return false;
        }
        self.index.insert(handle, self.handles.len());
        self.handles.push(handle);
        true
    }

    pub fn remove(&mut self, handle: BodyHandle) -> bool {
        let Some(i) = self.index.remove(&handle) else {
            return false;
        };
        self.handles.swap_remove(i);
        if let Some(&moved) = self.handles.get(i) {
            self.index.insert(moved, i);
        }
        true
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.index.contains_key(&handle)
    }

    pub fn as_slice(&self) -> &[BodyHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Narrowphase-worthy test shared by every strategy.
pub(crate) fn test_pair(bodies: &BodySet, a: BodyHandle, b: BodyHandle, matrix: &CollisionMatrix) -> bool {
    let (Some(body_a), Some(body_b)) = (bodies.get(a), bodies.get(b)) else {
        return false;
    };
    body_a.aabb().intersects(body_b.aabb()) && can_bodies_collide(body_a, body_b, matrix)
}

pub(crate) fn scan_aabb(handles: &[BodyHandle], aabb: Aabb, bodies: &BodySet) -> Vec<BodyHandle> {
    handles
        .iter()
        .copied()
        .filter(|&h| bodies.get(h).is_some_and(|body| body.aabb().intersects(aabb)))
        .collect()
}

pub(crate) fn scan_segment(handles: &[BodyHandle], start: Vec3, end: Vec3, bodies: &BodySet) -> Vec<BodyHandle> {
    handles
        .iter()
        .copied()
        .filter(|&h| {
            bodies
                .get(h)
                .is_some_and(|body| body.aabb().segment_intersection(start, end).is_some())
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::geometry::Shape;

    /// Three unit cubes: two overlapping dynamic ones and a static floor under the first.
    pub fn scene() -> (BodySet, [BodyHandle; 4]) {
        let mut bodies = BodySet::with_key();
        let cube = Arc::new(Shape::cuboid(Vec3::splat(0.5)));
        let a = bodies.insert(RigidBody::new(cube.clone(), 1.0));
        let b = bodies.insert(RigidBody::new(cube.clone(), 1.0).with_position(Vec3::new(0.8, 0.0, 0.0)));
        let far = bodies.insert(RigidBody::new(cube, 1.0).with_position(Vec3::new(10.0, 0.0, 0.0)));
        let floor = bodies.insert(
            RigidBody::fixed(Arc::new(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))).with_position(Vec3::new(0.0, -0.9, 0.0)),
        );
        for (h, body) in bodies.iter_mut() {
            body.handle = h;
        }
        (bodies, [a, b, far, floor])
    }

    /// Pairs as sorted keys, for order independent comparison.
    pub fn sorted(pairs: &[BodyPair]) -> Vec<BodyPair> {
        let mut out: Vec<BodyPair> = pairs.iter().map(|&(a, b)| if a <= b { (a, b) } else { (b, a) }).collect();
        out.sort_unstable();
        out
    }

    pub fn exercise(broadphase: &mut dyn Broadphase) {
        let (mut bodies, [a, b, far, floor]) = scene();
        for (h, body) in bodies.iter() {
            broadphase.add_body(h, body);
        }
        let matrix = CollisionMatrix::new();
        broadphase.update(&bodies, &matrix);

        let mut expected = vec![(a, b), (a, floor), (b, floor)];
        expected = sorted(&expected);
        assert_eq!(sorted(broadphase.collision_pairs()), expected);
        assert_eq!(broadphase.dynamic_bodies(&bodies).len(), 3);

        let hits = broadphase.ray_intersect(Vec3::new(20.0, 0.0, 0.0), Vec3::new(9.0, 0.0, 0.0), &bodies);
        assert_eq!(hits, vec![far]);
        let mut found = broadphase.intersects_with(Aabb::new(Vec3::splat(-0.1), Vec3::splat(0.1)), &bodies);
        found.sort_unstable();
        assert_eq!(found, vec![a]);

        // Becoming static removes the pair with the floor.
        bodies[b].set_static(true);
        broadphase.update_body(b, &bodies[b]);
        broadphase.update(&bodies, &matrix);
        assert_eq!(sorted(broadphase.collision_pairs()), sorted(&[(a, b), (a, floor)]));

        broadphase.remove_body(a);
        broadphase.update(&bodies, &matrix);
        assert!(broadphase.collision_pairs().is_empty());
        assert_eq!(broadphase.len(), 3);
    }
}
