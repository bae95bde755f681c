use crate::collision::filter::CollisionMatrix;
use crate::dynamics::{BodyHandle, BodySet, RigidBody};
use crate::geometry::Aabb;
use crate::math::Vec3;

use super::{scan_aabb, scan_segment, test_pair, BodyPair, Broadphase, HandleList};

/// Keeps static bodies in their own pool so static pairs are never tested.
///
/// Moving bodies (dynamic and kinematic) are tested against each other and
/// against every static body.
#[derive(Debug, Clone, Default)]
pub struct PooledBroadphase {
    moving: HandleList,
    fixed: HandleList,
    pairs: Vec<BodyPair>,
}

impl PooledBroadphase {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool_for(&mut self, body: &RigidBody) -> &mut HandleList {
        if body.is_static() {
            &mut self.fixed
        } else {
            &mut self.moving
        }
    }
}

impl Broadphase for PooledBroadphase {
    fn add_body(&mut self, handle: BodyHandle, body: &RigidBody) {
        self.pool_for(body).insert(handle);
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        if !self.moving.remove(handle) {
            self.fixed.remove(handle);
        }
    }

    fn update_body(&mut self, handle: BodyHandle, body: &RigidBody) {
        let in_right_pool = if body.is_static() {
            self.fixed.contains(handle)
        } else {
            self.moving.contains(handle)
        };
        if !in_right_pool {
            self.remove_body(handle);
            self.add_body(handle, body);
        }
    }

    fn update(&mut self, bodies: &BodySet, matrix: &CollisionMatrix) {
        self.pairs.clear();
        let moving = self.moving.as_slice();
        for (i, &a) in moving.iter().enumerate() {
            for &b in moving[i + 1..].iter().chain(self.fixed.as_slice()) {
                if test_pair(bodies, a, b, matrix) {
                    self.pairs.push((a, b));
                }
            }
        }
    }

    fn collision_pairs(&self) -> &[BodyPair] {
        &self.pairs
    }

    fn dynamic_bodies(&self, _bodies: &BodySet) -> Vec<BodyHandle> {
        self.moving.as_slice().to_vec()
    }

    fn intersects_with(&self, aabb: Aabb, bodies: &BodySet) -> Vec<BodyHandle> {
        let mut found = scan_aabb(self.moving.as_slice(), aabb, bodies);
        found.extend(scan_aabb(self.fixed.as_slice(), aabb, bodies));
        found
    }

    fn ray_intersect(&self, start: Vec3, end: Vec3, bodies: &BodySet) -> Vec<BodyHandle> {
        let mut found = scan_segment(self.moving.as_slice(), start, end, bodies);
        found.extend(scan_segment(self.fixed.as_slice(), start, end, bodies));
        found
    }

    fn len(&self) -> usize {
        self.moving.len() + self.fixed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;

    #[test]
    fn finds_overlapping_pairs() {
        test_support::exercise(&mut PooledBroadphase::new());
    }

    #[test]
    fn bodies_move_between_pools() {
        let (mut bodies, [a, _, _, floor]) = test_support::scene();
        let mut broadphase = PooledBroadphase::new();
        for (h, body) in bodies.iter() {
            broadphase.add_body(h, body);
        }
        assert!(broadphase.fixed.contains(floor));

        bodies[floor].set_kinematic(true);
        broadphase.update_body(floor, &bodies[floor]);
        assert!(broadphase.moving.contains(floor));

        bodies[a].set_static(true);
        broadphase.update_body(a, &bodies[a]);
        assert!(broadphase.fixed.contains(a));
        assert_eq!(broadphase.len(), 4);
    }
}
