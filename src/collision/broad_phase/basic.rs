use crate::collision::filter::CollisionMatrix;
use crate::dynamics::{BodyHandle, BodySet, RigidBody};
use crate::geometry::Aabb;
use crate::math::Vec3;

use super::{scan_aabb, scan_segment, test_pair, BodyPair, Broadphase, HandleList};

/// All-pairs broadphase: tests every tracked pair every update.
#[derive(Debug, Clone, Default)]
pub struct BasicBroadphase {
    bodies: HandleList,
    pairs: Vec<BodyPair>,
}

impl BasicBroadphase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Broadphase for BasicBroadphase {
    fn add_body(&mut self, handle: BodyHandle, _body: &RigidBody) {
        self.bodies.insert(handle);
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(handle);
    }

    fn update_body(&mut self, _handle: BodyHandle, _body: &RigidBody) {}

    fn update(&mut self, bodies: &BodySet, matrix: &CollisionMatrix) {
        self.pairs.clear();
        let handles = self.bodies.as_slice();
        for (i, &a) in handles.iter().enumerate() {
            for &b in &handles[i + 1..] {
                if test_pair(bodies, a, b, matrix) {
                    self.pairs.push((a, b));
                }
            }
        }
    }

    fn collision_pairs(&self) -> &[BodyPair] {
        &self.pairs
    }

    fn dynamic_bodies(&self, bodies: &BodySet) -> Vec<BodyHandle> {
        self.bodies
            .as_slice()
            .iter()
            .copied()
            .filter(|&h| bodies.get(h).is_some_and(|body| !body.is_static()))
            .collect()
    }

    fn intersects_with(&self, aabb: Aabb, bodies: &BodySet) -> Vec<BodyHandle> {
        scan_aabb(self.bodies.as_slice(), aabb, bodies)
    }

    fn ray_intersect(&self, start: Vec3, end: Vec3, bodies: &BodySet) -> Vec<BodyHandle> {
        scan_segment(self.bodies.as_slice(), start, end, bodies)
    }

    fn len(&self) -> usize {
        self.bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;

    #[test]
    fn finds_overlapping_pairs() {
        test_support::exercise(&mut BasicBroadphase::new());
    }
}
