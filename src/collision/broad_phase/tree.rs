use rustc_hash::FxHashMap;

use crate::collision::filter::CollisionMatrix;
use crate::dynamics::{BodyHandle, BodySet, RigidBody};
use crate::geometry::{Aabb, AabbTree, NodeId};
use crate::math::Vec3;

use super::{test_pair, BodyPair, Broadphase, HandleList};

/// Fattening applied to every leaf so small motions skip the reinsert.
pub const TREE_MARGIN: f32 = 0.1;

/// Dynamic AABB tree broadphase. Only moving bodies query the tree.
#[derive(Debug, Clone)]
pub struct BvhBroadphase {
    tree: AabbTree<BodyHandle>,
    leaves: FxHashMap<BodyHandle, NodeId>,
    bodies: HandleList,
    pairs: Vec<BodyPair>,
}

impl Default for BvhBroadphase {
    fn default() -> Self {
        Self::new()
    }
}

impl BvhBroadphase {
    pub fn new() -> Self {
        Self {
            tree: AabbTree::new(TREE_MARGIN),
            leaves: FxHashMap::default(),
            bodies: HandleList::default(),
            pairs: Vec::new(),
        }
    }

    fn refresh_leaf(&mut self, handle: BodyHandle, aabb: Aabb) {
        if let Some(node) = self.leaves.get_mut(&handle) {
            *node = self.tree.update(*node, aabb).0;
        }
    }
}

impl Broadphase for BvhBroadphase {
    fn add_body(&mut self, handle: BodyHandle, body: &RigidBody) {
        if self.bodies.insert(handle) {
            let node = self.tree.insert(handle, body.aabb());
            self.leaves.insert(handle, node);
        }
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(handle);
        if let Some(node) = self.leaves.remove(&handle) {
            self.tree.remove(node);
        }
    }

    fn update_body(&mut self, handle: BodyHandle, body: &RigidBody) {
        self.refresh_leaf(handle, body.aabb());
    }

    fn update(&mut self, bodies: &BodySet, matrix: &CollisionMatrix) {
        for &handle in self.bodies.as_slice() {
            if let (Some(body), Some(node)) = (bodies.get(handle), self.leaves.get_mut(&handle)) {
                *node = self.tree.update(*node, body.aabb()).0;
            }
        }

        let pairs = &mut self.pairs;
        pairs.clear();
        for &a in self.bodies.as_slice() {
            let Some(body_a) = bodies.get(a) else {
                continue;
            };
            if body_a.is_static() {
                continue;
            }
            self.tree.query(body_a.aabb(), |_, b| {
                if b == a {
                    return;
                }
                // Moving pairs are found from both sides; keep one.
                let b_moving = bodies.get(b).is_some_and(|body| !body.is_static());
                if b_moving && b < a {
                    return;
                }
                if test_pair(bodies, a, b, matrix) {
                    pairs.push((a, b));
                }
            });
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
        let mut found = Vec::new();
        self.tree.query(aabb, |_, handle| {
            if bodies.get(handle).is_some_and(|body| body.aabb().intersects(aabb)) {
                found.push(handle);
            }
        });
        found
    }

    fn ray_intersect(&self, start: Vec3, end: Vec3, bodies: &BodySet) -> Vec<BodyHandle> {
        let mut found = Vec::new();
        self.tree.query_segment(start, end, |_, handle| {
            if bodies
                .get(handle)
                .is_some_and(|body| body.aabb().segment_intersection(start, end).is_some())
            {
                found.push(handle);
            }
        });
        found
    }

    fn len(&self) -> usize {
        self.bodies.len()
    }
}
