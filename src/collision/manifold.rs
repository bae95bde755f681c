use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::dynamics::{BodyHandle, BodySet};
use crate::math::Vec3;

use super::contact::{ContactDetails, PairKey};
use super::narrow_phase::NarrowPhaseConfig;

/// Maximum number of contact points in a manifold
pub const MAX_CONTACT_POINTS: usize = 4;

/// Up to [`MAX_CONTACT_POINTS`] persistent contacts between one body pair.
///
/// Every point is stored with `body_a == key().0`.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    key: PairKey,
    points: SmallVec<[ContactDetails; MAX_CONTACT_POINTS]>,
    /// Created during the current step.
    pub(crate) fresh: bool,
}

impl ContactManifold {
    pub fn new(key: PairKey) -> Self {
        Self {
            key,
            points: SmallVec::new(),
            fresh: true,
        }
    }

    #[inline]
    pub fn key(&self) -> PairKey {
        self.key
    }

    #[inline]
    pub fn body_a(&self) -> BodyHandle {
        self.key.0
    }

    #[inline]
    pub fn body_b(&self) -> BodyHandle {
        self.key.1
    }

    #[inline]
    pub fn points(&self) -> &[ContactDetails] {
        &self.points
    }

    #[inline]
    pub(crate) fn points_mut(&mut self) -> &mut [ContactDetails] {
        &mut self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Deepest penetration among the points, if any.
    pub fn max_depth(&self) -> Option<f32> {
        self.points
            .iter()
            .map(|p| p.penetration_depth)
            .max_by(f32::total_cmp)
    }

    /// Average of the point normals.
    pub fn normal(&self) -> Vec3 {
        self.points.iter().map(|p| p.normal).sum::<Vec3>().normalize_or_zero()
    }

    /// Inserts `contact` unless it duplicates a cached point (closer than
    /// `duplicate_tolerance` on body A). A duplicate takes over the cached
    /// point's geometry but keeps its solver state. A full manifold replaces
    /// its weakest point. Returns whether the contact was added.
    pub fn add_contact(&mut self, contact: ContactDetails, duplicate_tolerance: f32) -> bool {
        let tolerance_sq = duplicate_tolerance * duplicate_tolerance;
        let duplicate = self
            .points
            .iter_mut()
            .find(|p| p.contact_point_in_a.distance_squared(contact.contact_point_in_a) < tolerance_sq);
        if let Some(cached) = duplicate {
            let contact_constraint = cached.contact_constraint.take();
            let friction_constraint = cached.friction_constraint.take();
            *cached = ContactDetails {
                contact_constraint,
                friction_constraint,
                ..contact
            };
            return false;
        }

        if self.points.len() < MAX_CONTACT_POINTS {
            self.points.push(contact);
            return true;
        }

        match self.find_weakest_contact(&contact) {
            Some(index) => {
                self.points[index] = contact;
                true
            }
            None => false,
        }
    }

    /// Index of the cached point to give up for `contact` in a full manifold.
    ///
    /// Picks the point whose removal leaves the largest contact area (measured
    /// on body A), never the deepest cached point unless `contact` is deeper.
    pub fn find_weakest_contact(&self, contact: &ContactDetails) -> Option<usize> {
        if self.points.len() < MAX_CONTACT_POINTS {
            return None;
        }

        let deepest = self
            .points
            .iter()
            .enumerate()
            .max_by(|(_, x), (_, y)| x.penetration_depth.total_cmp(&y.penetration_depth))
            .map(|(i, p)| (i, p.penetration_depth));
        let protected = deepest.and_then(|(i, depth)| (depth >= contact.penetration_depth).then_some(i));

        let p: [Vec3; MAX_CONTACT_POINTS] = std::array::from_fn(|i| self.points[i].contact_point_in_a);
        let new = contact.contact_point_in_a;

        // Area left behind when dropping point i: the quad formed by the new
        // point and the other three, measured by its diagonals.
        let area = |i: usize| -> f32 {
            let [a, b, c] = match i {
                0 => [p[1], p[3], p[2]],
                1 => [p[0], p[3], p[2]],
                2 => [p[0], p[3], p[1]],
                _ => [p[0], p[2], p[1]],
            };
            (new - a).cross(b - c).length_squared()
        };

        (0..MAX_CONTACT_POINTS)
            .filter(|&i| Some(i) != protected)
            .map(|i| (i, area(i)))
            .max_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(i, _)| i)
    }

    /// Re-derives every point from the current poses and drops stale ones.
    pub(crate) fn update(&mut self, bodies: &BodySet, config: &NarrowPhaseConfig) {
        self.points.retain(|point| point.refresh(bodies, config));
    }
}

/// Every live manifold, with O(1) lookup by body pair.
///
/// Iteration follows insertion order except where a removal moved the last
/// manifold into the freed slot.
#[derive(Debug, Clone, Default)]
pub struct ContactManifoldList {
    manifolds: Vec<ContactManifold>,
    index: FxHashMap<PairKey, usize>,
}

impl ContactManifoldList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.manifolds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    pub fn get(&self, key: PairKey) -> Option<&ContactManifold> {
        self.index.get(&key).map(|&i| &self.manifolds[i])
    }

    /// Manifold for `key`, created empty if missing. The flag tells whether it was created.
    pub fn get_or_insert(&mut self, key: PairKey) -> (&mut ContactManifold, bool) {
        match self.index.get(&key) {
            Some(&i) => (&mut self.manifolds[i], false),
            None => {
                let i = self.manifolds.len();
                self.manifolds.push(ContactManifold::new(key));
                self.index.insert(key, i);
                (&mut self.manifolds[i], true)
            }
        }
    }

    pub fn remove(&mut self, key: PairKey) -> Option<ContactManifold> {
        let i = self.index.remove(&key)?;
        let removed = self.manifolds.swap_remove(i);
        if let Some(moved) = self.manifolds.get(i) {
            self.index.insert(moved.key, i);
        }
        Some(removed)
    }

    /// Keeps the manifolds for which `keep` returns `true`; hands the others to `removed`.
    pub fn retain(&mut self, mut keep: impl FnMut(&mut ContactManifold) -> bool, mut removed: impl FnMut(ContactManifold)) {
        let mut i = 0;
        while i < self.manifolds.len() {
            if keep(&mut self.manifolds[i]) {
                i += 1;
                continue;
            }
            let key = self.manifolds[i].key;
            if let Some(manifold) = self.remove(key) {
                removed(manifold);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactManifold> {
        self.manifolds.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContactManifold> {
        self.manifolds.iter_mut()
    }

    /// Total number of contact points over all manifolds.
    pub fn point_count(&self) -> usize {
        self.manifolds.iter().map(ContactManifold::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::dynamics::RigidBody;
    use crate::geometry::Shape;
    use approx::assert_relative_eq;

    fn bodies() -> (BodySet, PairKey) {
        let mut bodies = BodySet::with_key();
        let shape = Arc::new(Shape::cuboid(Vec3::splat(5.0)));
        let a = bodies.insert(RigidBody::new(shape.clone(), 1.0));
        let b = bodies.insert(RigidBody::new(shape, 1.0));
        bodies[a].handle = a;
        bodies[b].handle = b;
        (bodies, PairKey::new(a, b))
    }

    fn contact_at(bodies: &BodySet, key: PairKey, point: Vec3, depth: f32) -> ContactDetails {
        ContactDetails::between(&bodies[key.0], &bodies[key.1], point, Vec3::Y, depth)
    }

    #[test]
    fn duplicates_are_dropped() {
        let (bodies, key) = bodies();
        let mut manifold = ContactManifold::new(key);
        assert!(manifold.add_contact(contact_at(&bodies, key, Vec3::ZERO, 0.1), 0.02));
        assert!(!manifold.add_contact(contact_at(&bodies, key, Vec3::new(0.01, 0.0, 0.0), 0.2), 0.02));
        assert_eq!(manifold.len(), 1);
    }

    #[test]
    fn duplicate_refreshes_geometry_and_keeps_solver_state() {
        let (bodies, key) = bodies();
        let mut manifold = ContactManifold::new(key);
        manifold.add_contact(contact_at(&bodies, key, Vec3::ZERO, 0.1), 0.02);
        crate::constraints::update_contact_constraints(&mut manifold.points_mut()[0], &bodies[key.0], &bodies[key.1], 1.0);
        if let Some(constraint) = manifold.points_mut()[0].contact_constraint.as_mut() {
            constraint.rows[0].multiplier_cached = 3.0;
        }

        assert!(!manifold.add_contact(contact_at(&bodies, key, Vec3::new(0.01, 0.0, 0.0), 0.2), 0.02));
        let point = &manifold.points()[0];
        assert!(point.contact_point.abs_diff_eq(Vec3::new(0.01, 0.0, 0.0), 1e-6));
        assert_relative_eq!(point.penetration_depth, 0.2);
        let warm = point.contact_constraint().map(|c| c.rows()[0].multiplier_cached);
        assert_eq!(warm, Some(3.0));
    }

    #[test]
    fn full_manifold_keeps_the_widest_patch() {
        let (bodies, key) = bodies();
        let mut manifold = ContactManifold::new(key);
        let corners = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        for corner in corners {
            manifold.add_contact(contact_at(&bodies, key, corner, 0.1), 0.02);
        }
        manifold.add_contact(contact_at(&bodies, key, Vec3::new(0.1, 0.0, 0.1), 0.1), 0.02);
        // A point near the middle shrinks the patch whatever it replaces;
        // all four corners cannot survive, but the manifold stays full.
        assert_eq!(manifold.len(), MAX_CONTACT_POINTS);

        let mut manifold = ContactManifold::new(key);
        for corner in corners {
            manifold.add_contact(contact_at(&bodies, key, corner * 0.5, 0.1), 0.02);
        }
        manifold.add_contact(contact_at(&bodies, key, Vec3::new(2.0, 0.0, 2.0), 0.1), 0.02);
        let kept: Vec<Vec3> = manifold.points().iter().map(|p| p.contact_point).collect();
        assert!(kept.iter().any(|p| p.abs_diff_eq(Vec3::new(2.0, 0.0, 2.0), 1e-5)));
        assert!(!kept.iter().any(|p| p.abs_diff_eq(Vec3::new(0.5, 0.0, 0.5), 1e-5)));
    }

    #[test]
    fn list_swap_remove_keeps_index() {
        let mut bodies = BodySet::with_key();
        let shape = Arc::new(Shape::sphere(1.0));
        let handles: Vec<_> = (0..4).map(|_| bodies.insert(RigidBody::new(shape.clone(), 1.0))).collect();

        let mut list = ContactManifoldList::new();
        let keys = [
            PairKey::new(handles[0], handles[1]),
            PairKey::new(handles[1], handles[2]),
            PairKey::new(handles[2], handles[3]),
        ];
        for key in keys {
            assert!(list.get_or_insert(key).1);
        }
        assert!(!list.get_or_insert(keys[1]).1);

        assert!(list.remove(keys[0]).is_some());
        assert!(list.remove(keys[0]).is_none());
        assert_eq!(list.get(keys[2]).map(ContactManifold::key), Some(keys[2]));

        let mut gone = Vec::new();
        list.retain(|m| !m.key().contains(handles[2]), |m| gone.push(m.key()));
        assert!(list.is_empty());
        assert_eq!(gone.len(), 2);
    }

    proptest! {
        #[test]
        fn capacity_and_deepest_point_survive(
            inserts in prop::collection::vec(((-2.0f32..2.0, -2.0f32..2.0), 0.0f32..1.0), 1..24)
        ) {
            let (bodies, key) = bodies();
            let mut manifold = ContactManifold::new(key);
            for ((x, z), depth) in inserts {
                let before = manifold.max_depth().unwrap_or(f32::NEG_INFINITY);
                manifold.add_contact(contact_at(&bodies, key, Vec3::new(x, 0.0, z), depth), 0.02);
                prop_assert!(manifold.len() <= MAX_CONTACT_POINTS);
                prop_assert!(manifold.max_depth().unwrap_or(f32::NEG_INFINITY) >= before);
            }
        }
    }
}
