use rustc_hash::FxHashMap;

use crate::collision::contact::ContactDetails;
use crate::dynamics::Collidable;
use crate::geometry::{Shape, ShapeType};

use super::clip::polyhedral;
use super::primitives::{capsule_capsule, capsule_hull, gjk_epa, sphere_capsule, sphere_hull, sphere_sphere};

/// A pairwise contact routine.
///
/// Pushes zero or more contacts between `a` and `b` onto the output, with
/// normals pointing from A to B. With `lightweight` set it pushes at most one
/// [`ContactDetails::lightweight`] stub once it knows the shapes overlap.
pub type ContactRoutine = fn(&dyn Collidable, &dyn Collidable, bool, &mut Vec<ContactDetails>);

/// Pairwise routines keyed by shape type, plus the mid-phase that breaks
/// compound and mesh shapes into convex pieces before dispatching.
#[derive(Clone)]
pub struct RoutineTable {
    routines: FxHashMap<(ShapeType, ShapeType), ContactRoutine>,
}

impl std::fmt::Debug for RoutineTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.routines.keys().collect();
        keys.sort_unstable();
        f.debug_struct("RoutineTable").field("routines", &keys).finish()
    }
}

impl Default for RoutineTable {
    fn default() -> Self {
        use ShapeType::*;

        let mut table = Self::empty();
        table.register(Sphere, Sphere, sphere_sphere);
        table.register(Sphere, Capsule, sphere_capsule);
        table.register(Capsule, Capsule, capsule_capsule);
        for hull in [Box, Cone, Triangle] {
            table.register(Sphere, hull, sphere_hull);
            table.register(Capsule, hull, capsule_hull);
        }
        table.register(Box, Box, polyhedral);
        table.register(Box, Triangle, polyhedral);
        table.register(Triangle, Triangle, polyhedral);
        table
    }
}

impl RoutineTable {
    /// A table with no routines: every convex pair goes through GJK/EPA.
    pub fn empty() -> Self {
        Self {
            routines: FxHashMap::default(),
        }
    }

    /// Registers `routine` for `(a, b)`, replacing any previous one. The
    /// mirrored pair `(b, a)` uses it too unless it has its own routine.
    pub fn register(&mut self, a: ShapeType, b: ShapeType, routine: ContactRoutine) {
        self.routines.insert((a, b), routine);
    }

    pub fn get(&self, a: ShapeType, b: ShapeType) -> Option<ContactRoutine> {
        self.routines.get(&(a, b)).copied()
    }

    /// Generates contacts between two collidables of any shape.
    pub fn collide(&self, a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
        if !a.aabb().intersects(b.aabb()) {
            return;
        }
        match (a.shape(), b.shape()) {
            (Shape::Compound(compound), _) => self.compound_first(a, compound, b, lightweight, out),
            (_, Shape::Compound(compound)) => self.compound_second(a, b, compound, lightweight, out),
            (Shape::Mesh(mesh_a), Shape::Mesh(mesh_b)) => self.mesh_mesh(a, mesh_a, b, mesh_b, lightweight, out),
            (Shape::Mesh(mesh), _) => self.mesh_convex(a, mesh, b, true, lightweight, out),
            (_, Shape::Mesh(mesh)) => self.mesh_convex(b, mesh, a, false, lightweight, out),
            _ => self.convex(a, b, lightweight, out),
        }
    }

    fn convex(&self, a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
        let (ta, tb) = (a.shape().shape_type(), b.shape().shape_type());
        if let Some(routine) = self.get(ta, tb) {
            routine(a, b, lightweight, out);
        } else if let Some(routine) = self.get(tb, ta) {
            let start = out.len();
            routine(b, a, lightweight, out);
            for contact in &mut out[start..] {
                *contact = contact.swapped(a, b);
            }
        } else {
            gjk_epa(a, b, lightweight, out);
        }
    }
}
