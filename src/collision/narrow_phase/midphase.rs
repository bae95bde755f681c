//! Mid-phase: splits compound and mesh shapes into convex pieces.
//!
//! Each piece is presented as a [`RigidBodyProxy`] that lives on the stack
//! for one recursion step; contacts found against it are reported for the
//! root body with points in the root body's frame.

use crate::collision::contact::ContactDetails;
use crate::dynamics::{Collidable, RigidBodyProxy};
use crate::geometry::{CompoundShape, MeshShape, NodeId};
use crate::math::Transform;

use super::dispatch::RoutineTable;

impl RoutineTable {
    pub(super) fn compound_first(
        &self,
        a: &dyn Collidable,
        compound: &CompoundShape,
        b: &dyn Collidable,
        lightweight: bool,
        out: &mut Vec<ContactDetails>,
    ) {
        let other = b.aabb();
        for (index, child) in compound.children().iter().enumerate() {
            let proxy = RigidBodyProxy::new(a, &child.shape, *child.transform(), index as u32);
            if proxy.aabb().intersects(other) {
                self.collide(&proxy, b, lightweight, out);
            }
        }
    }

    pub(super) fn compound_second(
        &self,
        a: &dyn Collidable,
        b: &dyn Collidable,
        compound: &CompoundShape,
        lightweight: bool,
        out: &mut Vec<ContactDetails>,
    ) {
        let other = a.aabb();
        for (index, child) in compound.children().iter().enumerate() {
            let proxy = RigidBodyProxy::new(b, &child.shape, *child.transform(), index as u32);
            if proxy.aabb().intersects(other) {
                self.collide(a, &proxy, lightweight, out);
            }
        }
    }

    /// Mesh against anything that is not a mesh: the other shape's bounds,
    /// taken into mesh space, select the triangles to test.
    pub(super) fn mesh_convex(
        &self,
        mesh_side: &dyn Collidable,
        mesh: &MeshShape,
        other: &dyn Collidable,
        mesh_is_a: bool,
        lightweight: bool,
        out: &mut Vec<ContactDetails>,
    ) {
        let local_bounds = other.aabb().transform(&mesh_side.transform().inverse());
        mesh.tree().query(local_bounds, |_, triangle| {
            let Some(shape) = mesh.triangle(triangle) else {
                return;
            };
            let proxy = RigidBodyProxy::new(mesh_side, shape, Transform::IDENTITY, triangle);
            if mesh_is_a {
                self.collide(&proxy, other, lightweight, out);
            } else {
                self.collide(other, &proxy, lightweight, out);
            }
        });
    }

    /// Walks both triangle trees in lock-step, with B's boxes mapped into
    /// A's frame, and tests leaf pairs whose boxes overlap.
    pub(super) fn mesh_mesh(
        &self,
        a: &dyn Collidable,
        mesh_a: &MeshShape,
        b: &dyn Collidable,
        mesh_b: &MeshShape,
        lightweight: bool,
        out: &mut Vec<ContactDetails>,
    ) {
        let (tree_a, tree_b) = (mesh_a.tree(), mesh_b.tree());
        let (Some(root_a), Some(root_b)) = (tree_a.root(), tree_b.root()) else {
            return;
        };
        let b_in_a = a.transform().inverse().mul_transform(b.transform());

        let mut stack: Vec<(NodeId, NodeId)> = vec![(root_a, root_b)];
        while let Some((node_a, node_b)) = stack.pop() {
            let box_a = tree_a.aabb(node_a);
            let box_b = tree_b.aabb(node_b).transform(&b_in_a);
            if !box_a.intersects(box_b) {
                continue;
            }

            match (tree_a.children(node_a), tree_b.children(node_b)) {
                (None, None) => {
                    let (Some(ia), Some(ib)) = (tree_a.data(node_a), tree_b.data(node_b)) else {
                        continue;
                    };
                    let (Some(shape_a), Some(shape_b)) = (mesh_a.triangle(ia), mesh_b.triangle(ib)) else {
                        continue;
                    };
                    let proxy_a = RigidBodyProxy::new(a, shape_a, Transform::IDENTITY, ia);
                    let proxy_b = RigidBodyProxy::new(b, shape_b, Transform::IDENTITY, ib);
                    self.collide(&proxy_a, &proxy_b, lightweight, out);
                }
                (Some((left, right)), None) => {
                    stack.push((left, node_b));
                    stack.push((right, node_b));
                }
                (None, Some((left, right))) => {
                    stack.push((node_a, left));
                    stack.push((node_a, right));
                }
                (Some((left_a, right_a)), Some((left_b, right_b))) => {
                    // Descend into the larger box first.
                    if box_a.surface_area() >= box_b.surface_area() {
                        stack.push((left_a, node_b));
                        stack.push((right_a, node_b));
                    } else {
                        stack.push((node_a, left_b));
                        stack.push((node_a, right_b));
                    }
                }
            }
        }
    }
}
