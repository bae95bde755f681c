use smallvec::{smallvec, SmallVec};

use crate::dynamics::{BodyHandle, BodySet, RigidBody};
use crate::math::{Quat, Vec3};

use super::row::ConstraintRow;

slotmap::new_key_type! {
    /// Handle of a user constraint owned by the solver.
    pub struct ConstraintHandle;
}

/// Default error reduction applied to joint drift per step.
pub const DEFAULT_ERP: f32 = 0.2;

/// What a [`Constraint`] enforces.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// Non-penetration along the contact normal (one row).
    Contact,
    /// Coulomb friction along two tangents (two rows).
    Friction,
    /// Ball and socket. `anchor_b` is in B's frame, or in world space without B.
    Point { anchor_a: Vec3, anchor_b: Vec3 },
    /// Point constraint plus locked relative orientation.
    Weld {
        anchor_a: Vec3,
        anchor_b: Vec3,
        /// Rotation of B relative to A when the weld was made.
        reference: Quat,
    },
}

/// A set of rows acting between two bodies. Either body may be absent
/// (anchored to the world).
#[derive(Debug, Clone)]
pub struct Constraint {
    kind: ConstraintKind,
    pub body_a: Option<BodyHandle>,
    pub body_b: Option<BodyHandle>,
    pub(crate) rows: SmallVec<[ConstraintRow; 6]>,
    active: bool,
    /// Impulse magnitude above which the constraint switches itself off.
    pub breaking_threshold: Option<f32>,
    pub erp: f32,
    last_impulse: f32,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, body_a: Option<BodyHandle>, body_b: Option<BodyHandle>) -> Self {
        let rows = match kind {
            ConstraintKind::Contact => smallvec![ConstraintRow::new(0.0, f32::INFINITY)],
            ConstraintKind::Friction => smallvec![ConstraintRow::new(0.0, 0.0); 2],
            ConstraintKind::Point { .. } => smallvec![ConstraintRow::default(); 3],
            ConstraintKind::Weld { .. } => smallvec![ConstraintRow::default(); 6],
        };
        Self {
            kind,
            body_a,
            body_b,
            rows,
            active: true,
            breaking_threshold: None,
            erp: DEFAULT_ERP,
            last_impulse: 0.0,
        }
    }

    #[inline]
    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    #[inline]
    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Magnitude of the impulse applied during the last step.
    #[inline]
    pub fn last_impulse(&self) -> f32 {
        self.last_impulse
    }

    pub(crate) fn set_last_impulse(&mut self, impulse: f32) {
        self.last_impulse = impulse;
    }

    /// `true` if `handle` is one of the constrained bodies.
    pub fn involves(&self, handle: BodyHandle) -> bool {
        self.body_a == Some(handle) || self.body_b == Some(handle)
    }

    /// Rebuilds joint Jacobians and drift biases from current body poses.
    /// Contact and friction rows are rebuilt by the contact builders instead.
    pub(crate) fn update_joint_rows(&mut self, bodies: &BodySet, dt: f32) {
        let a = self.body_a.and_then(|h| bodies.get(h));
        let b = self.body_b.and_then(|h| bodies.get(h));
        let erp_rate = self.erp / dt;

        let (anchor_a, anchor_b) = match self.kind {
            ConstraintKind::Point { anchor_a, anchor_b } | ConstraintKind::Weld { anchor_a, anchor_b, .. } => {
                (anchor_a, anchor_b)
            }
            ConstraintKind::Contact | ConstraintKind::Friction => return,
        };

        let (pa, ca) = world_anchor(a, anchor_a);
        let (pb, cb) = world_anchor(b, anchor_b);
        let error = pb - pa;

        for (row, axis) in self.rows.iter_mut().zip([Vec3::X, Vec3::Y, Vec3::Z]) {
            let r_a = pa - ca;
            let r_b = pb - cb;
            row.set_jacobian(-axis, -r_a.cross(axis), axis, r_b.cross(axis));
            row.bias = -erp_rate * error.dot(axis);
        }

        if let ConstraintKind::Weld { reference, .. } = self.kind {
            let rotation_a = a.map_or(Quat::IDENTITY, |body| body.rotation);
            let rotation_b = b.map_or(Quat::IDENTITY, |body| body.rotation);
            let mut drift = rotation_b * (rotation_a * reference).inverse();
            if drift.w < 0.0 {
                drift = -drift;
            }
            let angle_error = Vec3::new(drift.x, drift.y, drift.z) * 2.0;

            for (row, axis) in self.rows[3..].iter_mut().zip([Vec3::X, Vec3::Y, Vec3::Z]) {
                row.set_jacobian(Vec3::ZERO, -axis, Vec3::ZERO, axis);
                row.bias = -erp_rate * angle_error.dot(axis);
            }
        }
    }
}

/// World position of an anchor and the center it rotates about.
fn world_anchor(body: Option<&RigidBody>, anchor: Vec3) -> (Vec3, Vec3) {
    match body {
        Some(body) => (body.transform().transform_point(anchor), body.position),
        None => (anchor, anchor),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geometry::Shape;
    use approx::assert_relative_eq;

    #[test]
    fn row_counts_follow_kind() {
        assert_eq!(Constraint::new(ConstraintKind::Contact, None, None).rows().len(), 1);
        assert_eq!(Constraint::new(ConstraintKind::Friction, None, None).rows().len(), 2);
        let point = ConstraintKind::Point {
            anchor_a: Vec3::ZERO,
            anchor_b: Vec3::ZERO,
        };
        assert_eq!(Constraint::new(point, None, None).rows().len(), 3);
    }

    #[test]
    fn point_rows_measure_drift() {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(RigidBody::new(Arc::new(Shape::sphere(0.5)), 1.0).with_position(Vec3::new(0.0, -0.1, 0.0)));

        let mut joint = Constraint::new(
            ConstraintKind::Point {
                anchor_a: Vec3::ZERO,
                anchor_b: Vec3::ZERO,
            },
            Some(a),
            None,
        );
        joint.update_joint_rows(&bodies, 0.1);

        // Anchor sits 0.1 below its world target: the Y row asks for upward motion of A.
        let y = &joint.rows()[1];
        assert_relative_eq!(y.bias, -2.0 * 0.1, epsilon = 1e-6);
        assert_eq!(&y.jacobian[0..3], &[0.0, -1.0, 0.0]);
    }
}
