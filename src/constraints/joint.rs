use crate::dynamics::{BodyHandle, BodySet};
use crate::error::{PhysicsError, Result};
use crate::math::{Quat, Vec3};

use super::constraint::{Constraint, ConstraintKind, DEFAULT_ERP};

/// Describes a user constraint; turned into a [`Constraint`] against the
/// current body poses when added to a world.
pub trait JointDesc {
    fn build(&self, bodies: &BodySet) -> Result<Constraint>;
}

/// Ball and socket joint pinning `body_a` to `body_b` (or to the world) at a
/// world space anchor point.
#[derive(Debug, Clone, Copy)]
pub struct PointConstraint {
    pub body_a: BodyHandle,
    pub body_b: Option<BodyHandle>,
    pub anchor: Vec3,
    pub breaking_threshold: Option<f32>,
    pub erp: f32,
}

impl PointConstraint {
    pub fn new(body_a: BodyHandle, body_b: Option<BodyHandle>, anchor: Vec3) -> Self {
        Self {
            body_a,
            body_b,
            anchor,
            breaking_threshold: None,
            erp: DEFAULT_ERP,
        }
    }

    pub fn with_breaking_threshold(mut self, threshold: f32) -> Self {
        self.breaking_threshold = Some(threshold);
        self
    }
}

impl JointDesc for PointConstraint {
    fn build(&self, bodies: &BodySet) -> Result<Constraint> {
        let (anchor_a, anchor_b, _) = local_anchors(bodies, self.body_a, self.body_b, self.anchor)?;
        let mut constraint = Constraint::new(
            ConstraintKind::Point { anchor_a, anchor_b },
            Some(self.body_a),
            self.body_b,
        );
        constraint.breaking_threshold = self.breaking_threshold;
        constraint.erp = self.erp;
        Ok(constraint)
    }
}

/// Rigidly locks `body_a` to `body_b` (or to the world) in their current
/// relative pose.
#[derive(Debug, Clone, Copy)]
pub struct WeldConstraint {
    pub body_a: BodyHandle,
    pub body_b: Option<BodyHandle>,
    pub anchor: Vec3,
    pub breaking_threshold: Option<f32>,
    pub erp: f32,
}

impl WeldConstraint {
    pub fn new(body_a: BodyHandle, body_b: Option<BodyHandle>, anchor: Vec3) -> Self {
        Self {
            body_a,
            body_b,
            anchor,
            breaking_threshold: None,
            erp: DEFAULT_ERP,
        }
    }

    pub fn with_breaking_threshold(mut self, threshold: f32) -> Self {
        self.breaking_threshold = Some(threshold);
        self
    }
}

impl JointDesc for WeldConstraint {
    fn build(&self, bodies: &BodySet) -> Result<Constraint> {
        let (anchor_a, anchor_b, reference) = local_anchors(bodies, self.body_a, self.body_b, self.anchor)?;
        let mut constraint = Constraint::new(
            ConstraintKind::Weld {
                anchor_a,
                anchor_b,
                reference,
            },
            Some(self.body_a),
            self.body_b,
        );
        constraint.breaking_threshold = self.breaking_threshold;
        constraint.erp = self.erp;
        Ok(constraint)
    }
}

/// Expresses a world anchor in each body's frame, plus B's rotation relative to A.
fn local_anchors(
    bodies: &BodySet,
    body_a: BodyHandle,
    body_b: Option<BodyHandle>,
    anchor: Vec3,
) -> Result<(Vec3, Vec3, Quat)> {
    let a = bodies.get(body_a).ok_or(PhysicsError::UnknownBody(body_a))?;
    let local_a = a.transform().inverse_transform_point(anchor);

    match body_b {
        Some(handle) => {
            let b = bodies.get(handle).ok_or(PhysicsError::UnknownBody(handle))?;
            let local_b = b.transform().inverse_transform_point(anchor);
            Ok((local_a, local_b, a.rotation.inverse() * b.rotation))
        }
        None => Ok((local_a, anchor, a.rotation.inverse())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dynamics::RigidBody;
    use crate::geometry::Shape;

    #[test]
    fn anchors_are_expressed_locally() {
        let mut bodies = BodySet::with_key();
        let shape = Arc::new(Shape::sphere(0.5));
        let a = bodies.insert(RigidBody::new(shape.clone(), 1.0).with_position(Vec3::new(-1.0, 0.0, 0.0)));
        let b = bodies.insert(RigidBody::new(shape, 1.0).with_position(Vec3::new(1.0, 0.0, 0.0)));

        let joint = PointConstraint::new(a, Some(b), Vec3::ZERO).build(&bodies).unwrap();
        assert_eq!(
            joint.kind(),
            &ConstraintKind::Point {
                anchor_a: Vec3::X,
                anchor_b: Vec3::NEG_X
            }
        );
    }

    #[test]
    fn unknown_body_is_rejected() {
        let mut bodies = BodySet::with_key();
        let a = bodies.insert(RigidBody::new(Arc::new(Shape::sphere(0.5)), 1.0));
        bodies.remove(a);
        assert_eq!(
            WeldConstraint::new(a, None, Vec3::ZERO).build(&bodies).unwrap_err(),
            PhysicsError::UnknownBody(a)
        );
    }
}
