use crate::math::Vec3;

use super::rigid_body::BodyHandle;
use super::BodySet;

/// Adds forces to bodies once per sub-step, before contacts are generated.
pub trait ForceGenerator: Send + Sync {
    fn apply(&mut self, bodies: &mut BodySet, dt: f32);
}

/// Where one end of a [`SpringForce`] is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpringAnchor {
    /// A point in the body's local frame.
    Body(BodyHandle, Vec3),
    /// A fixed world space point.
    World(Vec3),
}

/// Damped spring between two anchors (Hooke's law along the spring axis).
#[derive(Debug, Clone)]
pub struct SpringForce {
    pub a: SpringAnchor,
    pub b: SpringAnchor,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl SpringForce {
    pub fn new(a: SpringAnchor, b: SpringAnchor, rest_length: f32, stiffness: f32) -> Self {
        Self {
            a,
            b,
            rest_length,
            stiffness,
            damping: 0.0,
        }
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    /// World position and velocity of an anchor; `None` if its body is gone.
    fn resolve(anchor: SpringAnchor, bodies: &BodySet) -> Option<(Vec3, Vec3)> {
        match anchor {
            SpringAnchor::World(point) => Some((point, Vec3::ZERO)),
            SpringAnchor::Body(handle, local) => {
                let body = bodies.get(handle)?;
                let point = body.transform().transform_point(local);
                Some((point, body.velocity_at_point(point)))
            }
        }
    }

    fn push(anchor: SpringAnchor, bodies: &mut BodySet, force: Vec3, point: Vec3) {
        if let SpringAnchor::Body(handle, _) = anchor {
            if let Some(body) = bodies.get_mut(handle) {
                body.apply_force_at_world_point(force, point);
            }
        }
    }
}

impl ForceGenerator for SpringForce {
    fn apply(&mut self, bodies: &mut BodySet, _dt: f32) {
        let (Some((pa, va)), Some((pb, vb))) =
            (Self::resolve(self.a, bodies), Self::resolve(self.b, bodies))
        else {
            return;
        };

        let delta = pb - pa;
        let length = delta.length();
        if length <= f32::EPSILON {
            return;
        }
        let axis = delta / length;
        let stretch = length - self.rest_length;
        let closing = (vb - va).dot(axis);
        let force = axis * (self.stiffness * stretch + self.damping * closing);

        Self::push(self.a, bodies, force, pa);
        Self::push(self.b, bodies, -force, pb);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dynamics::RigidBody;
    use crate::geometry::Shape;

    #[test]
    fn stretched_spring_pulls_together() {
        let mut bodies = BodySet::with_key();
        let shape = Arc::new(Shape::sphere(0.5));
        let a = bodies.insert(RigidBody::new(shape.clone(), 1.0));
        let b = bodies.insert(RigidBody::new(shape, 1.0).with_position(Vec3::new(3.0, 0.0, 0.0)));

        let mut spring = SpringForce::new(
            SpringAnchor::Body(a, Vec3::ZERO),
            SpringAnchor::Body(b, Vec3::ZERO),
            1.0,
            10.0,
        );
        spring.apply(&mut bodies, 0.01);

        assert!(bodies[a].accumulated_force().abs_diff_eq(Vec3::new(20.0, 0.0, 0.0), 1e-4));
        assert!(bodies[b].accumulated_force().abs_diff_eq(Vec3::new(-20.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn world_anchor_and_missing_body() {
        let mut bodies = BodySet::with_key();
        let shape = Arc::new(Shape::sphere(0.5));
        let a = bodies.insert(RigidBody::new(shape, 1.0).with_position(Vec3::new(0.0, -2.0, 0.0)));

        let mut spring = SpringForce::new(SpringAnchor::World(Vec3::ZERO), SpringAnchor::Body(a, Vec3::ZERO), 0.0, 5.0);
        spring.apply(&mut bodies, 0.01);
        assert!(bodies[a].accumulated_force().abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-4));

        bodies.remove(a);
        spring.apply(&mut bodies, 0.01);
    }
}
