use crate::collision::narrow_phase::NarrowPhaseConfig;
use crate::constraints::Constraint;
use crate::dynamics::{BodyHandle, BodySet, Collidable, RigidBody, ShapePath};
use crate::geometry::Shape;
use crate::math::Vec3;

/// Unordered body pair, smaller handle first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(pub BodyHandle, pub BodyHandle);

impl PairKey {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    #[inline]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.0 == handle || self.1 == handle
    }
}

/// Combined friction of two materials
#[inline]
pub fn combine_friction(a: f32, b: f32) -> f32 {
    (a * b).sqrt()
}

/// Combined restitution of two materials
#[inline]
pub fn combine_restitution(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// One contact point between two bodies.
///
/// The normal points from A towards B and the depth is measured along it:
/// `(point_a - point_b) . normal`, positive while the bodies overlap. Per-body
/// points are kept in each root body's local frame so the contact can be
/// re-derived after the bodies move.
#[derive(Debug, Clone)]
pub struct ContactDetails {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Sub-shape of A (compound children, mesh triangle) the contact is on.
    pub path_a: ShapePath,
    pub path_b: ShapePath,
    /// Midpoint between the two surface points, world space.
    pub contact_point: Vec3,
    pub contact_point_in_a: Vec3,
    pub contact_point_in_b: Vec3,
    pub normal: Vec3,
    /// Normal in A's local frame.
    pub normal_in_a: Vec3,
    /// Normal in B's local frame, followed instead when A is a ball or capsule.
    pub normal_in_b: Vec3,
    pub penetration_depth: f32,
    pub restitution: f32,
    pub friction: f32,
    /// Trigger-only stub: bodies are set, geometry is not.
    pub lightweight: bool,
    pub(crate) version_a: u32,
    pub(crate) version_b: u32,
    pub(crate) contact_constraint: Option<Constraint>,
    pub(crate) friction_constraint: Option<Constraint>,
}

impl ContactDetails {
    /// Contact between `a` and `b` at `contact_point` (midway between the
    /// surfaces) with `normal` from A to B.
    pub fn between(a: &dyn Collidable, b: &dyn Collidable, contact_point: Vec3, normal: Vec3, depth: f32) -> Self {
        let (body_a, body_b) = (a.body(), b.body());
        let point_a = contact_point + normal * (depth * 0.5);
        let point_b = contact_point - normal * (depth * 0.5);

        Self {
            body_a: body_a.handle(),
            body_b: body_b.handle(),
            path_a: a.path(),
            path_b: b.path(),
            contact_point,
            contact_point_in_a: a.to_body_local(a.transform().inverse_transform_point(point_a)),
            contact_point_in_b: b.to_body_local(b.transform().inverse_transform_point(point_b)),
            normal,
            normal_in_a: body_a.transform().inverse_transform_vector(normal),
            normal_in_b: body_b.transform().inverse_transform_vector(normal),
            penetration_depth: depth,
            ..Self::stub(body_a, body_b)
        }
    }

    /// Stub recording only the two bodies, reported for trigger overlaps.
    pub fn lightweight(a: &dyn Collidable, b: &dyn Collidable) -> Self {
        Self {
            path_a: a.path(),
            path_b: b.path(),
            lightweight: true,
            ..Self::stub(a.body(), b.body())
        }
    }

    fn stub(a: &RigidBody, b: &RigidBody) -> Self {
        Self {
            body_a: a.handle(),
            body_b: b.handle(),
            path_a: ShapePath::new(),
            path_b: ShapePath::new(),
            contact_point: Vec3::ZERO,
            contact_point_in_a: Vec3::ZERO,
            contact_point_in_b: Vec3::ZERO,
            normal: Vec3::ZERO,
            normal_in_a: Vec3::ZERO,
            normal_in_b: Vec3::ZERO,
            penetration_depth: 0.0,
            restitution: combine_restitution(a.restitution, b.restitution),
            friction: combine_friction(a.friction, b.friction),
            lightweight: false,
            version_a: a.version(),
            version_b: b.version(),
            contact_constraint: None,
            friction_constraint: None,
        }
    }

    /// The same contact seen from B's side.
    pub(crate) fn swapped(&self, a: &dyn Collidable, b: &dyn Collidable) -> Self {
        if self.lightweight {
            Self::lightweight(a, b)
        } else {
            Self::between(a, b, self.contact_point, -self.normal, self.penetration_depth)
        }
    }

    #[inline]
    pub fn key(&self) -> PairKey {
        PairKey::new(self.body_a, self.body_b)
    }

    /// Contact constraint built by the solver, if any.
    #[inline]
    pub fn contact_constraint(&self) -> Option<&Constraint> {
        self.contact_constraint.as_ref()
    }

    #[inline]
    pub fn friction_constraint(&self) -> Option<&Constraint> {
        self.friction_constraint.as_ref()
    }

    /// Re-derives world point, normal and depth from the current poses.
    ///
    /// The normal turns with A, or with B when A is a root ball or capsule
    /// that would otherwise roll it along. Returns `false` when the contact
    /// is stale: a body is gone or changed shape, the surfaces separated by
    /// more than the separation tolerance, the two points slid apart sideways
    /// by more than the drift tolerance, or a point on a ball or capsule
    /// rolled off the normal by more than the rolling tolerance.
    pub(crate) fn refresh(&mut self, bodies: &BodySet, config: &NarrowPhaseConfig) -> bool {
        let (Some(a), Some(b)) = (bodies.get(self.body_a), bodies.get(self.body_b)) else {
            return false;
        };
        if a.version() != self.version_a || b.version() != self.version_b {
            return false;
        }

        let point_a = a.transform().transform_point(self.contact_point_in_a);
        let point_b = b.transform().transform_point(self.contact_point_in_b);
        let normal = if rounded_core(a, &self.path_a, Vec3::ZERO).is_some() {
            b.transform().transform_vector(self.normal_in_b)
        } else {
            a.transform().transform_vector(self.normal_in_a)
        };

        let offset = point_a - point_b;
        let depth = offset.dot(normal);
        let lateral = offset - normal * depth;
        if depth < -config.separation_tolerance || lateral.length_squared() > config.drift_tolerance * config.drift_tolerance {
            return false;
        }
        if rolling_gap(a, &self.path_a, self.contact_point_in_a, normal) > config.rolling_tolerance
            || rolling_gap(b, &self.path_b, self.contact_point_in_b, -normal) > config.rolling_tolerance
        {
            return false;
        }

        self.normal = normal;
        self.penetration_depth = depth;
        self.contact_point = (point_a + point_b) * 0.5;
        true
    }
}

/// Center of the rounding under `point` (body local) and its radius, for a
/// contact on the root shape of a ball or capsule.
fn rounded_core(body: &RigidBody, path: &ShapePath, point: Vec3) -> Option<(Vec3, f32)> {
    if !path.is_empty() {
        return None;
    }
    match body.shape() {
        Shape::Sphere(s) => Some((Vec3::ZERO, s.radius)),
        Shape::Capsule(c) => {
            let y = point.y.max(-c.half_height).min(c.half_height);
            Some((Vec3::new(0.0, y, 0.0), c.radius))
        }
        _ => None,
    }
}

/// How far a surface point cached on a ball or capsule has rolled away from
/// the one facing `direction` (world space). Zero for flat shapes.
fn rolling_gap(body: &RigidBody, path: &ShapePath, point: Vec3, direction: Vec3) -> f32 {
    let Some((core, radius)) = rounded_core(body, path, point) else {
        return 0.0;
    };
    let lever = point - core;
    radius - lever.dot(body.transform().inverse_transform_vector(direction))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::math::Quat;
    use approx::assert_relative_eq;

    fn pair() -> (BodySet, BodyHandle, BodyHandle) {
        let mut bodies = BodySet::with_key();
        let shape = Arc::new(Shape::sphere(1.0));
        let a = bodies.insert(RigidBody::new(shape.clone(), 1.0));
        let b = bodies.insert(RigidBody::new(shape, 1.0).with_position(Vec3::new(1.5, 0.0, 0.0)));
        bodies[a].handle = a;
        bodies[b].handle = b;
        (bodies, a, b)
    }

    #[test]
    fn pair_key_is_unordered() {
        let (_, a, b) = pair();
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert!(PairKey::new(b, a).contains(a));
    }

    #[test]
    fn local_points_and_materials() {
        let (bodies, a, b) = pair();
        let contact = ContactDetails::between(&bodies[a], &bodies[b], Vec3::new(0.75, 0.0, 0.0), Vec3::X, 0.5);
        assert!(!contact.lightweight);
        assert!(contact.contact_point_in_a.abs_diff_eq(Vec3::X, 1e-6));
        assert!(contact.contact_point_in_b.abs_diff_eq(Vec3::NEG_X, 1e-6));
        assert_relative_eq!(contact.friction, 0.5);
        assert_relative_eq!(contact.restitution, 0.1);
    }

    #[test]
    fn refresh_tracks_motion() {
        let (mut bodies, a, b) = pair();
        let mut contact = ContactDetails::between(&bodies[a], &bodies[b], Vec3::new(0.75, 0.0, 0.0), Vec3::X, 0.5);

        bodies[b].set_transform(Vec3::new(1.6, 0.0, 0.0), Quat::IDENTITY);
        assert!(!contact.refresh(&bodies, &NarrowPhaseConfig::default()), "teleport bumps the version");

        bodies[b].set_transform(Vec3::new(1.5, 0.0, 0.0), Quat::IDENTITY);
        let mut contact = ContactDetails::between(&bodies[a], &bodies[b], Vec3::new(0.75, 0.0, 0.0), Vec3::X, 0.5);
        bodies[b].position = Vec3::new(1.7, 0.0, 0.0);
        bodies[b].update_derived();
        assert!(contact.refresh(&bodies, &NarrowPhaseConfig::default()));
        assert_relative_eq!(contact.penetration_depth, 0.3, epsilon = 1e-5);

        bodies[b].position = Vec3::new(1.7, 0.5, 0.0);
        bodies[b].update_derived();
        assert!(!contact.refresh(&bodies, &NarrowPhaseConfig::default()));
    }

    fn ball_on_ground(ball_first: bool) -> (BodySet, ContactDetails, BodyHandle) {
        let mut bodies = BodySet::with_key();
        let ground = bodies.insert(RigidBody::fixed(Arc::new(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))));
        let ball = bodies.insert(RigidBody::new(Arc::new(Shape::sphere(0.5)), 1.0).with_position(Vec3::new(0.0, 0.95, 0.0)));
        bodies[ground].handle = ground;
        bodies[ball].handle = ball;
        let contact_point = Vec3::new(0.0, 0.475, 0.0);
        let contact = if ball_first {
            ContactDetails::between(&bodies[ball], &bodies[ground], contact_point, Vec3::NEG_Y, 0.05)
        } else {
            ContactDetails::between(&bodies[ground], &bodies[ball], contact_point, Vec3::Y, 0.05)
        };
        (bodies, contact, ball)
    }

    fn roll(bodies: &mut BodySet, ball: BodyHandle, angle: f32) {
        bodies[ball].rotation = Quat::from_rotation_z(angle);
        bodies[ball].update_derived();
    }

    #[test]
    fn rolled_ball_point_is_dropped() {
        let config = NarrowPhaseConfig {
            drift_tolerance: 1.0,
            ..NarrowPhaseConfig::default()
        };
        for ball_first in [false, true] {
            let (mut bodies, mut contact, ball) = ball_on_ground(ball_first);
            roll(&mut bodies, ball, 0.05);
            assert!(contact.refresh(&bodies, &config));

            roll(&mut bodies, ball, 0.2);
            assert!(!contact.refresh(&bodies, &config), "lever arm no longer follows the normal");
        }
    }

    #[test]
    fn ball_contact_normal_follows_the_ground() {
        let (mut bodies, mut contact, ball) = ball_on_ground(true);
        roll(&mut bodies, ball, 0.05);
        assert!(contact.refresh(&bodies, &NarrowPhaseConfig::default()));
        assert!(contact.normal.abs_diff_eq(Vec3::NEG_Y, 1e-6));
    }
}
