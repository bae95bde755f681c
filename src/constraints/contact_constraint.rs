use crate::collision::ContactDetails;
use crate::dynamics::RigidBody;
use crate::math::{tangent_basis, Vec3};

use super::constraint::{Constraint, ConstraintKind};

/// Builds the contact (and, with friction, the friction) constraint of a
/// contact point the first time it is seen, and refreshes their Jacobians
/// from the current contact geometry on every later step.
///
/// The contact row pushes along the normal only (`J * v >= bias`); its bias
/// is the restitution target, applied only to impacts faster than
/// `restitution_threshold`.
pub fn update_contact_constraints(
    contact: &mut ContactDetails,
    body_a: &RigidBody,
    body_b: &RigidBody,
    restitution_threshold: f32,
) {
    let normal = contact.normal;
    let r_a = contact.contact_point - body_a.position;
    let r_b = contact.contact_point - body_b.position;

    let handles = (Some(contact.body_a), Some(contact.body_b));
    let constraint = contact
        .contact_constraint
        .get_or_insert_with(|| Constraint::new(ConstraintKind::Contact, handles.0, handles.1));
    let row = &mut constraint.rows[0];
    set_row_axis(row, normal, r_a, r_b);

    // Approach speed along the normal (negative when closing)
    let closing = row.dot_jacobian(
        (body_a.linear_velocity, body_a.angular_velocity),
        (body_b.linear_velocity, body_b.angular_velocity),
    );
    row.bias = if closing < -restitution_threshold {
        -contact.restitution * closing
    } else {
        0.0
    };

    if contact.friction <= 0.0 {
        contact.friction_constraint = None;
        return;
    }

    let friction = contact
        .friction_constraint
        .get_or_insert_with(|| Constraint::new(ConstraintKind::Friction, handles.0, handles.1));
    let (t1, t2) = tangent_basis(normal);
    for (row, tangent) in friction.rows.iter_mut().zip([t1, t2]) {
        set_row_axis(row, tangent, r_a, r_b);
        row.bias = 0.0;
    }
}

fn set_row_axis(row: &mut super::ConstraintRow, axis: Vec3, r_a: Vec3, r_b: Vec3) {
    row.set_jacobian(-axis, -r_a.cross(axis), axis, r_b.cross(axis));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dynamics::BodySet;
    use crate::geometry::Shape;
    use approx::assert_relative_eq;

    fn falling_pair(speed: f32, restitution: f32) -> (BodySet, ContactDetails) {
        let mut bodies = BodySet::with_key();
        let ground = bodies.insert(RigidBody::fixed(Arc::new(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))));
        let ball = bodies.insert(
            RigidBody::new(Arc::new(Shape::sphere(0.5)), 1.0)
                .with_position(Vec3::new(0.0, 0.9, 0.0))
                .with_linear_velocity(Vec3::new(0.0, -speed, 0.0))
                .with_restitution(restitution),
        );
        bodies[ground].handle = ground;
        bodies[ball].handle = ball;

        let contact = ContactDetails::between(
            &bodies[ground],
            &bodies[ball],
            Vec3::new(0.0, 0.45, 0.0),
            Vec3::Y,
            0.1,
        );
        (bodies, contact)
    }

    #[test]
    fn builds_contact_and_friction_once() {
        let (bodies, mut contact) = falling_pair(0.0, 0.0);
        let (a, b) = (&bodies[contact.body_a], &bodies[contact.body_b]);
        update_contact_constraints(&mut contact, a, b, 1.0);

        let built = contact.contact_constraint.clone().unwrap();
        assert_eq!(built.rows()[0].lower_limit, 0.0);
        assert_eq!(&built.rows()[0].jacobian[6..9], &[0.0, 1.0, 0.0]);
        assert!(contact.friction_constraint.is_some());

        contact.contact_constraint.as_mut().unwrap().rows[0].multiplier_cached = 7.0;
        update_contact_constraints(&mut contact, a, b, 1.0);
        assert_eq!(contact.contact_constraint.as_ref().unwrap().rows()[0].multiplier_cached, 7.0);
    }

    #[test]
    fn restitution_only_above_threshold() {
        let (bodies, mut contact) = falling_pair(0.5, 0.5);
        let (a, b) = (&bodies[contact.body_a], &bodies[contact.body_b]);
        update_contact_constraints(&mut contact, a, b, 1.0);
        assert_eq!(contact.contact_constraint.as_ref().unwrap().rows()[0].bias, 0.0);

        let (bodies, mut contact) = falling_pair(4.0, 0.5);
        let (a, b) = (&bodies[contact.body_a], &bodies[contact.body_b]);
        update_contact_constraints(&mut contact, a, b, 1.0);
        assert_relative_eq!(contact.contact_constraint.as_ref().unwrap().rows()[0].bias, 2.0, epsilon = 1e-5);
    }
}
