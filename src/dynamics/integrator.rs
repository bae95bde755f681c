use crate::math::{integrate_rotation, Vec3};

use super::rigid_body::{BodyType, RigidBody};

/// Adds gravity and the body's constant accelerations to its accumulated force.
///
/// Only dynamic bodies are affected. A per-body gravity replaces `world_gravity`.
pub fn apply_gravity(body: &mut RigidBody, world_gravity: Vec3) {
    if !body.is_dynamic() {
        return;
    }
    let mass = body.mass();
    let gravity = body.gravity().unwrap_or(world_gravity);
    body.apply_force((gravity + body.linear_acceleration) * mass);

    let angular = body.inertia_tensor_world() * body.angular_acceleration;
    body.apply_torque(angular);
}

/// Semi-implicit Euler step for one body.
///
/// Static bodies only drop their accumulated forces. Kinematic bodies move
/// with their current velocity and ignore forces. Derived data is refreshed
/// afterwards so the next broadphase pass sees the new bounds.
pub fn integrate(body: &mut RigidBody, dt: f32) {
    match body.body_type() {
        BodyType::Static => {
            body.clear_forces();
            return;
        }
        BodyType::Kinematic => {}
        BodyType::Dynamic => {
            // Forces to velocities
            let linear = body.accumulated_force() * body.inverse_mass() * dt;
            let angular = body.inverse_inertia_tensor_world() * body.accumulated_torque() * dt;
            body.linear_velocity += linear;
            body.angular_velocity += angular;

            // Damping is expressed as the fraction lost per second
            body.linear_velocity *= (1.0 - body.linear_damping).powf(dt);
            body.angular_velocity *= (1.0 - body.angular_damping).powf(dt);
        }
    }

    body.position += body.linear_velocity * dt;
    body.rotation = integrate_rotation(body.rotation, body.angular_velocity, dt);

    body.clear_forces();
    body.update_derived();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geometry::Shape;
    use approx::assert_relative_eq;

    const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

    fn ball(mass: f32) -> RigidBody {
        RigidBody::new(Arc::new(Shape::sphere(0.5)), mass)
    }

    #[test]
    fn gravity_accelerates_dynamic_bodies() {
        let mut body = ball(2.0);
        apply_gravity(&mut body, GRAVITY);
        assert!(body.accumulated_force().abs_diff_eq(GRAVITY * 2.0, 1e-5));

        integrate(&mut body, 0.1);
        assert_relative_eq!(body.linear_velocity.y, -0.981, epsilon = 1e-5);
        assert!(body.position.y < 0.0);
        assert_eq!(body.accumulated_force(), Vec3::ZERO);
        assert_relative_eq!(body.aabb().center().y, body.position.y, epsilon = 1e-6);
    }

    #[test]
    fn body_gravity_overrides_world() {
        let mut body = ball(1.0).with_gravity(Vec3::new(0.0, 1.0, 0.0));
        apply_gravity(&mut body, GRAVITY);
        assert!(body.accumulated_force().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn static_bodies_stay_put() {
        let mut body = ball(f32::INFINITY);
        apply_gravity(&mut body, GRAVITY);
        body.apply_force(Vec3::X * 100.0);
        integrate(&mut body, 1.0);
        assert_eq!(body.position, Vec3::ZERO);
        assert_eq!(body.accumulated_force(), Vec3::ZERO);
    }

    #[test]
    fn kinematic_bodies_ignore_forces() {
        let mut body = ball(1.0).with_linear_velocity(Vec3::X);
        body.set_kinematic(true);
        apply_gravity(&mut body, GRAVITY);
        body.apply_force(Vec3::Y * 100.0);
        integrate(&mut body, 0.5);
        assert!(body.position.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
        assert_eq!(body.linear_velocity, Vec3::X);
    }

    #[test]
    fn angular_velocity_rotates() {
        let mut body = ball(1.0).with_angular_velocity(Vec3::new(0.0, 0.0, std::f32::consts::PI));
        integrate(&mut body, 1.0);
        let local_x = body.rotation * Vec3::X;
        assert!(local_x.x < -0.9);
    }

    #[test]
    fn damping_slows_down() {
        let mut body = ball(1.0)
            .with_linear_velocity(Vec3::new(10.0, 0.0, 0.0))
            .with_damping(0.1, 0.0);
        integrate(&mut body, 1.0);
        assert_relative_eq!(body.linear_velocity.x, 9.0, epsilon = 1e-4);
    }
}
