use std::sync::Arc;

use slotmap::Key;

use crate::error::{PhysicsError, Result};
use crate::geometry::{Aabb, Shape};
use crate::math::{Mat3, Quat, Transform, Vec3};
use crate::world::WorldId;

slotmap::new_key_type! {
    /// Handle of a rigid body owned by a [`World`](crate::World).
    pub struct BodyHandle;
}

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Moved by forces, gravity and contacts.
    #[default]
    Dynamic,
    /// Never moves.
    Static,
    /// Moves with its own velocity; forces and contacts do not affect it.
    Kinematic,
}

/// A rigid body.
///
/// Bodies are created free standing and become live once added to a
/// [`World`](crate::World). Anything that changes collision behavior goes
/// through an explicit setter, which bumps [`RigidBody::version`] when cached
/// contacts become stale and flags the body for a broadphase re-sync that the
/// owning world performs before its next pass.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) handle: BodyHandle,
    pub(crate) world: Option<WorldId>,

    shape: Arc<Shape>,
    body_type: BodyType,

    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,

    /// Constant acceleration added every step on top of gravity.
    pub linear_acceleration: Vec3,
    pub angular_acceleration: Vec3,

    accumulated_force: Vec3,
    accumulated_torque: Vec3,

    mass: f32,
    inertia_tensor: Mat3,
    inverse_inertia_tensor: Mat3,
    inverse_inertia_tensor_world: Mat3,

    transform: Transform,
    transform_inverse: Transform,
    aabb: Aabb,

    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,

    gravity: Option<Vec3>,
    layer: u32,
    is_trigger: bool,

    version: u32,
    broadphase_dirty: bool,

    /// Running solver accumulator: linear then angular acceleration.
    pub(crate) solver_impulse: [Vec3; 2],
    /// Penetration pass pseudo-velocities, separate from real velocity.
    pub(crate) push_velocity: Vec3,
    pub(crate) turn_velocity: Vec3,

    pub user_data: u64,
}

impl RigidBody {
    /// A dynamic body of `mass` using `shape`. Infinite mass makes it static.
    pub fn new(shape: Arc<Shape>, mass: f32) -> Self {
        let mut body = Self {
            handle: BodyHandle::null(),
            world: None,
            shape,
            body_type: BodyType::Dynamic,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            linear_acceleration: Vec3::ZERO,
            angular_acceleration: Vec3::ZERO,
            accumulated_force: Vec3::ZERO,
            accumulated_torque: Vec3::ZERO,
            mass: 1.0,
            inertia_tensor: Mat3::IDENTITY,
            inverse_inertia_tensor: Mat3::IDENTITY,
            inverse_inertia_tensor_world: Mat3::IDENTITY,
            transform: Transform::IDENTITY,
            transform_inverse: Transform::IDENTITY,
            aabb: Aabb::EMPTY,
            friction: 0.5,
            restitution: 0.1,
            linear_damping: 0.0,
            angular_damping: 0.05,
            gravity: None,
            layer: 0,
            is_trigger: false,
            version: 0,
            broadphase_dirty: false,
            solver_impulse: [Vec3::ZERO; 2],
            push_velocity: Vec3::ZERO,
            turn_velocity: Vec3::ZERO,
            user_data: 0,
        };
        if mass.is_finite() && mass > 0.0 {
            body.mass = mass;
        } else {
            body.body_type = BodyType::Static;
        }
        body.update_mass_properties();
        body.update_derived();
        body
    }

    /// A body that never moves.
    pub fn fixed(shape: Arc<Shape>) -> Self {
        Self::new(shape, f32::INFINITY)
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self.update_derived();
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self.update_derived();
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear.clamp(0.0, 1.0);
        self.angular_damping = angular.clamp(0.0, 1.0);
        self
    }

    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self.update_mass_properties();
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_trigger(mut self, is_trigger: bool) -> Self {
        self.is_trigger = is_trigger;
        self
    }

    /// Per-body gravity, replacing the world's.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = Some(gravity);
        self
    }

    /// Handle assigned by the owning world; the null key while unattached.
    #[inline]
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    #[inline]
    pub fn is_in_world(&self) -> bool {
        self.world.is_some()
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn shape_arc(&self) -> &Arc<Shape> {
        &self.shape
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    #[inline]
    pub fn is_trigger(&self) -> bool {
        self.is_trigger
    }

    #[inline]
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Bumped whenever shape derived data changes.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn gravity(&self) -> Option<Vec3> {
        self.gravity
    }

    /// Mass as seen by the solver: infinite unless the body is dynamic.
    #[inline]
    pub fn mass(&self) -> f32 {
        if self.is_dynamic() {
            self.mass
        } else {
            f32::INFINITY
        }
    }

    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        if self.is_dynamic() {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    #[inline]
    pub fn inertia_tensor(&self) -> Mat3 {
        self.inertia_tensor
    }

    /// Inertia tensor rotated into world space.
    #[inline]
    pub fn inertia_tensor_world(&self) -> Mat3 {
        let rotation = self.transform.rotation_matrix();
        rotation * self.inertia_tensor * rotation.transpose()
    }

    #[inline]
    pub fn inverse_inertia_tensor_world(&self) -> Mat3 {
        self.inverse_inertia_tensor_world
    }

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    pub fn transform_inverse(&self) -> &Transform {
        &self.transform_inverse
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    #[inline]
    pub fn accumulated_force(&self) -> Vec3 {
        self.accumulated_force
    }

    #[inline]
    pub fn accumulated_torque(&self) -> Vec3 {
        self.accumulated_torque
    }

    /// Teleports the body. Cached contacts are invalidated.
    pub fn set_transform(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation.normalize();
        self.update_derived();
        self.touch(true);
    }

    pub fn set_shape(&mut self, shape: Arc<Shape>) {
        self.shape = shape;
        self.update_mass_properties();
        self.update_derived();
        self.touch(true);
    }

    /// Sets the mass. Infinity makes the body static; finite values make a
    /// static body dynamic again. Kinematic bodies keep their type.
    pub fn set_mass(&mut self, mass: f32) -> Result<()> {
        if mass.is_nan() || mass <= 0.0 {
            return Err(PhysicsError::InvalidMass(mass));
        }
        if mass.is_infinite() {
            if self.body_type == BodyType::Dynamic {
                self.body_type = BodyType::Static;
            }
        } else {
            self.mass = mass;
            if self.body_type == BodyType::Static {
                self.body_type = BodyType::Dynamic;
            }
        }
        self.update_mass_properties();
        self.touch(true);
        Ok(())
    }

    pub fn set_body_type(&mut self, body_type: BodyType) {
        if self.body_type == body_type {
            return;
        }
        self.body_type = body_type;
        if body_type == BodyType::Static {
            self.linear_velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
        }
        self.update_mass_properties();
        self.touch(true);
    }

    /// `true` makes the body static, `false` makes it dynamic.
    pub fn set_static(&mut self, is_static: bool) {
        self.set_body_type(if is_static {
            BodyType::Static
        } else {
            BodyType::Dynamic
        });
    }

    /// `true` makes the body kinematic, `false` makes it dynamic.
    pub fn set_kinematic(&mut self, is_kinematic: bool) {
        self.set_body_type(if is_kinematic {
            BodyType::Kinematic
        } else {
            BodyType::Dynamic
        });
    }

    pub fn set_layer(&mut self, layer: u32) {
        if self.layer != layer {
            self.layer = layer;
            self.touch(false);
        }
    }

    /// Trigger bodies are ghosts: their overlaps raise trigger events but
    /// never produce contact points or a collision response.
    pub fn set_trigger(&mut self, is_trigger: bool) {
        if self.is_trigger != is_trigger {
            self.is_trigger = is_trigger;
            self.touch(true);
        }
    }

    pub fn set_gravity(&mut self, gravity: Option<Vec3>) {
        self.gravity = gravity;
    }

    pub fn apply_force(&mut self, force: Vec3) {
        self.accumulated_force += force;
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.accumulated_torque += torque;
    }

    /// Force applied at a world space point, producing torque about the center of mass.
    pub fn apply_force_at_world_point(&mut self, force: Vec3, point: Vec3) {
        self.accumulated_force += force;
        self.accumulated_torque += (point - self.position).cross(force);
    }

    /// Force (world space) applied at a point given in the body's local frame.
    pub fn apply_force_at_local_point(&mut self, force: Vec3, point: Vec3) {
        let world_point = self.transform.transform_point(point);
        self.apply_force_at_world_point(force, world_point);
    }

    /// Instant change of linear momentum.
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        self.linear_velocity += impulse * self.inverse_mass();
    }

    pub fn apply_impulse_at_world_point(&mut self, impulse: Vec3, point: Vec3) {
        self.linear_velocity += impulse * self.inverse_mass();
        self.angular_velocity +=
            self.inverse_inertia_tensor_world * (point - self.position).cross(impulse);
    }

    /// Velocity of the material point currently at `point` (world space).
    #[inline]
    pub fn velocity_at_point(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    pub fn clear_forces(&mut self) {
        self.accumulated_force = Vec3::ZERO;
        self.accumulated_torque = Vec3::ZERO;
    }

    /// Refreshes the cached transform, its inverse, the world AABB and the
    /// world inverse inertia from position and rotation.
    pub fn update_derived(&mut self) {
        self.transform = Transform::new(self.position, self.rotation);
        self.transform_inverse = self.transform.inverse();
        self.aabb = self.shape.local_aabb().transform(&self.transform);

        let rotation = self.transform.rotation_matrix();
        self.inverse_inertia_tensor_world =
            rotation * self.inverse_inertia_tensor * rotation.transpose();
    }

    /// Consumes the pending broadphase re-sync flag.
    pub(crate) fn take_broadphase_dirty(&mut self) -> bool {
        std::mem::take(&mut self.broadphase_dirty)
    }

    fn touch(&mut self, bump_version: bool) {
        if bump_version {
            self.version = self.version.wrapping_add(1);
        }
        self.broadphase_dirty = true;
    }

    fn update_mass_properties(&mut self) {
        if self.is_dynamic() {
            self.inertia_tensor = self.shape.inertia_tensor(self.mass);
            self.inverse_inertia_tensor = if self.inertia_tensor.determinant().abs() > f32::EPSILON {
                self.inertia_tensor.inverse()
            } else {
                Mat3::ZERO
            };
        } else {
            self.inertia_tensor = Mat3::ZERO;
            self.inverse_inertia_tensor = Mat3::ZERO;
        }
        let rotation = self.transform.rotation_matrix();
        self.inverse_inertia_tensor_world =
            rotation * self.inverse_inertia_tensor * rotation.transpose();
    }
}
