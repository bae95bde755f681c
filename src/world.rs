use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::Key;
use tracing::{debug, trace, warn};

use crate::collision::narrow_phase::{time_of_impact, ConvexSupport};
use crate::collision::{
    layer_matches, Broadphase, CollisionMatrix, ContactManifoldList, NarrowPhase, PooledBroadphase,
};
use crate::constraints::{Constraint, ConstraintHandle, JointDesc};
use crate::dynamics::{apply_gravity, integrate, BodyHandle, BodySet, ForceGenerator, RigidBody};
use crate::error::{PhysicsError, Result};
use crate::events::{ConstraintListener, ContactListener, ListenerId, ListenerList, StepListener};
use crate::geometry::{Aabb, RayIntersection, Shape};
use crate::math::{Quat, Transform, Vec3};
use crate::solver::IterativeSolver;

/// Identifies a [`World`]; bodies record the id of the world that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(u64);

impl WorldId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Configuration for the physics world
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldConfig {
    /// Gravity vector
    pub gravity: Vec3,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

/// Where a swept shape first touches a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeIntersection {
    pub body: BodyHandle,
    /// Contact point on the body's surface, world space.
    pub point: Vec3,
    /// Body surface normal at `point`.
    pub normal: Vec3,
    /// Distance travelled from the sweep start.
    pub t: f32,
}

/// The main physics world containing all bodies and managing simulation
pub struct World {
    id: WorldId,
    config: WorldConfig,
    bodies: BodySet,
    broadphase: Box<dyn Broadphase>,
    narrowphase: NarrowPhase,
    solver: IterativeSolver,
    collision_matrix: CollisionMatrix,
    force_generators: Vec<Box<dyn ForceGenerator>>,
    step_listeners: ListenerList<dyn StepListener>,
    contact_listeners: ListenerList<dyn ContactListener>,
    constraint_listeners: ListenerList<dyn ConstraintListener>,
    next_listener: u64,
    ticks: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    /// Creates a world from its three pipeline stages.
    pub fn new(broadphase: Box<dyn Broadphase>, narrowphase: NarrowPhase, solver: IterativeSolver) -> Self {
        Self {
            id: WorldId::next(),
            config: WorldConfig::default(),
            bodies: BodySet::with_key(),
            broadphase,
            narrowphase,
            solver,
            collision_matrix: CollisionMatrix::new(),
            force_generators: Vec::new(),
            step_listeners: ListenerList::default(),
            contact_listeners: ListenerList::default(),
            constraint_listeners: ListenerList::default(),
            next_listener: 0,
            ticks: 0,
        }
    }

    /// Creates a world with the default pipeline and the given configuration
    pub fn with_config(config: WorldConfig) -> Self {
        let mut world = Self::new(
            Box::<PooledBroadphase>::default(),
            NarrowPhase::default(),
            IterativeSolver::default(),
        );
        world.config = config;
        world
    }

    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Sets the gravity
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    /// Gets the gravity
    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    /// Takes ownership of `body` and returns its handle.
    ///
    /// Fails if the body already belongs to a world, which happens when a
    /// body read out of a world is added again.
    pub fn add_rigid_body(&mut self, mut body: RigidBody) -> Result<BodyHandle> {
        if body.is_in_world() {
            return Err(PhysicsError::BodyAlreadyInWorld);
        }
        body.world = Some(self.id);
        body.update_derived();
        body.take_broadphase_dirty();

        let handle = self.bodies.insert_with_key(|handle| {
            body.handle = handle;
            body
        });
        self.broadphase.add_body(handle, &self.bodies[handle]);
        debug!(?handle, "body added");
        Ok(handle)
    }

    /// Removes a body together with its contact manifolds and user constraints.
    ///
    /// Listeners hear the resulting exit events before this returns.
    pub fn remove_rigid_body(&mut self, handle: BodyHandle) -> Result<RigidBody> {
        let mut body = self.bodies.remove(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        self.broadphase.remove_body(handle);
        self.narrowphase.remove_body(handle);
        let constraints = self.solver.remove_body(handle);
        debug!(?handle, constraints = constraints.len(), "body removed");

        self.dispatch_contact_events();
        body.world = None;
        body.handle = BodyHandle::null();
        Ok(body)
    }

    /// Gets a reference to a body
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Gets a mutable reference to a body
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter()
    }

    /// Returns the number of bodies in the world
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contact_manifolds(&self) -> &ContactManifoldList {
        self.narrowphase.manifolds()
    }

    pub fn broadphase(&self) -> &dyn Broadphase {
        self.broadphase.as_ref()
    }

    pub fn narrowphase(&self) -> &NarrowPhase {
        &self.narrowphase
    }

    pub fn narrowphase_mut(&mut self) -> &mut NarrowPhase {
        &mut self.narrowphase
    }

    pub fn solver(&self) -> &IterativeSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut IterativeSolver {
        &mut self.solver
    }

    /// Sub-steps run since the world was created.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn collision_matrix(&self) -> &CollisionMatrix {
        &self.collision_matrix
    }

    pub fn collision_matrix_mut(&mut self) -> &mut CollisionMatrix {
        &mut self.collision_matrix
    }

    /// Builds a user constraint against the current body poses.
    pub fn add_constraint(&mut self, desc: &impl JointDesc) -> Result<ConstraintHandle> {
        let constraint = desc.build(&self.bodies)?;
        let handle = self.solver.add_constraint(constraint);
        debug!(?handle, "constraint added");
        Ok(handle)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Result<Constraint> {
        let constraint = self
            .solver
            .remove_constraint(handle)
            .ok_or(PhysicsError::UnknownConstraint(handle))?;
        debug!(?handle, "constraint removed");
        Ok(constraint)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.solver.constraint(handle)
    }

    pub fn add_force_generator(&mut self, generator: impl ForceGenerator + 'static) {
        self.force_generators.push(Box::new(generator));
    }

    pub fn clear_force_generators(&mut self) {
        self.force_generators.clear();
    }

    pub fn add_step_listener(&mut self, listener: impl StepListener + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.step_listeners.push(id, Box::new(listener));
        id
    }

    pub fn add_contact_listener(&mut self, listener: impl ContactListener + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.contact_listeners.push(id, Box::new(listener));
        id
    }

    pub fn add_constraint_listener(&mut self, listener: impl ConstraintListener + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.constraint_listeners.push(id, Box::new(listener));
        id
    }

    /// Removes a listener of any kind. Returns `false` for an unknown id.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.step_listeners.remove(id).is_some()
            || self.contact_listeners.remove(id).is_some()
            || self.constraint_listeners.remove(id).is_some()
    }

    fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    /// Advances the simulation by `dt`, in sub-steps of at most `max_step`
    /// (a single step when `None`).
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn step(&mut self, dt: f32, max_step: Option<f32>) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            warn!(dt, "rejected time step");
            return Err(PhysicsError::InvalidTimeStep(dt));
        }
        let max_step = max_step.unwrap_or(dt);
        if !max_step.is_finite() || max_step <= 0.0 {
            warn!(max_step, "rejected maximum sub-step");
            return Err(PhysicsError::InvalidTimeStep(max_step));
        }

        let mut remaining = dt;
        let mut substeps = 0usize;
        // Leftovers below this are rounding noise, not a sub-step
        let negligible = dt * 1e-6;
        while remaining > negligible {
            let sub_dt = remaining.min(max_step);
            self.substep(sub_dt);
            remaining -= sub_dt;
            substeps += 1;
        }
        debug!(substeps, "step finished");
        Ok(())
    }

    fn substep(&mut self, dt: f32) {
        self.ticks += 1;
        let tick = self.ticks;
        for listener in self.step_listeners.iter_mut() {
            listener.step_start(tick, dt);
        }

        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            apply_gravity(body, gravity);
        }
        for generator in &mut self.force_generators {
            generator.apply(&mut self.bodies, dt);
        }

        for (handle, body) in self.bodies.iter_mut() {
            body.update_derived();
            if body.take_broadphase_dirty() {
                self.broadphase.update_body(handle, body);
            }
        }

        self.broadphase.update(&self.bodies, &self.collision_matrix);
        self.narrowphase.update_contact_manifolds(&self.bodies);
        self.narrowphase
            .generate_contacts(&self.bodies, self.broadphase.collision_pairs());
        trace!(
            pairs = self.broadphase.collision_pairs().len(),
            manifolds = self.narrowphase.manifolds().len(),
            points = self.narrowphase.manifolds().point_count(),
            "collision pass"
        );

        let broken = self
            .solver
            .run(&mut self.bodies, self.narrowphase.manifolds_mut(), dt);

        for body in self.bodies.values_mut() {
            integrate(body, dt);
        }

        self.dispatch_contact_events();
        for (handle, impulse) in broken {
            for listener in self.constraint_listeners.iter_mut() {
                listener.constraint_broken(handle, impulse);
            }
        }

        for listener in self.step_listeners.iter_mut() {
            listener.step_end(tick, dt);
        }
    }

    fn dispatch_contact_events(&mut self) {
        let events = self.narrowphase.drain_events();
        if self.contact_listeners.is_empty() {
            return;
        }
        for event in &events {
            for listener in self.contact_listeners.iter_mut() {
                listener.dispatch(event);
            }
        }
    }

    /// Bodies crossed by the segment `start -> end`, nearest first.
    ///
    /// Only bodies whose layer is in `layer_mask` are considered. A `limit`
    /// of zero returns every hit.
    pub fn ray_intersect(&self, start: Vec3, end: Vec3, limit: usize, layer_mask: u32) -> Vec<RayIntersection> {
        let mut hits: Vec<RayIntersection> = self
            .broadphase
            .ray_intersect(start, end, &self.bodies)
            .into_iter()
            .filter_map(|handle| {
                let body = self.bodies.get(handle)?;
                if !layer_matches(body.layer(), layer_mask) {
                    return None;
                }
                let inverse = body.transform_inverse();
                let local = body
                    .shape()
                    .ray_intersect(inverse.transform_point(start), inverse.transform_point(end))?;
                Some(RayIntersection {
                    body: Some(handle),
                    point: body.transform().transform_point(local.point),
                    normal: body.transform().transform_vector(local.normal),
                    t: local.t,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        if limit > 0 {
            hits.truncate(limit);
        }
        hits
    }

    /// Sweeps a convex `shape` held at `rotation` from `start` to `end` and
    /// reports the bodies it would touch, nearest first.
    ///
    /// Compound targets are tested per child and meshes per triangle.
    pub fn shape_intersect(
        &self,
        shape: &Shape,
        rotation: Quat,
        start: Vec3,
        end: Vec3,
        limit: usize,
        layer_mask: u32,
    ) -> Result<Vec<ShapeIntersection>> {
        if !shape.is_convex() {
            return Err(PhysicsError::NonConvexSweep(shape.shape_type()));
        }
        let local = shape.local_aabb();
        let swept = local
            .transform(&Transform::new(start, rotation))
            .union(local.transform(&Transform::new(end, rotation)));
        let length = (end - start).length();

        let mut hits = Vec::new();
        for handle in self.broadphase.intersects_with(swept, &self.bodies) {
            let Some(body) = self.bodies.get(handle) else {
                continue;
            };
            if !layer_matches(body.layer(), layer_mask) {
                continue;
            }

            let mut nearest: Option<ShapeIntersection> = None;
            for_each_convex_piece(body.shape(), *body.transform(), swept, &mut |piece, transform| {
                let target = ConvexSupport::new(piece, transform);
                let Some((fraction, point, normal)) = time_of_impact(shape, rotation, start, end, &target) else {
                    return;
                };
                let t = fraction * length;
                if nearest.map_or(true, |hit| t < hit.t) {
                    nearest = Some(ShapeIntersection {
                        body: handle,
                        point,
                        normal,
                        t,
                    });
                }
            });
            hits.extend(nearest);
        }

        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        if limit > 0 {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

/// Visits the convex pieces of `shape` placed at `transform` whose bounds
/// overlap the world space box `bounds`.
fn for_each_convex_piece(shape: &Shape, transform: Transform, bounds: Aabb, visit: &mut dyn FnMut(&Shape, Transform)) {
    match shape {
        Shape::Compound(compound) => {
            for child in compound.children() {
                let child_transform = transform.mul_transform(child.transform());
                for_each_convex_piece(&child.shape, child_transform, bounds, visit);
            }
        }
        Shape::Mesh(mesh) => {
            let local_bounds = bounds.transform(&transform.inverse());
            mesh.tree().query(local_bounds, |_, index| {
                if let Some(triangle) = mesh.triangle(index) {
                    visit(triangle, transform);
                }
            });
        }
        convex => {
            if convex.local_aabb().transform(&transform).intersects(bounds) {
                visit(convex, transform);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::collision::{BasicBroadphase, BvhBroadphase, PairKey, ALL_LAYERS};
    use crate::constraints::PointConstraint;
    use crate::events::{ContactEvent, ContactEventKind};
    use crate::geometry::MeshShape;
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    fn ball(radius: f32, position: Vec3) -> RigidBody {
        RigidBody::new(Arc::new(Shape::sphere(radius)), 1.0).with_position(position)
    }

    fn cube(half: f32, position: Vec3) -> RigidBody {
        RigidBody::new(Arc::new(Shape::cuboid(Vec3::splat(half))), 1.0).with_position(position)
    }

    fn ground() -> RigidBody {
        RigidBody::fixed(Arc::new(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0))))
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<ContactEvent>>>);

    impl ContactListener for Recorder {
        fn collision_enter(&mut self, event: &ContactEvent) {
            self.0.borrow_mut().push(*event);
        }

        fn collision_exit(&mut self, event: &ContactEvent) {
            self.0.borrow_mut().push(*event);
        }

        fn trigger_enter(&mut self, event: &ContactEvent) {
            self.0.borrow_mut().push(*event);
        }

        fn trigger_exit(&mut self, event: &ContactEvent) {
            self.0.borrow_mut().push(*event);
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<ContactEventKind> {
            self.0.borrow().iter().map(|e| e.kind).collect()
        }
    }

    #[test]
    fn unit_spheres_overlap_by_half() {
        let mut world = World::default();
        world.set_gravity(Vec3::ZERO);
        let a = world.add_rigid_body(ball(1.0, Vec3::ZERO)).unwrap();
        let b = world.add_rigid_body(ball(1.0, Vec3::new(1.5, 0.0, 0.0))).unwrap();

        let contacts = world.narrowphase().collide(world.body(a).unwrap(), world.body(b).unwrap());
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].penetration_depth, 0.5, epsilon = 1e-5);
        assert!(contacts[0].normal.abs_diff_eq(Vec3::X, 1e-5));

        world.body_mut(b).unwrap().set_transform(Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY);
        let contacts = world.narrowphase().collide(world.body(a).unwrap(), world.body(b).unwrap());
        assert!(contacts.is_empty());
    }

    #[test]
    fn ball_comes_to_rest_on_ground() {
        let mut world = World::default();
        world.add_rigid_body(ground()).unwrap();
        let ball = world.add_rigid_body(ball(0.5, Vec3::new(0.0, 3.0, 0.0))).unwrap();

        for _ in 0..300 {
            world.step(DT, None).unwrap();
        }
        let body = world.body(ball).unwrap();
        assert!(body.position.y > 0.9 && body.position.y < 1.1, "y = {}", body.position.y);
        assert!(body.linear_velocity.length() < 0.1);
        assert_eq!(world.ticks(), 300);
    }

    #[test]
    fn resting_box_keeps_its_manifold() {
        let mut world = World::default();
        let floor = world.add_rigid_body(ground()).unwrap();
        let crate_box = world.add_rigid_body(cube(0.5, Vec3::new(0.0, 0.99, 0.0))).unwrap();

        for _ in 0..120 {
            world.step(DT, None).unwrap();
        }
        let key = PairKey::new(floor, crate_box);
        let mut counts = Vec::new();
        for _ in 0..30 {
            world.step(DT, None).unwrap();
            counts.push(world.contact_manifolds().get(key).map_or(0, |m| m.len()));
        }
        assert!(counts.iter().all(|&n| n == 4), "point counts {counts:?}");
        let body = world.body(crate_box).unwrap();
        assert!(body.linear_velocity.length() < 0.05);
    }

    #[test]
    fn stacked_boxes_converge_with_warm_starting() {
        let mut world = World::default();
        world.add_rigid_body(ground()).unwrap();
        let low = world.add_rigid_body(cube(0.5, Vec3::new(0.0, 0.99, 0.0))).unwrap();
        let high = world.add_rigid_body(cube(0.5, Vec3::new(0.0, 1.98, 0.0))).unwrap();

        for _ in 0..180 {
            world.step(DT, None).unwrap();
        }
        let config = *world.solver().config();
        // Once settled, no velocity pass undoes the progress of the one before.
        let slack = config.exit_threshold * 0.5;
        for _ in 0..60 {
            world.step(DT, None).unwrap();
            let stats = world.solver().stats();
            assert!(stats.iterations <= config.max_iterations);
            assert!(stats.final_delta().unwrap() <= config.exit_threshold, "deltas {:?}", stats.max_deltas);
            for pass in stats.max_deltas.windows(2) {
                assert!(pass[1] <= pass[0] + slack, "deltas {:?}", stats.max_deltas);
            }
        }

        let (low, high) = (world.body(low).unwrap(), world.body(high).unwrap());
        assert!(low.position.y > 0.85 && low.position.y < 1.1, "low y = {}", low.position.y);
        assert!(high.position.y > 1.85 && high.position.y < 2.1, "high y = {}", high.position.y);
    }

    #[test]
    fn parallel_capsules_touch_at_two_points() {
        let mut world = World::default();
        world.set_gravity(Vec3::ZERO);
        let lying = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let capsule = Arc::new(Shape::capsule(0.5, 1.0));
        let a = world
            .add_rigid_body(RigidBody::new(capsule.clone(), 1.0).with_rotation(lying))
            .unwrap();
        let b = world
            .add_rigid_body(
                RigidBody::new(capsule, 1.0)
                    .with_rotation(lying)
                    .with_position(Vec3::new(0.0, 0.9, 0.0)),
            )
            .unwrap();

        world.step(DT, None).unwrap();
        let manifold = world.contact_manifolds().get(PairKey::new(a, b)).unwrap();
        assert_eq!(manifold.len(), 2);
    }

    fn settle(world: &mut World, body: RigidBody) -> (BodyHandle, Vec3) {
        world.add_rigid_body(ground()).unwrap();
        let start = body.position;
        let handle = world.add_rigid_body(body).unwrap();
        for _ in 0..300 {
            world.step(DT, None).unwrap();
        }
        (handle, start)
    }

    #[test]
    fn resting_capsule_does_not_roll() {
        let mut world = World::default();
        let capsule = RigidBody::new(Arc::new(Shape::capsule(0.5, 1.0)), 1.0)
            .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
            .with_position(Vec3::new(0.0, 0.99, 0.0));
        let (handle, start) = settle(&mut world, capsule);

        let body = world.body(handle).unwrap();
        let slide = (body.position - start) * Vec3::new(1.0, 0.0, 1.0);
        assert!(slide.length() < 0.02, "moved {slide}");
        assert!(body.angular_velocity.length() < 0.02, "spinning at {}", body.angular_velocity);
        assert!(body.position.y > 0.95 && body.position.y < 1.02, "y = {}", body.position.y);
    }

    #[test]
    fn resting_cone_stays_upright() {
        let mut world = World::default();
        let cone = RigidBody::new(Arc::new(Shape::cone(0.5, 0.5)), 1.0).with_position(Vec3::new(0.0, 0.99, 0.0));
        let (handle, start) = settle(&mut world, cone);

        let body = world.body(handle).unwrap();
        let slide = (body.position - start) * Vec3::new(1.0, 0.0, 1.0);
        assert!(slide.length() < 0.02, "moved {slide}");
        assert!(body.angular_velocity.length() < 0.02, "spinning at {}", body.angular_velocity);
        assert!((body.rotation * Vec3::Y).y > 0.999);
    }

    #[test]
    fn rays_are_sorted_and_limited() {
        let mut world = World::default();
        let far = world.add_rigid_body(ball(0.5, Vec3::new(6.0, 0.0, 0.0))).unwrap();
        let near = world.add_rigid_body(ball(0.5, Vec3::new(2.0, 0.0, 0.0))).unwrap();
        let middle = world.add_rigid_body(cube(0.5, Vec3::new(4.0, 0.0, 0.0))).unwrap();
        world.add_rigid_body(ball(0.5, Vec3::new(4.0, 5.0, 0.0))).unwrap();

        let hits = world.ray_intersect(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 0, ALL_LAYERS);
        let order: Vec<_> = hits.iter().map(|h| h.body.unwrap()).collect();
        assert_eq!(order, vec![near, middle, far]);
        assert!(hits.windows(2).all(|w| w[0].t <= w[1].t));
        assert_relative_eq!(hits[0].t, 1.5, epsilon = 1e-4);
        assert!(hits[1].normal.abs_diff_eq(Vec3::NEG_X, 1e-5));

        let limited = world.ray_intersect(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 2, ALL_LAYERS);
        assert_eq!(limited.len(), 2);

        world.body_mut(middle).unwrap().set_layer(3);
        let masked = world.ray_intersect(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 0, !(1 << 3));
        assert_eq!(masked.len(), 2);
    }

    #[test]
    fn sweeps_hit_convex_compound_and_mesh_targets() {
        let mut world = World::default();
        let wall = world.add_rigid_body(cube(1.0, Vec3::new(5.0, 0.0, 0.0))).unwrap();
        let vertices = vec![
            Vec3::new(-2.0, -2.0, 0.0),
            Vec3::new(2.0, -2.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(-2.0, 2.0, 0.0),
        ];
        let mesh = Shape::Mesh(MeshShape::new(vertices, vec![[0, 1, 2], [0, 2, 3]]).unwrap());
        let sheet = world
            .add_rigid_body(RigidBody::fixed(Arc::new(mesh)).with_position(Vec3::new(0.0, 0.0, 4.0)))
            .unwrap();

        let sweeper = Shape::sphere(0.5);
        let hits = world
            .shape_intersect(&sweeper, Quat::IDENTITY, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 0, ALL_LAYERS)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, wall);
        assert_relative_eq!(hits[0].t, 3.5, epsilon = 1e-3);

        let hits = world
            .shape_intersect(&sweeper, Quat::IDENTITY, Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0), 0, ALL_LAYERS)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, sheet);
        assert_relative_eq!(hits[0].t, 3.5, epsilon = 1e-3);

        let compound = Shape::Compound(crate::geometry::CompoundShape::new());
        assert_eq!(
            world
                .shape_intersect(&compound, Quat::IDENTITY, Vec3::ZERO, Vec3::X, 0, ALL_LAYERS)
                .unwrap_err(),
            PhysicsError::NonConvexSweep(crate::geometry::ShapeType::Compound)
        );
    }

    #[test]
    fn removal_purges_manifolds_and_constraints() {
        let mut world = World::default();
        world.add_rigid_body(ground()).unwrap();
        let low = world.add_rigid_body(cube(0.5, Vec3::new(0.0, 0.99, 0.0))).unwrap();
        let high = world.add_rigid_body(cube(0.5, Vec3::new(0.0, 1.98, 0.0))).unwrap();
        let other = world.add_rigid_body(cube(0.5, Vec3::new(3.0, 0.99, 0.0))).unwrap();
        let joint = world
            .add_constraint(&PointConstraint::new(low, Some(high), Vec3::new(0.0, 1.485, 0.0)))
            .unwrap();
        let recorder = Recorder::default();
        world.add_contact_listener(recorder.clone());

        for _ in 0..30 {
            world.step(DT, None).unwrap();
        }
        assert_eq!(world.contact_manifolds().len(), 3);
        assert_eq!(world.solver().constraint_count(), 1);
        let resting_on = world.contact_manifolds().get(PairKey::new(low, high)).map_or(0, |m| m.len());
        assert!(resting_on > 0, "the upper cube rests on the lower one");

        let removed = world.remove_rigid_body(low).unwrap();
        assert!(!removed.is_in_world());
        assert_eq!(world.contact_manifolds().len(), 1);
        assert!(world.contact_manifolds().iter().all(|m| m.key().contains(other) && !m.key().contains(low)));
        assert!(world.constraint(joint).is_none());
        assert_eq!(world.solver().constraint_count(), 0);
        assert!(world.solver().constraints().all(|(_, c)| !c.involves(low)));
        let kinds = recorder.kinds();
        assert_eq!(kinds[kinds.len() - 2..], [ContactEventKind::CollisionExit, ContactEventKind::CollisionExit]);
        assert_eq!(world.remove_rigid_body(low).unwrap_err(), PhysicsError::UnknownBody(low));

        // Nothing is left pushing on the cube that rested on the removed one:
        // its next step is free fall.
        let before = world.body(high).unwrap().linear_velocity;
        world.step(DT, None).unwrap();
        let high = world.body(high).unwrap();
        let change = high.linear_velocity - before;
        assert_relative_eq!(change.y, world.gravity().y * DT, epsilon = 1e-5);
        assert_relative_eq!(change.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(change.z, 0.0, epsilon = 1e-6);
        assert!(world.contact_manifolds().iter().all(|m| !m.key().contains(high.handle())));
    }

    #[test]
    fn readding_a_body_is_rejected() {
        let mut world = World::default();
        let handle = world.add_rigid_body(ball(0.5, Vec3::ZERO)).unwrap();
        let copy = world.body(handle).unwrap().clone();
        assert_eq!(world.add_rigid_body(copy).unwrap_err(), PhysicsError::BodyAlreadyInWorld);
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn invalid_steps_are_rejected() {
        let mut world = World::default();
        assert_eq!(world.step(0.0, None).unwrap_err(), PhysicsError::InvalidTimeStep(0.0));
        assert!(world.step(f32::NAN, None).is_err());
        assert!(world.step(DT, Some(-1.0)).is_err());
        assert_eq!(world.ticks(), 0);
    }

    #[test]
    fn steps_split_into_sub_steps() {
        #[derive(Clone, Default)]
        struct Ticks(Rc<RefCell<Vec<(u64, f32)>>>);

        impl StepListener for Ticks {
            fn step_end(&mut self, tick: u64, dt: f32) {
                self.0.borrow_mut().push((tick, dt));
            }
        }

        let mut world = World::default();
        let ticks = Ticks::default();
        let id = world.add_step_listener(ticks.clone());
        world.step(0.25, Some(0.1)).unwrap();

        let seen = ticks.0.borrow().clone();
        assert_eq!(seen.iter().map(|t| t.0).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_relative_eq!(seen[2].1, 0.05, epsilon = 1e-6);

        assert!(world.remove_listener(id));
        assert!(!world.remove_listener(id));
        world.step(DT, None).unwrap();
        assert_eq!(ticks.0.borrow().len(), 3);
    }

    #[test]
    fn overloaded_joint_breaks_and_reports() {
        #[derive(Clone, Default)]
        struct Broken(Rc<RefCell<Vec<ConstraintHandle>>>);

        impl ConstraintListener for Broken {
            fn constraint_broken(&mut self, handle: ConstraintHandle, _impulse: f32) {
                self.0.borrow_mut().push(handle);
            }
        }

        let mut world = World::default();
        let weight = world.add_rigid_body(ball(0.5, Vec3::new(0.0, 5.0, 0.0))).unwrap();
        let joint = world
            .add_constraint(&PointConstraint::new(weight, None, Vec3::new(0.0, 5.0, 0.0)).with_breaking_threshold(0.01))
            .unwrap();
        let broken = Broken::default();
        world.add_constraint_listener(broken.clone());

        world.step(DT, None).unwrap();
        assert_eq!(*broken.0.borrow(), vec![joint]);
        assert!(!world.constraint(joint).unwrap().is_active());

        let y = world.body(weight).unwrap().position.y;
        for _ in 0..10 {
            world.step(DT, None).unwrap();
        }
        assert!(world.body(weight).unwrap().position.y < y);
        assert_eq!(broken.0.borrow().len(), 1);
    }

    #[test]
    fn triggers_report_enter_and_exit() {
        let mut world = World::default();
        world.set_gravity(Vec3::ZERO);
        world
            .add_rigid_body(RigidBody::fixed(Arc::new(Shape::cuboid(Vec3::splat(1.0)))).with_trigger(true))
            .unwrap();
        let visitor = world
            .add_rigid_body(ball(0.25, Vec3::new(-3.0, 0.0, 0.0)).with_linear_velocity(Vec3::new(6.0, 0.0, 0.0)))
            .unwrap();
        let recorder = Recorder::default();
        world.add_contact_listener(recorder.clone());

        for _ in 0..90 {
            world.step(DT, None).unwrap();
        }
        assert_eq!(
            recorder.kinds(),
            vec![ContactEventKind::TriggerEnter, ContactEventKind::TriggerExit]
        );
        assert!(world.contact_manifolds().is_empty());
        assert!(world.body(visitor).unwrap().position.x > 3.0);
    }

    #[test]
    fn body_turned_trigger_becomes_a_ghost() {
        let mut world = World::default();
        world.add_rigid_body(ground()).unwrap();
        let ghost = world.add_rigid_body(ball(0.5, Vec3::new(0.0, 0.99, 0.0))).unwrap();
        for _ in 0..30 {
            world.step(DT, None).unwrap();
        }
        assert_eq!(world.contact_manifolds().len(), 1);

        let recorder = Recorder::default();
        world.add_contact_listener(recorder.clone());
        world.body_mut(ghost).unwrap().set_trigger(true);
        for _ in 0..30 {
            world.step(DT, None).unwrap();
        }
        // Overlap events only: the ground no longer holds the ball up.
        assert!(world.contact_manifolds().is_empty());
        assert!(recorder.kinds().contains(&ContactEventKind::TriggerEnter));
        assert!(world.body(ghost).unwrap().position.y < 0.5);
    }

    #[test]
    fn every_broadphase_drives_the_same_scene() {
        let broadphases: Vec<Box<dyn Broadphase>> = vec![
            Box::<BasicBroadphase>::default(),
            Box::<PooledBroadphase>::default(),
            Box::<BvhBroadphase>::default(),
        ];
        for broadphase in broadphases {
            let mut world = World::new(broadphase, NarrowPhase::default(), IterativeSolver::default());
            world.add_rigid_body(ground()).unwrap();
            let ball = world.add_rigid_body(ball(0.5, Vec3::new(0.0, 2.0, 0.0))).unwrap();
            for _ in 0..120 {
                world.step(DT, None).unwrap();
            }
            let y = world.body(ball).unwrap().position.y;
            assert!(y > 0.9 && y < 1.1, "y = {y}");
        }
    }
}
