use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::collision::{ContactDetails, ContactManifoldList};
use crate::constraints::{update_contact_constraints, Constraint, ConstraintHandle, ConstraintRow};
use crate::dynamics::{BodyHandle, BodySet, RigidBody};
use crate::math::{integrate_rotation, Vec3};

/// Configuration for the constraint solver
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig {
    /// Velocity passes per step
    pub max_iterations: usize,
    /// Penetration passes per step
    pub penetration_max_iterations: usize,
    /// Fraction of the penetration correction applied to positions
    pub relaxation: f32,
    /// Successive over-relaxation weight of the velocity passes
    pub sor_weight: f32,
    /// Fraction of last step's multipliers used as the starting guess
    pub warmstart_factor: f32,
    /// Velocity passes stop once the largest relative change is at or below this
    pub exit_threshold: f32,
    /// Penetration passes stop once the largest change is at or below this
    pub penetration_epsilon: f32,
    /// Rows whose effective inverse mass is below this are skipped
    pub min_response: f32,
    /// Constraint softness, divided by the mass taking part in each constraint
    pub compliance: f32,
    /// Closing speed above which restitution kicks in
    pub restitution_threshold: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            penetration_max_iterations: 5,
            relaxation: 0.9,
            sor_weight: 0.85,
            warmstart_factor: 0.95,
            exit_threshold: 0.1,
            penetration_epsilon: 1e-4,
            min_response: 1e-6,
            compliance: 0.0,
            restitution_threshold: 1.0,
        }
    }
}

/// Convergence figures of the last solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverStats {
    /// Velocity passes run.
    pub iterations: usize,
    /// Largest relative multiplier change of each velocity pass.
    pub max_deltas: Vec<f32>,
    /// Penetration passes run.
    pub penetration_iterations: usize,
}

impl SolverStats {
    /// Largest relative change of the last velocity pass.
    pub fn final_delta(&self) -> Option<f32> {
        self.max_deltas.last().copied()
    }
}

/// Warm-started projected Gauss-Seidel solver.
///
/// Contact and friction constraints live on the contact points of the
/// manifolds; user constraints are owned here. One step runs
/// [`process_contact_manifolds`](Self::process_contact_manifolds),
/// [`prepare`](Self::prepare), [`resolve_contacts`](Self::resolve_contacts),
/// [`solve`](Self::solve) and [`apply`](Self::apply) in that order, see
/// [`IterativeSolver::run`].
#[derive(Debug, Default)]
pub struct IterativeSolver {
    config: SolverConfig,
    constraints: SlotMap<ConstraintHandle, Constraint>,
    stats: SolverStats,
}

impl IterativeSolver {
    /// Creates a new solver with the given configuration
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns the solver configuration
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Sets the solver configuration
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintHandle {
        self.constraints.insert(constraint)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Option<Constraint> {
        self.constraints.remove(handle)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(handle)
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints.get_mut(handle)
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintHandle, &Constraint)> {
        self.constraints.iter()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Drops every user constraint attached to `body`.
    pub fn remove_body(&mut self, body: BodyHandle) -> Vec<ConstraintHandle> {
        let mut removed = Vec::new();
        self.constraints.retain(|handle, constraint| {
            let keep = !constraint.involves(body);
            if !keep {
                removed.push(handle);
            }
            keep
        });
        removed
    }

    /// Runs every phase of one step. Returns the user constraints that broke,
    /// with the impulse that broke them.
    pub fn run(&mut self, bodies: &mut BodySet, manifolds: &mut ContactManifoldList, dt: f32) -> Vec<(ConstraintHandle, f32)> {
        self.process_contact_manifolds(bodies, manifolds);
        self.prepare(bodies, manifolds, dt);
        self.resolve_contacts(bodies, manifolds);
        self.solve(bodies, manifolds);
        self.apply(bodies, manifolds, dt)
    }

    /// Builds the contact and friction constraints of new contact points and
    /// refreshes the Jacobians of existing ones.
    pub fn process_contact_manifolds(&mut self, bodies: &BodySet, manifolds: &mut ContactManifoldList) {
        for manifold in manifolds.iter_mut() {
            for point in manifold.points_mut() {
                if point.lightweight {
                    continue;
                }
                let (Some(a), Some(b)) = (bodies.get(point.body_a), bodies.get(point.body_b)) else {
                    continue;
                };
                update_contact_constraints(point, a, b, self.config.restitution_threshold);
            }
        }
    }

    /// Computes `B`, `D` and `eta` of every active row and clears the multipliers.
    pub fn prepare(&mut self, bodies: &BodySet, manifolds: &mut ContactManifoldList, dt: f32) {
        let compliance = self.config.compliance;
        for constraint in self.constraints.values_mut() {
            if constraint.is_active() {
                constraint.update_joint_rows(bodies, dt);
            }
            prepare_constraint(constraint, bodies, dt, compliance);
        }
        for constraint in contact_constraints(manifolds) {
            prepare_constraint(constraint, bodies, dt, compliance);
        }
    }

    /// Pushes overlapping bodies apart with pseudo-velocities.
    ///
    /// Only the normal row of each contact takes part. The correction goes
    /// straight into positions and rotations and leaves real velocities and
    /// the multipliers of the velocity solve untouched.
    pub fn resolve_contacts(&mut self, bodies: &mut BodySet, manifolds: &mut ContactManifoldList) {
        let SolverConfig {
            penetration_max_iterations,
            penetration_epsilon,
            min_response,
            relaxation,
            ..
        } = self.config;

        for body in bodies.values_mut() {
            body.push_velocity = Vec3::ZERO;
            body.turn_velocity = Vec3::ZERO;
        }

        let mut iterations = 0;
        for _ in 0..penetration_max_iterations {
            iterations += 1;
            let mut max_delta = 0.0f32;
            for manifold in manifolds.iter_mut() {
                for point in manifold.points_mut() {
                    let depth = point.penetration_depth;
                    let Some(constraint) = point.contact_constraint.as_mut().filter(|c| c.is_active()) else {
                        continue;
                    };
                    let ends = (constraint.body_a, constraint.body_b);
                    let Some(row) = constraint.rows.first_mut().filter(|row| row.d.abs() >= min_response) else {
                        continue;
                    };

                    let current = row.dot_jacobian(pseudo_velocity(bodies, ends.0), pseudo_velocity(bodies, ends.1));
                    let target = (row.multiplier + (depth - current) / row.d)
                        .max(row.lower_limit)
                        .min(row.upper_limit);
                    let delta = target - row.multiplier;
                    row.multiplier = target;

                    let [a, b] = row.response(delta);
                    add_pseudo_velocity(bodies, ends.0, a);
                    add_pseudo_velocity(bodies, ends.1, b);
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta <= penetration_epsilon {
                break;
            }
        }
        self.stats.penetration_iterations = iterations;
        trace!(iterations, "penetration pass");

        for body in bodies.values_mut() {
            let (push, turn) = (body.push_velocity, body.turn_velocity);
            if push == Vec3::ZERO && turn == Vec3::ZERO {
                continue;
            }
            body.position += push * relaxation;
            body.rotation = integrate_rotation(body.rotation, turn * relaxation, 1.0);
            body.push_velocity = Vec3::ZERO;
            body.turn_velocity = Vec3::ZERO;
            body.update_derived();
        }

        for constraint in contact_constraints(manifolds) {
            for row in constraint.rows.iter_mut() {
                row.multiplier = 0.0;
            }
        }
    }

    /// Warm starts from last step's multipliers, then iterates until the
    /// largest relative change drops to the exit threshold.
    ///
    /// Friction rows go first, then user constraints, then contact rows.
    pub fn solve(&mut self, bodies: &mut BodySet, manifolds: &mut ContactManifoldList) {
        let SolverConfig {
            max_iterations,
            sor_weight,
            warmstart_factor,
            exit_threshold,
            min_response,
            ..
        } = self.config;

        for body in bodies.values_mut() {
            body.solver_impulse = [Vec3::ZERO; 2];
        }

        for constraint in self.constraints.values_mut().chain(contact_constraints(manifolds)) {
            if constraint.is_active() {
                warm_start(constraint, bodies, warmstart_factor, min_response);
            }
        }

        self.stats.iterations = 0;
        self.stats.max_deltas.clear();
        for _ in 0..max_iterations {
            let mut max_delta = 0.0f32;

            for manifold in manifolds.iter_mut() {
                for point in manifold.points_mut() {
                    let ContactDetails {
                        contact_constraint,
                        friction_constraint,
                        friction,
                        ..
                    } = point;
                    let normal_multiplier = contact_constraint.as_ref().and_then(|c| c.rows.first()).map(|row| row.multiplier);
                    let (Some(normal_multiplier), Some(friction_rows)) = (normal_multiplier, friction_constraint.as_mut())
                    else {
                        continue;
                    };
                    if !friction_rows.is_active() {
                        continue;
                    }
                    let limit = *friction * normal_multiplier;
                    for row in friction_rows.rows.iter_mut() {
                        row.lower_limit = -limit;
                        row.upper_limit = limit;
                    }
                    max_delta = max_delta.max(relax(friction_rows, bodies, sor_weight, min_response));
                }
            }

            for constraint in self.constraints.values_mut().filter(|c| c.is_active()) {
                max_delta = max_delta.max(relax(constraint, bodies, sor_weight, min_response));
            }

            for manifold in manifolds.iter_mut() {
                for point in manifold.points_mut() {
                    if let Some(contact) = point.contact_constraint.as_mut().filter(|c| c.is_active()) {
                        max_delta = max_delta.max(relax(contact, bodies, sor_weight, min_response));
                    }
                }
            }

            self.stats.iterations += 1;
            self.stats.max_deltas.push(max_delta);
            if max_delta <= exit_threshold {
                break;
            }
        }
        trace!(
            iterations = self.stats.iterations,
            final_delta = self.stats.final_delta().unwrap_or(0.0),
            "velocity solve"
        );
    }

    /// Turns the final multipliers into velocity changes, caches them for
    /// the next warm start and breaks user constraints pushed past their threshold.
    pub fn apply(
        &mut self,
        bodies: &mut BodySet,
        manifolds: &mut ContactManifoldList,
        dt: f32,
    ) -> Vec<(ConstraintHandle, f32)> {
        for constraint in contact_constraints(manifolds) {
            if constraint.is_active() {
                apply_constraint(constraint, bodies, dt);
            }
        }

        let mut broken = Vec::new();
        for (handle, constraint) in self.constraints.iter_mut() {
            if !constraint.is_active() {
                continue;
            }
            let impulse = apply_constraint(constraint, bodies, dt);
            if constraint.breaking_threshold.is_some_and(|threshold| impulse > threshold) {
                constraint.set_active(false);
                debug!(?handle, impulse, "constraint broken");
                broken.push((handle, impulse));
            }
        }
        broken
    }
}

/// Every contact and friction constraint held by the manifolds.
fn contact_constraints(manifolds: &mut ContactManifoldList) -> impl Iterator<Item = &mut Constraint> + '_ {
    manifolds
        .iter_mut()
        .flat_map(|manifold| manifold.points_mut().iter_mut())
        .flat_map(|point| point.contact_constraint.iter_mut().chain(point.friction_constraint.iter_mut()))
}

type Ends = (Option<BodyHandle>, Option<BodyHandle>);

fn ends(constraint: &Constraint) -> Ends {
    (constraint.body_a, constraint.body_b)
}

/// Finite mass of the dynamic bodies taking part.
fn participating_mass(bodies: &BodySet, (a, b): Ends) -> f32 {
    [a, b]
        .into_iter()
        .flatten()
        .filter_map(|handle| bodies.get(handle))
        .filter(|body| body.is_dynamic())
        .map(RigidBody::mass)
        .sum()
}

/// `v / dt + M^-1 F` of a body, the velocity the rows must cancel.
fn free_motion(body: Option<&RigidBody>, dt: f32) -> (Vec3, Vec3) {
    let Some(body) = body else {
        return (Vec3::ZERO, Vec3::ZERO);
    };
    let (mut linear, mut angular) = (body.linear_velocity / dt, body.angular_velocity / dt);
    if body.is_dynamic() {
        linear += body.accumulated_force() * body.inverse_mass();
        angular += body.inverse_inertia_tensor_world() * body.accumulated_torque();
    }
    (linear, angular)
}

fn prepare_constraint(constraint: &mut Constraint, bodies: &BodySet, dt: f32, compliance: f32) {
    if !constraint.is_active() {
        return;
    }
    let ends = ends(constraint);
    let a = ends.0.and_then(|h| bodies.get(h));
    let b = ends.1.and_then(|h| bodies.get(h));
    let mass = participating_mass(bodies, ends);
    let softness = if mass > 0.0 { compliance / mass } else { 0.0 };
    let (motion_a, motion_b) = (free_motion(a, dt), free_motion(b, dt));

    for row in constraint.rows.iter_mut() {
        row.compute_mass_terms(a, b, softness);
        row.eta = row.bias / dt - row.dot_jacobian(motion_a, motion_b);
        row.multiplier = 0.0;
    }
}

fn warm_start(constraint: &mut Constraint, bodies: &mut BodySet, factor: f32, min_response: f32) {
    let ends = ends(constraint);
    for row in constraint.rows.iter_mut() {
        if row.d.abs() < min_response {
            row.multiplier = 0.0;
            continue;
        }
        row.multiplier = row.multiplier_cached * factor;
        add_rows_response(row, row.multiplier, bodies, ends);
    }
}

/// One projected Gauss-Seidel pass over the rows of `constraint`.
/// Returns the largest multiplier change divided by the participating mass.
fn relax(constraint: &mut Constraint, bodies: &mut BodySet, sor_weight: f32, min_response: f32) -> f32 {
    let ends = ends(constraint);
    let mass = participating_mass(bodies, ends);
    let mut max_delta = 0.0f32;

    for row in constraint.rows.iter_mut() {
        if row.d.abs() < min_response {
            continue;
        }
        let residual = row.eta - row.dot_jacobian(solver_impulse(bodies, ends.0), solver_impulse(bodies, ends.1));
        let target = (row.multiplier + residual / row.d * sor_weight)
            .max(row.lower_limit)
            .min(row.upper_limit);
        let delta = target - row.multiplier;
        row.multiplier = target;
        add_rows_response(row, delta, bodies, ends);

        if mass > 0.0 {
            max_delta = max_delta.max(delta.abs() / mass);
        }
    }
    max_delta
}

/// Integrates the multipliers into velocities and returns the constraint's impulse magnitude.
fn apply_constraint(constraint: &mut Constraint, bodies: &mut BodySet, dt: f32) -> f32 {
    let (a, b) = ends(constraint);
    let mut impulse_squared = 0.0;
    for row in constraint.rows.iter_mut() {
        let impulse = row.multiplier * dt;
        let [response_a, response_b] = row.response(impulse);
        add_velocity(bodies, a, response_a);
        add_velocity(bodies, b, response_b);
        row.multiplier_cached = row.multiplier;
        impulse_squared += impulse * impulse;
    }
    let impulse = impulse_squared.sqrt();
    constraint.set_last_impulse(impulse);
    impulse
}

fn add_rows_response(row: &ConstraintRow, multiplier: f32, bodies: &mut BodySet, (a, b): Ends) {
    let [response_a, response_b] = row.response(multiplier);
    add_solver_impulse(bodies, a, response_a);
    add_solver_impulse(bodies, b, response_b);
}

fn solver_impulse(bodies: &BodySet, handle: Option<BodyHandle>) -> (Vec3, Vec3) {
    handle
        .and_then(|h| bodies.get(h))
        .map_or((Vec3::ZERO, Vec3::ZERO), |body| (body.solver_impulse[0], body.solver_impulse[1]))
}

fn add_solver_impulse(bodies: &mut BodySet, handle: Option<BodyHandle>, (linear, angular): (Vec3, Vec3)) {
    if let Some(body) = handle.and_then(|h| bodies.get_mut(h)) {
        body.solver_impulse[0] += linear;
        body.solver_impulse[1] += angular;
    }
}

fn pseudo_velocity(bodies: &BodySet, handle: Option<BodyHandle>) -> (Vec3, Vec3) {
    handle
        .and_then(|h| bodies.get(h))
        .map_or((Vec3::ZERO, Vec3::ZERO), |body| (body.push_velocity, body.turn_velocity))
}

fn add_pseudo_velocity(bodies: &mut BodySet, handle: Option<BodyHandle>, (linear, angular): (Vec3, Vec3)) {
    if let Some(body) = handle.and_then(|h| bodies.get_mut(h)) {
        body.push_velocity += linear;
        body.turn_velocity += angular;
    }
}

fn add_velocity(bodies: &mut BodySet, handle: Option<BodyHandle>, (linear, angular): (Vec3, Vec3)) {
    if let Some(body) = handle.and_then(|h| bodies.get_mut(h)) {
        body.linear_velocity += linear;
        body.angular_velocity += angular;
    }
}
