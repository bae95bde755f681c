use crate::dynamics::RigidBody;
use crate::math::{Mat3, Vec3};

/// One scalar constraint equation between two bodies.
///
/// The Jacobian maps the stacked velocities
/// `[linear_a, angular_a, linear_b, angular_b]` to the rate at which the
/// constraint is violated. `B` is the Jacobian premultiplied by the inverse
/// mass matrix and `D` is their product, the inverse of the row's effective mass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    pub jacobian: [f32; 12],
    pub(crate) b: [f32; 12],
    pub(crate) d: f32,
    pub lower_limit: f32,
    pub upper_limit: f32,
    /// Target value of `J * v` (a velocity).
    pub bias: f32,
    pub(crate) eta: f32,
    /// Multiplier accumulated during the current solve.
    pub multiplier: f32,
    /// Multiplier of the previous solve, used for warm starting.
    pub multiplier_cached: f32,
}

impl Default for ConstraintRow {
    fn default() -> Self {
        Self::new(f32::NEG_INFINITY, f32::INFINITY)
    }
}

impl ConstraintRow {
    pub fn new(lower_limit: f32, upper_limit: f32) -> Self {
        Self {
            jacobian: [0.0; 12],
            b: [0.0; 12],
            d: 0.0,
            lower_limit,
            upper_limit,
            bias: 0.0,
            eta: 0.0,
            multiplier: 0.0,
            multiplier_cached: 0.0,
        }
    }

    /// Clears every solver quantity while keeping the limits.
    pub fn reset(&mut self) {
        let (lower, upper) = (self.lower_limit, self.upper_limit);
        *self = Self::new(lower, upper);
    }

    pub fn set_jacobian(&mut self, linear_a: Vec3, angular_a: Vec3, linear_b: Vec3, angular_b: Vec3) {
        linear_a.write_to_slice(&mut self.jacobian[0..3]);
        angular_a.write_to_slice(&mut self.jacobian[3..6]);
        linear_b.write_to_slice(&mut self.jacobian[6..9]);
        angular_b.write_to_slice(&mut self.jacobian[9..12]);
    }

    #[inline]
    pub fn effective_mass_inverse(&self) -> f32 {
        self.d
    }

    /// `J * [a_lin, a_ang, b_lin, b_ang]`.
    #[inline]
    pub(crate) fn dot_jacobian(&self, a: (Vec3, Vec3), b: (Vec3, Vec3)) -> f32 {
        part(&self.jacobian, 0).dot(a.0)
            + part(&self.jacobian, 3).dot(a.1)
            + part(&self.jacobian, 6).dot(b.0)
            + part(&self.jacobian, 9).dot(b.1)
    }

    /// Recomputes `B` and `D` from the current body state.
    ///
    /// Bodies that are not dynamic (or absent) contribute nothing. `softness`
    /// is added to `D` as constraint compliance.
    pub(crate) fn compute_mass_terms(&mut self, a: Option<&RigidBody>, b: Option<&RigidBody>, softness: f32) {
        let (ma, ia) = inverse_masses(a);
        let (mb, ib) = inverse_masses(b);

        let b_terms = [
            part(&self.jacobian, 0) * ma,
            ia * part(&self.jacobian, 3),
            part(&self.jacobian, 6) * mb,
            ib * part(&self.jacobian, 9),
        ];
        for (i, v) in b_terms.iter().enumerate() {
            v.write_to_slice(&mut self.b[i * 3..i * 3 + 3]);
        }

        self.d = (0..4)
            .map(|i| part(&self.jacobian, i * 3).dot(part(&self.b, i * 3)))
            .sum::<f32>()
            + softness;
    }

    /// Splits `B * multiplier` into the per-body linear and angular parts.
    #[inline]
    pub(crate) fn response(&self, multiplier: f32) -> [(Vec3, Vec3); 2] {
        [
            (part(&self.b, 0) * multiplier, part(&self.b, 3) * multiplier),
            (part(&self.b, 6) * multiplier, part(&self.b, 9) * multiplier),
        ]
    }
}

#[inline]
fn part(values: &[f32; 12], offset: usize) -> Vec3 {
    Vec3::from_slice(&values[offset..offset + 3])
}

fn inverse_masses(body: Option<&RigidBody>) -> (f32, Mat3) {
    match body {
        Some(body) if body.is_dynamic() => (body.inverse_mass(), body.inverse_inertia_tensor_world()),
        _ => (0.0, Mat3::ZERO),
    }
}
