//! Math types used throughout the engine.
//!
//! Vector, matrix and quaternion arithmetic comes from `glam`; this module only
//! adds the rigid [`Transform`] and a few helpers the simulation needs.

mod transform;

pub use glam::{Mat3, Mat4, Quat, Vec3};
pub use transform::{integrate_rotation, tangent_basis, Transform};

/// Common numeric tolerances.
pub mod consts {
    /// Below this length a vector is treated as zero.
    pub const EPSILON: f32 = 1e-6;

    /// Squared form of [`EPSILON`], for `length_squared` comparisons.
    pub const EPSILON_SQUARED: f32 = EPSILON * EPSILON;
}

/// Normalizes `v`, or returns `fallback` when `v` is too short to have a direction.
#[inline]
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let length_squared = v.length_squared();
    if length_squared > consts::EPSILON_SQUARED {
        v / length_squared.sqrt()
    } else {
        fallback
    }
}

/// Parallel axis term: the extra inertia of `mass` when its center sits at `offset`
/// from the reference point.
#[inline]
pub fn parallel_axis(mass: f32, offset: Vec3) -> Mat3 {
    let d2 = offset.length_squared();
    let outer = Mat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z);
    (Mat3::IDENTITY * d2 - outer) * mass
}
