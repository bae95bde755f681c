use thiserror::Error;

use crate::constraints::ConstraintHandle;
use crate::dynamics::BodyHandle;
use crate::geometry::ShapeType;

/// Errors reported for contract violations by callers of the engine.
///
/// Numerical degeneracies (zero length normals, coincident points, degenerate
/// SAT axes) never surface here; they are resolved where they occur.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("rigid body is already attached to a world")]
    BodyAlreadyInWorld,

    #[error("no rigid body with handle {0:?} in this world")]
    UnknownBody(BodyHandle),

    #[error("no constraint with handle {0:?} in this world")]
    UnknownConstraint(ConstraintHandle),

    #[error("time step must be finite and positive, got {0}")]
    InvalidTimeStep(f32),

    #[error("mass must be positive or infinite, got {0}")]
    InvalidMass(f32),

    #[error("shape sweeps need a convex shape, got {0:?}")]
    NonConvexSweep(ShapeType),

    #[error("a mesh needs at least one triangle")]
    EmptyMesh,

    #[error("triangle {triangle} references vertex {index} but the mesh has {vertex_count} vertices")]
    InvalidTriangleIndex {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
