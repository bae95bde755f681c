//! # rigidity
//!
//! A 3D rigid body physics engine with persistent contact manifolds and a
//! warm-started iterative constraint solver.
//!
//! ## Features
//!
//! - **Shapes**: spheres, boxes, capsules, cones and triangles, plus compound shapes and triangle meshes
//! - **Broad Phase**: all-pairs, pooled and dynamic AABB tree strategies behind one trait
//! - **Narrow Phase**: closed-form primitive tests, SAT with face clipping, and GJK/EPA for everything else
//! - **Contact Caching**: up to four points per body pair, refreshed from body motion every step
//! - **Constraint Solver**: projected Gauss-Seidel with warm starting, over-relaxation and a separate penetration pass
//! - **Joints**: breakable point and weld constraints
//! - **Queries and Events**: ray casts, shape sweeps, collision and trigger listeners
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use rigidity::prelude::*;
//!
//! // Create a physics world
//! let mut world = World::default();
//! world.set_gravity(Vec3::new(0.0, -9.81, 0.0));
//!
//! // Create a static floor whose top face is at y = 0.5
//! let floor = RigidBody::fixed(Arc::new(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0))));
//! world.add_rigid_body(floor)?;
//!
//! // Create a dynamic ball
//! let ball = RigidBody::new(Arc::new(Shape::sphere(0.5)), 1.0).with_position(Vec3::new(0.0, 5.0, 0.0));
//! let ball = world.add_rigid_body(ball)?;
//!
//! // Simulation loop
//! let dt = 1.0 / 60.0;
//! for _ in 0..600 {
//!     world.step(dt, None)?;
//! }
//! let y = world.body(ball).map(|body| body.position.y);
//! assert!(y.is_some_and(|y| (y - 1.0).abs() < 0.1));
//! # Ok::<(), rigidity::PhysicsError>(())
//! ```

pub mod collision;
pub mod constraints;
pub mod dynamics;
mod error;
pub mod events;
pub mod geometry;
pub mod math;
pub mod solver;
mod world;

pub use error::{PhysicsError, Result};
pub use world::{ShapeIntersection, World, WorldConfig, WorldId};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::collision::{
        Broadphase, BvhBroadphase, CollisionMatrix, ContactDetails, ContactManifold, NarrowPhase, PooledBroadphase,
        ALL_LAYERS,
    };
    pub use crate::constraints::{ConstraintHandle, PointConstraint, WeldConstraint};
    pub use crate::dynamics::{BodyHandle, BodyType, RigidBody};
    pub use crate::error::PhysicsError;
    pub use crate::events::{ContactEvent, ContactEventKind, ContactListener, ListenerId, StepListener};
    pub use crate::geometry::{Aabb, CompoundShape, MeshShape, RayIntersection, Shape, ShapeType};
    pub use crate::math::{Mat3, Quat, Transform, Vec3};
    pub use crate::solver::{IterativeSolver, SolverConfig};
    pub use crate::world::{ShapeIntersection, World, WorldConfig};
}
