mod collidable;
mod force;
mod integrator;
mod rigid_body;

use slotmap::SlotMap;

pub use collidable::{Collidable, RigidBodyProxy, ShapePath};
pub use force::{ForceGenerator, SpringAnchor, SpringForce};
pub use integrator::{apply_gravity, integrate};
pub use rigid_body::{BodyHandle, BodyType, RigidBody};

/// Arena holding every body of a world.
pub type BodySet = SlotMap<BodyHandle, RigidBody>;
