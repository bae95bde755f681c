pub mod broad_phase;
pub mod contact;
pub mod filter;
pub mod manifold;
pub mod narrow_phase;

pub use broad_phase::{BasicBroadphase, BodyPair, Broadphase, BvhBroadphase, PooledBroadphase};
pub use contact::{combine_friction, combine_restitution, ContactDetails, PairKey};
pub use filter::{can_bodies_collide, layer_matches, CollisionMatrix, ALL_LAYERS, LAYER_COUNT};
pub use manifold::{ContactManifold, ContactManifoldList, MAX_CONTACT_POINTS};
pub use narrow_phase::{ContactRoutine, NarrowPhase, NarrowPhaseConfig, RoutineTable};
