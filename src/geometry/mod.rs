mod aabb;
mod bvh;
mod compound;
mod mesh;
mod ray;
mod shape;

pub use aabb::Aabb;
pub use bvh::{AabbTree, NodeId};
pub use compound::{CompoundChild, CompoundShape};
pub use mesh::MeshShape;
pub use ray::RayIntersection;
pub use shape::{AxisList, BoxShape, Capsule, Cone, Shape, ShapeType, Sphere, Triangle};
