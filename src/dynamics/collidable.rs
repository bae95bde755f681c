use smallvec::SmallVec;

use crate::geometry::{Aabb, Shape};
use crate::math::{Transform, Vec3};

use super::rigid_body::{BodyHandle, RigidBody};

/// Child indices leading from a body's root shape to a sub-shape.
/// Empty for the root shape itself.
pub type ShapePath = SmallVec<[u32; 4]>;

/// Something the narrowphase can collide: a whole body, or one piece of a
/// compound or mesh presented as if it were its own body.
pub trait Collidable {
    fn shape(&self) -> &Shape;

    /// World placement of [`Collidable::shape`].
    fn transform(&self) -> &Transform;

    fn aabb(&self) -> Aabb;

    /// The body contacts against this collidable are reported for.
    fn body(&self) -> &RigidBody;

    /// Maps a point from this collidable's local frame into the root body's local frame.
    fn to_body_local(&self, point: Vec3) -> Vec3;

    /// Appends the path of this collidable below its root body.
    fn append_path(&self, path: &mut ShapePath);

    fn handle(&self) -> BodyHandle {
        self.body().handle()
    }

    fn path(&self) -> ShapePath {
        let mut path = ShapePath::new();
        self.append_path(&mut path);
        path
    }
}

impl Collidable for RigidBody {
    fn shape(&self) -> &Shape {
        RigidBody::shape(self)
    }

    fn transform(&self) -> &Transform {
        RigidBody::transform(self)
    }

    fn aabb(&self) -> Aabb {
        RigidBody::aabb(self)
    }

    fn body(&self) -> &RigidBody {
        self
    }

    fn to_body_local(&self, point: Vec3) -> Vec3 {
        point
    }

    fn append_path(&self, _path: &mut ShapePath) {}
}

/// Stand-in for one child of a compound (or one mesh triangle) during a
/// single narrowphase query. It borrows its parent and never outlives it.
#[derive(Clone, Copy)]
pub struct RigidBodyProxy<'a> {
    parent: &'a dyn Collidable,
    shape: &'a Shape,
    /// Placement of `shape` in the parent's local frame.
    local: Transform,
    child_index: u32,
    transform: Transform,
    aabb: Aabb,
}

impl<'a> RigidBodyProxy<'a> {
    pub fn new(parent: &'a dyn Collidable, shape: &'a Shape, local: Transform, child_index: u32) -> Self {
        let transform = parent.transform().mul_transform(&local);
        let aabb = shape.local_aabb().transform(&transform);
        Self {
            parent,
            shape,
            local,
            child_index,
            transform,
            aabb,
        }
    }

    #[inline]
    pub fn parent(&self) -> &'a dyn Collidable {
        self.parent
    }

    #[inline]
    pub fn child_index(&self) -> u32 {
        self.child_index
    }
}

impl Collidable for RigidBodyProxy<'_> {
    fn shape(&self) -> &Shape {
        self.shape
    }

    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn aabb(&self) -> Aabb {
        self.aabb
    }

    fn body(&self) -> &RigidBody {
        self.parent.body()
    }

    fn to_body_local(&self, point: Vec3) -> Vec3 {
        self.parent.to_body_local(self.local.transform_point(point))
    }

    fn append_path(&self, path: &mut ShapePath) {
        self.parent.append_path(path);
        path.push(self.child_index);
    }
}

impl std::fmt::Debug for RigidBodyProxy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigidBodyProxy")
            .field("shape", &self.shape.shape_type())
            .field("path", &self.path())
            .field("transform", &self.transform)
            .finish()
    }
}
