use std::f32::consts::PI;

use smallvec::{smallvec, SmallVec};

use crate::math::{normalize_or, Mat3, Vec3};

use super::aabb::Aabb;
use super::compound::CompoundShape;
use super::mesh::MeshShape;
use super::ray::{self, RayIntersection};

/// Discriminant of [`Shape`], used to key the narrowphase routine table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShapeType {
    Sphere,
    Box,
    Capsule,
    Cone,
    Triangle,
    Compound,
    Mesh,
}

/// Collision geometry.
///
/// Shapes are immutable once built and are shared between bodies through
/// `Arc<Shape>`. All queries are answered in the shape's local frame.
#[derive(Debug, Clone)]
pub enum Shape {
    Sphere(Sphere),
    Box(BoxShape),
    Capsule(Capsule),
    Cone(Cone),
    Triangle(Triangle),
    Compound(CompoundShape),
    Mesh(MeshShape),
}

/// Axis sets handed to SAT. Boxes and triangles fit inline.
pub type AxisList = SmallVec<[Vec3; 12]>;

impl Shape {
    #[inline]
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere(Sphere::new(radius))
    }

    #[inline]
    pub fn cuboid(half_extents: Vec3) -> Self {
        Shape::Box(BoxShape::new(half_extents))
    }

    /// Capsule along local Y; `half_height` is half the length of the inner segment.
    #[inline]
    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Shape::Capsule(Capsule::new(radius, half_height))
    }

    /// Cone along local Y with its apex at `+half_height`.
    #[inline]
    pub fn cone(radius: f32, half_height: f32) -> Self {
        Shape::Cone(Cone::new(radius, half_height))
    }

    #[inline]
    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Shape::Triangle(Triangle::new(a, b, c))
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Sphere(_) => ShapeType::Sphere,
            Shape::Box(_) => ShapeType::Box,
            Shape::Capsule(_) => ShapeType::Capsule,
            Shape::Cone(_) => ShapeType::Cone,
            Shape::Triangle(_) => ShapeType::Triangle,
            Shape::Compound(_) => ShapeType::Compound,
            Shape::Mesh(_) => ShapeType::Mesh,
        }
    }

    /// Compound and mesh shapes are handled by the mid-phase, never by convex routines.
    #[inline]
    pub fn is_convex(&self) -> bool {
        !matches!(self, Shape::Compound(_) | Shape::Mesh(_))
    }

    pub fn local_aabb(&self) -> Aabb {
        match self {
            Shape::Sphere(s) => Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(s.radius)),
            Shape::Box(b) => Aabb::from_center_half_extents(Vec3::ZERO, b.half_extents),
            Shape::Capsule(c) => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(c.radius, c.half_height + c.radius, c.radius),
            ),
            Shape::Cone(c) => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(c.radius, c.half_height, c.radius),
            ),
            Shape::Triangle(t) => Aabb::from_points(t.vertices),
            Shape::Compound(c) => c.aabb(),
            Shape::Mesh(m) => m.aabb(),
        }
    }

    /// Farthest point of the shape along `direction`, in local space.
    pub fn find_support_point(&self, direction: Vec3) -> Vec3 {
        match self {
            Shape::Sphere(s) => normalize_or(direction, Vec3::Y) * s.radius,
            Shape::Box(b) => b.half_extents.copysign(direction),
            Shape::Capsule(c) => c.support(direction),
            Shape::Cone(c) => c.support(direction),
            Shape::Triangle(t) => t.support(direction),
            Shape::Compound(c) => c.support(direction),
            Shape::Mesh(m) => m.support(direction),
        }
    }

    /// Inertia tensor about the local origin for a body of `mass`.
    pub fn inertia_tensor(&self, mass: f32) -> Mat3 {
        match self {
            Shape::Sphere(s) => Mat3::from_diagonal(Vec3::splat(0.4 * mass * s.radius * s.radius)),
            Shape::Box(b) => {
                let h2 = b.half_extents * b.half_extents;
                Mat3::from_diagonal(Vec3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0))
            }
            Shape::Capsule(c) => c.inertia_tensor(mass),
            Shape::Cone(c) => {
                let r2 = c.radius * c.radius;
                let h2 = c.half_height * c.half_height;
                let side = mass * (0.15 * r2 + 0.4 * h2);
                Mat3::from_diagonal(Vec3::new(side, 0.3 * mass * r2, side))
            }
            Shape::Triangle(_) | Shape::Mesh(_) => box_inertia(self.local_aabb(), mass),
            Shape::Compound(c) => c.inertia_tensor(mass),
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            Shape::Sphere(s) => 4.0 / 3.0 * PI * s.radius.powi(3),
            Shape::Box(b) => 8.0 * b.half_extents.x * b.half_extents.y * b.half_extents.z,
            Shape::Capsule(c) => c.cylinder_volume() + c.sphere_volume(),
            Shape::Cone(c) => PI * c.radius * c.radius * 2.0 * c.half_height / 3.0,
            Shape::Triangle(_) => 0.0,
            Shape::Compound(c) => c.children().iter().map(|child| child.shape.volume()).sum(),
            Shape::Mesh(m) => m.aabb().volume(),
        }
    }

    /// First point where the segment `start -> end` (local space) enters the shape.
    pub fn ray_intersect(&self, start: Vec3, end: Vec3) -> Option<RayIntersection> {
        match self {
            Shape::Sphere(s) => ray::ray_sphere(Vec3::ZERO, s.radius, start, end),
            Shape::Box(b) => ray::ray_box(b.half_extents, start, end),
            Shape::Capsule(c) => ray::ray_capsule(c.radius, c.half_height, start, end),
            Shape::Cone(c) => ray::ray_cone(c.radius, c.half_height, start, end),
            Shape::Triangle(t) => {
                let [a, b, c] = t.vertices;
                ray::ray_triangle(a, b, c, start, end)
            }
            Shape::Compound(c) => c.ray_intersect(start, end),
            Shape::Mesh(m) => m.ray_intersect(start, end),
        }
    }

    /// Face normals to test as separating axes. Curved shapes have none.
    pub fn face_normals(&self) -> AxisList {
        match self {
            Shape::Box(_) => smallvec![Vec3::X, Vec3::Y, Vec3::Z],
            Shape::Triangle(t) => smallvec![t.normal],
            Shape::Cone(c) => c.face_normals(),
            Shape::Compound(c) => c.face_normals().iter().copied().collect(),
            Shape::Sphere(_) | Shape::Capsule(_) | Shape::Mesh(_) => AxisList::new(),
        }
    }

    /// Edge directions whose pairwise cross products are extra SAT axes.
    pub fn edge_directions(&self) -> AxisList {
        match self {
            Shape::Box(_) => smallvec![Vec3::X, Vec3::Y, Vec3::Z],
            Shape::Triangle(t) => {
                let [a, b, c] = t.vertices;
                smallvec![
                    normalize_or(b - a, Vec3::X),
                    normalize_or(c - b, Vec3::X),
                    normalize_or(a - c, Vec3::X)
                ]
            }
            _ => AxisList::new(),
        }
    }
}

/// Inertia of a solid box filling `aabb`, about the local origin.
pub(crate) fn box_inertia(aabb: Aabb, mass: f32) -> Mat3 {
    if aabb.is_empty() {
        return Mat3::ZERO;
    }
    let h = aabb.half_extents();
    let h2 = h * h;
    let center = Mat3::from_diagonal(Vec3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0));
    center + crate::math::parallel_axis(mass, aabb.center())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub radius: f32,
}

impl Sphere {
    #[inline]
    pub const fn new(radius: f32) -> Self {
        Self { radius }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxShape {
    pub half_extents: Vec3,
}

impl BoxShape {
    #[inline]
    pub const fn new(half_extents: Vec3) -> Self {
        Self { half_extents }
    }

    pub fn vertices(&self) -> [Vec3; 8] {
        Aabb::from_center_half_extents(Vec3::ZERO, self.half_extents).corners()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub radius: f32,
    pub half_height: f32,
}

impl Capsule {
    #[inline]
    pub const fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    /// Inner segment endpoints in local space.
    #[inline]
    pub fn segment(&self) -> (Vec3, Vec3) {
        (
            Vec3::new(0.0, -self.half_height, 0.0),
            Vec3::new(0.0, self.half_height, 0.0),
        )
    }

    fn support(&self, direction: Vec3) -> Vec3 {
        let tip = if direction.y >= 0.0 {
            self.half_height
        } else {
            -self.half_height
        };
        Vec3::new(0.0, tip, 0.0) + normalize_or(direction, Vec3::Y) * self.radius
    }

    fn cylinder_volume(&self) -> f32 {
        PI * self.radius * self.radius * 2.0 * self.half_height
    }

    fn sphere_volume(&self) -> f32 {
        4.0 / 3.0 * PI * self.radius.powi(3)
    }

    fn inertia_tensor(&self, mass: f32) -> Mat3 {
        let total = self.cylinder_volume() + self.sphere_volume();
        if total <= 0.0 {
            return Mat3::ZERO;
        }
        let cylinder_mass = mass * self.cylinder_volume() / total;
        let caps_mass = mass - cylinder_mass;
        let r2 = self.radius * self.radius;
        let height = 2.0 * self.half_height;

        let axial = cylinder_mass * r2 * 0.5 + caps_mass * r2 * 0.4;
        let side = cylinder_mass * (r2 * 0.25 + height * height / 12.0)
            + caps_mass * (r2 * 0.4 + height * height * 0.25 + 0.375 * height * self.radius);
        Mat3::from_diagonal(Vec3::new(side, axial, side))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    pub radius: f32,
    pub half_height: f32,
}

impl Cone {
    /// Lateral faces sampled for SAT; the base contributes one more.
    const SIDE_SAMPLES: usize = 8;

    #[inline]
    pub const fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    fn support(&self, direction: Vec3) -> Vec3 {
        let height = 2.0 * self.half_height;
        let sin_angle = self.radius / (self.radius * self.radius + height * height).sqrt();
        let length = direction.length();
        if direction.y > length * sin_angle {
            return Vec3::new(0.0, self.half_height, 0.0);
        }
        let sigma = (direction.x * direction.x + direction.z * direction.z).sqrt();
        if sigma > f32::EPSILON {
            let scale = self.radius / sigma;
            Vec3::new(direction.x * scale, -self.half_height, direction.z * scale)
        } else {
            Vec3::new(0.0, -self.half_height, 0.0)
        }
    }

    fn face_normals(&self) -> AxisList {
        let slope = self.radius / (2.0 * self.half_height);
        let mut normals: AxisList = smallvec![Vec3::NEG_Y];
        for i in 0..Self::SIDE_SAMPLES {
            let angle = i as f32 * 2.0 * PI / Self::SIDE_SAMPLES as f32;
            normals.push(Vec3::new(angle.cos(), slope, angle.sin()).normalize());
        }
        normals
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    pub normal: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            vertices: [a, b, c],
            normal: normalize_or((b - a).cross(c - a), Vec3::Y),
        }
    }

    fn support(&self, direction: Vec3) -> Vec3 {
        let [a, b, c] = self.vertices;
        let (da, db, dc) = (a.dot(direction), b.dot(direction), c.dot(direction));
        if da >= db && da >= dc {
            a
        } else if db >= dc {
            b
        } else {
            c
        }
    }
}
