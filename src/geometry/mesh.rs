use crate::error::{PhysicsError, Result};
use crate::math::Vec3;

use super::aabb::Aabb;
use super::bvh::AabbTree;
use super::ray::RayIntersection;
use super::shape::Shape;

/// Static triangle soup with a bounding volume hierarchy over its triangles.
///
/// Each triangle is also kept as a ready built [`Shape::Triangle`] so the
/// narrowphase can present it as a standalone collidable without allocating.
#[derive(Debug, Clone)]
pub struct MeshShape {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
    triangles: Vec<Shape>,
    tree: AabbTree<u32>,
    aabb: Aabb,
}

impl MeshShape {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Result<Self> {
        if indices.is_empty() {
            return Err(PhysicsError::EmptyMesh);
        }

        let mut triangles = Vec::with_capacity(indices.len());
        let mut tree = AabbTree::new(0.0);
        for (triangle, face) in indices.iter().enumerate() {
            let mut corners = [Vec3::ZERO; 3];
            for (corner, &index) in corners.iter_mut().zip(face) {
                *corner = *vertices.get(index as usize).ok_or(
                    PhysicsError::InvalidTriangleIndex {
                        triangle,
                        index,
                        vertex_count: vertices.len(),
                    },
                )?;
            }
            let [a, b, c] = corners;
            tree.insert(triangle as u32, Aabb::from_points(corners));
            triangles.push(Shape::triangle(a, b, c));
        }

        let aabb = Aabb::from_points(vertices.iter().copied());
        Ok(Self {
            vertices,
            indices,
            triangles,
            tree,
            aabb,
        })
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Triangle `index` as a standalone shape in mesh space.
    #[inline]
    pub fn triangle(&self, index: u32) -> Option<&Shape> {
        self.triangles.get(index as usize)
    }

    #[inline]
    pub fn tree(&self) -> &AabbTree<u32> {
        &self.tree
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub(crate) fn support(&self, direction: Vec3) -> Vec3 {
        self.vertices
            .iter()
            .copied()
            .fold((Vec3::ZERO, f32::NEG_INFINITY), |(best, best_dot), v| {
                let d = v.dot(direction);
                if d > best_dot {
                    (v, d)
                } else {
                    (best, best_dot)
                }
            })
            .0
    }

    pub(crate) fn ray_intersect(&self, start: Vec3, end: Vec3) -> Option<RayIntersection> {
        let mut best: Option<RayIntersection> = None;
        self.tree.query_segment(start, end, |_, index| {
            if let Some(hit) = self
                .triangle(index)
                .and_then(|shape| shape.ray_intersect(start, end))
            {
                if best.map_or(true, |b| hit.t < b.t) {
                    best = Some(hit);
                }
            }
        });
        best
    }
}
