use std::sync::Arc;

use crate::math::{Mat3, Quat, Transform, Vec3};

use super::aabb::Aabb;
use super::ray::RayIntersection;
use super::shape::Shape;

/// Normals closer than this (by `1 - |dot|`) count as the same SAT axis.
const AXIS_DEDUP_TOLERANCE: f32 = 1e-4;

/// One rigidly attached part of a [`CompoundShape`].
#[derive(Debug, Clone)]
pub struct CompoundChild {
    pub shape: Arc<Shape>,
    /// Placement as given by the caller, relative to the compound's construction frame.
    pub position: Vec3,
    pub rotation: Quat,
    /// Placement relative to the compound's center of mass.
    transform: Transform,
    aabb: Aabb,
}

impl CompoundChild {
    /// Offset from the compound origin (its center of mass) to this child.
    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Child bounds in the compound's frame.
    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }
}

/// A shape built from child shapes at fixed local offsets.
///
/// The compound keeps its origin at the center of mass: each time children
/// change, child placements are re-expressed relative to the new center and
/// the shift is reported by [`CompoundShape::center_of_mass`].
#[derive(Debug, Clone, Default)]
pub struct CompoundShape {
    children: Vec<CompoundChild>,
    center_of_mass: Vec3,
    center_of_mass_override: Option<Vec3>,
    aabb: Aabb,
    face_normals: Vec<Vec3>,
}

impl CompoundShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CompoundShape::add_child`].
    pub fn with_child(mut self, shape: Arc<Shape>, position: Vec3, rotation: Quat) -> Self {
        self.add_child(shape, position, rotation);
        self
    }

    pub fn add_child(&mut self, shape: Arc<Shape>, position: Vec3, rotation: Quat) {
        self.children.push(CompoundChild {
            shape,
            position,
            rotation,
            transform: Transform::IDENTITY,
            aabb: Aabb::EMPTY,
        });
        self.update_derived();
    }

    /// Removes the child at `index`, returning its shape.
    pub fn remove_child(&mut self, index: usize) -> Option<Arc<Shape>> {
        if index >= self.children.len() {
            return None;
        }
        let child = self.children.remove(index);
        self.update_derived();
        Some(child.shape)
    }

    /// Pins the center of mass to `point` (construction frame) instead of the
    /// centroid of the children. `None` restores the centroid.
    pub fn set_center_of_mass(&mut self, point: Option<Vec3>) {
        self.center_of_mass_override = point;
        self.update_derived();
    }

    #[inline]
    pub fn children(&self) -> &[CompoundChild] {
        &self.children
    }

    /// Center of mass in the construction frame.
    #[inline]
    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    #[inline]
    pub fn face_normals(&self) -> &[Vec3] {
        &self.face_normals
    }

    fn update_derived(&mut self) {
        self.center_of_mass = match self.center_of_mass_override {
            Some(point) => point,
            None if self.children.is_empty() => Vec3::ZERO,
            None => {
                self.children.iter().map(|c| c.position).sum::<Vec3>() / self.children.len() as f32
            }
        };

        self.aabb = Aabb::EMPTY;
        self.face_normals.clear();
        for child in &mut self.children {
            child.transform = Transform::new(child.position - self.center_of_mass, child.rotation);
            child.aabb = child.shape.local_aabb().transform(&child.transform);
            self.aabb = self.aabb.union(child.aabb);

            for normal in child.shape.face_normals() {
                let normal = child.transform.transform_vector(normal);
                let duplicate = self
                    .face_normals
                    .iter()
                    .any(|n| 1.0 - n.dot(normal).abs() < AXIS_DEDUP_TOLERANCE);
                if !duplicate {
                    self.face_normals.push(normal);
                }
            }
        }
    }

    pub(crate) fn support(&self, direction: Vec3) -> Vec3 {
        let mut best = Vec3::ZERO;
        let mut best_dot = f32::NEG_INFINITY;
        for child in &self.children {
            let local = child.transform.inverse_transform_vector(direction);
            let point = child
                .transform
                .transform_point(child.shape.find_support_point(local));
            let d = point.dot(direction);
            if d > best_dot {
                best_dot = d;
                best = point;
            }
        }
        best
    }

    /// Children share `mass` in proportion to their volume (equally when all are
    /// flat), each tensor is rotated into the compound frame and shifted to the
    /// center of mass.
    pub(crate) fn inertia_tensor(&self, mass: f32) -> Mat3 {
        if self.children.is_empty() {
            return Mat3::ZERO;
        }
        let volumes: Vec<f32> = self.children.iter().map(|c| c.shape.volume()).collect();
        let total: f32 = volumes.iter().sum();
        let count = self.children.len() as f32;

        self.children
            .iter()
            .zip(volumes)
            .map(|(child, volume)| {
                let share = if total > 0.0 { mass * volume / total } else { mass / count };
                let rotation = child.transform.rotation_matrix();
                let local = child.shape.inertia_tensor(share);
                rotation * local * rotation.transpose()
                    + crate::math::parallel_axis(share, child.transform.position)
            })
            .fold(Mat3::ZERO, |sum, i| sum + i)
    }

    pub(crate) fn ray_intersect(&self, start: Vec3, end: Vec3) -> Option<RayIntersection> {
        let mut best: Option<RayIntersection> = None;
        for child in &self.children {
            if child.aabb.segment_intersection(start, end).is_none() {
                continue;
            }
            let local_start = child.transform.inverse_transform_point(start);
            let local_end = child.transform.inverse_transform_point(end);
            if let Some(hit) = child.shape.ray_intersect(local_start, local_end) {
                if best.map_or(true, |b| hit.t < b.t) {
                    best = Some(RayIntersection {
                        point: child.transform.transform_point(hit.point),
                        normal: child.transform.transform_vector(hit.normal),
                        ..hit
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dumbbell() -> CompoundShape {
        let ball = Arc::new(Shape::sphere(0.5));
        CompoundShape::new()
            .with_child(ball.clone(), Vec3::new(-2.0, 1.0, 0.0), Quat::IDENTITY)
            .with_child(ball, Vec3::new(2.0, 1.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn children_are_recentered_on_the_centroid() {
        let shape = dumbbell();
        assert!(shape.center_of_mass().abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-6));
        let aabb = shape.aabb();
        assert!(aabb.min.abs_diff_eq(Vec3::new(-2.5, -0.5, -0.5), 1e-6));
        assert!(aabb.max.abs_diff_eq(Vec3::new(2.5, 0.5, 0.5), 1e-6));
    }

    #[test]
    fn empty_compound_has_sentinel_bounds() {
        let mut shape = dumbbell();
        shape.remove_child(0);
        shape.remove_child(0);
        assert!(shape.aabb().is_empty());
        assert!(shape.remove_child(0).is_none());
    }

    #[test]
    fn override_moves_the_origin() {
        let mut shape = dumbbell();
        shape.set_center_of_mass(Some(Vec3::new(-2.0, 1.0, 0.0)));
        assert!(shape.children()[0].transform().position.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!(shape.children()[1]
            .transform()
            .position
            .abs_diff_eq(Vec3::new(4.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn parallel_axis_inertia() {
        let shape = dumbbell();
        let mass = 2.0;
        let i = shape.inertia_tensor(mass);
        // Each ball: 0.4 * 1 * 0.25 about its center, plus 1 * 2^2 off the x axis.
        assert_relative_eq!(i.x_axis.x, 0.2, epsilon = 1e-5);
        assert_relative_eq!(i.y_axis.y, 0.2 + 8.0, epsilon = 1e-4);
        assert_relative_eq!(i.z_axis.z, 0.2 + 8.0, epsilon = 1e-4);
    }

    #[test]
    fn face_normals_are_merged() {
        let cube = Arc::new(Shape::cuboid(Vec3::splat(0.5)));
        let shape = CompoundShape::new()
            .with_child(cube.clone(), Vec3::ZERO, Quat::IDENTITY)
            .with_child(cube.clone(), Vec3::X * 3.0, Quat::IDENTITY)
            .with_child(cube, Vec3::Z * 3.0, Quat::from_rotation_y(0.3));
        assert_eq!(shape.face_normals().len(), 5);
    }

    #[test]
    fn ray_hits_nearest_child() {
        let shape = dumbbell();
        let hit = shape
            .ray_intersect(Vec3::new(-10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(hit.t, 7.5, epsilon = 1e-5);
        assert!(hit.point.abs_diff_eq(Vec3::new(-2.5, 0.0, 0.0), 1e-5));
    }
}
