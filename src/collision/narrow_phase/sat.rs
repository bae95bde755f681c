use smallvec::SmallVec;

use crate::dynamics::Collidable;
use crate::math::Vec3;

use super::gjk::{ConvexSupport, SupportMap};

/// Axes closer than this (by |cos|) to an already collected axis are skipped.
const DUPLICATE_AXIS_COS: f32 = 1.0 - 1e-4;

/// Cross products shorter than this come from parallel edges and are skipped.
const MIN_AXIS_LENGTH_SQUARED: f32 = 1e-8;

/// Axis of least overlap between two convex shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatResult {
    /// Unit axis pointing from A towards B.
    pub normal: Vec3,
    /// Overlap along `normal`, always positive.
    pub depth: f32,
}

/// Candidate separating axes: world face normals of both shapes, the
/// cross products of their edge directions, and the center to center line.
fn collect_axes(a: &dyn Collidable, b: &dyn Collidable) -> SmallVec<[Vec3; 32]> {
    let (ta, tb) = (a.transform(), b.transform());
    let mut axes = SmallVec::<[Vec3; 32]>::new();
    let mut push = |axis: Vec3| {
        let length_sq = axis.length_squared();
        if length_sq < MIN_AXIS_LENGTH_SQUARED {
            return;
        }
        let axis = axis / length_sq.sqrt();
        if axes.iter().all(|existing: &Vec3| existing.dot(axis).abs() <= DUPLICATE_AXIS_COS) {
            axes.push(axis);
        }
    };

    for normal in a.shape().face_normals() {
        push(ta.transform_vector(normal));
    }
    for normal in b.shape().face_normals() {
        push(tb.transform_vector(normal));
    }

    let edges_b: SmallVec<[Vec3; 12]> = b
        .shape()
        .edge_directions()
        .into_iter()
        .map(|e| tb.transform_vector(e))
        .collect();
    for edge_a in a.shape().edge_directions() {
        let edge_a = ta.transform_vector(edge_a);
        for &edge_b in &edges_b {
            push(edge_a.cross(edge_b));
        }
    }

    push(tb.position - ta.position);
    axes
}

/// Separating axis test over the candidate axes of both shapes.
///
/// Returns `None` as soon as one axis separates the shapes (zero overlap
/// counts as separated), otherwise the axis with the smallest overlap.
pub fn perform_sat(a: &dyn Collidable, b: &dyn Collidable) -> Option<SatResult> {
    let (support_a, support_b) = (ConvexSupport::of(a), ConvexSupport::of(b));
    let mut best: Option<SatResult> = None;

    for axis in collect_axes(a, b) {
        let max_a = axis.dot(support_a.support(axis));
        let min_a = axis.dot(support_a.support(-axis));
        let max_b = axis.dot(support_b.support(axis));
        let min_b = axis.dot(support_b.support(-axis));

        let forward = max_a - min_b;
        let backward = max_b - min_a;
        let (depth, normal) = if forward < backward {
            (forward, axis)
        } else {
            (backward, -axis)
        };
        if depth <= 0.0 {
            return None;
        }
        if best.map_or(true, |current| depth < current.depth) {
            best = Some(SatResult { normal, depth });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dynamics::RigidBody;
    use crate::geometry::Shape;
    use crate::math::Quat;
    use approx::assert_relative_eq;

    fn cube(position: Vec3, rotation: Quat) -> RigidBody {
        RigidBody::new(Arc::new(Shape::cuboid(Vec3::splat(0.5))), 1.0)
            .with_position(position)
            .with_rotation(rotation)
    }

    #[test]
    fn face_overlap_picks_the_shallow_axis() {
        let a = cube(Vec3::ZERO, Quat::IDENTITY);
        let b = cube(Vec3::new(0.9, 0.2, 0.0), Quat::IDENTITY);
        let sat = perform_sat(&a, &b).unwrap();
        assert!(sat.normal.abs_diff_eq(Vec3::X, 1e-5));
        assert_relative_eq!(sat.depth, 0.1, epsilon = 1e-5);

        let flipped = perform_sat(&b, &a).unwrap();
        assert!(flipped.normal.abs_diff_eq(Vec3::NEG_X, 1e-5));
    }

    #[test]
    fn separated_on_a_diagonal_axis() {
        // Rotated 45 degrees the corner reaches 0.707, so 1.25 apart they miss.
        let a = cube(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let b = cube(Vec3::new(1.25, 0.0, 0.0), Quat::IDENTITY);
        assert!(perform_sat(&a, &b).is_none());

        let b = cube(Vec3::new(1.15, 0.0, 0.0), Quat::IDENTITY);
        let sat = perform_sat(&a, &b).unwrap();
        assert_relative_eq!(sat.depth, 0.5f32.sqrt() + 0.5 - 1.15, epsilon = 1e-4);
    }

    #[test]
    fn touching_is_not_overlapping() {
        let a = cube(Vec3::ZERO, Quat::IDENTITY);
        let b = cube(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);
        assert!(perform_sat(&a, &b).is_none());
    }
}
