use crate::math::{Mat3, Transform, Vec3};

/// An axis-aligned bounding box.
///
/// `min <= max` componentwise for any box that holds geometry. The
/// [`Aabb::EMPTY`] sentinel (`+inf` / `-inf`) marks a box with nothing in it,
/// such as a compound shape without children; it never intersects anything and
/// is the identity for [`Aabb::union`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box holding every point; [`Aabb::EMPTY`] for no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points
            .into_iter()
            .fold(Self::EMPTY, |aabb, p| aabb.expand_to_include(p))
    }

    #[inline]
    pub fn center(self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extents(self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[inline]
    pub fn size(self) -> Vec3 {
        self.max - self.min
    }

    pub fn volume(self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Surface area, the cost metric for tree insertion.
    pub fn surface_area(self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let s = self.size();
        2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
    }

    /// True for the reset sentinel or any inverted box.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn contains_point(self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    #[inline]
    pub fn contains(self, other: Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    #[inline]
    pub fn intersects(self, other: Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    #[inline]
    pub fn union(self, other: Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    #[inline]
    pub fn expand_to_include(self, point: Vec3) -> Aabb {
        Aabb::new(self.min.min(point), self.max.max(point))
    }

    /// Grows the box by `margin` on every side.
    #[inline]
    pub fn expand(self, margin: f32) -> Aabb {
        Aabb::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    /// Box around this box after it has been moved by `transform`.
    ///
    /// Uses the absolute rotation matrix on the half extents, so the result is
    /// tight for translations and conservative under rotation.
    pub fn transform(self, transform: &Transform) -> Aabb {
        if self.is_empty() {
            return self;
        }
        let rotation = transform.rotation_matrix();
        let abs = Mat3::from_cols(
            rotation.x_axis.abs(),
            rotation.y_axis.abs(),
            rotation.z_axis.abs(),
        );
        let center = transform.transform_point(self.center());
        let half_extents = abs * self.half_extents();
        Aabb::from_center_half_extents(center, half_extents)
    }

    /// Segment versus box slab test.
    ///
    /// Returns the entry parameter in `[0, 1]` along `start -> end`, or `0` when
    /// `start` is already inside.
    pub fn segment_intersection(self, start: Vec3, end: Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let direction = end - start;
        let mut t_min = 0.0f32;
        let mut t_max = 1.0f32;

        for axis in 0..3 {
            let d = direction[axis];
            let s = start[axis];
            if d.abs() < 1e-12 {
                if s < self.min[axis] || s > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t1 = (self.min[axis] - s) * inv;
            let mut t2 = (self.max[axis] - s) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    pub fn corners(self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;

    #[test]
    fn identity_transform_keeps_bounds() {
        let aabb = Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(4.0, 5.0, 6.0));
        let moved = aabb.transform(&Transform::IDENTITY);
        assert!(moved.min.abs_diff_eq(aabb.min, 1e-6));
        assert!(moved.max.abs_diff_eq(aabb.max, 1e-6));
    }

    #[test]
    fn translation_shifts_both_corners() {
        let aabb = Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(4.0, 5.0, 6.0));
        let t = Vec3::new(10.0, -7.5, 0.25);
        let moved = aabb.transform(&Transform::from_position(t));
        assert!(moved.min.abs_diff_eq(aabb.min + t, 1e-5));
        assert!(moved.max.abs_diff_eq(aabb.max + t, 1e-5));
    }

    #[test]
    fn rotation_grows_box_conservatively() {
        let aabb = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let rotated = aabb.transform(&Transform::from_rotation(Quat::from_rotation_y(
            std::f32::consts::FRAC_PI_4,
        )));
        let diagonal = std::f32::consts::SQRT_2;
        assert!((rotated.max.x - diagonal).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_sentinel() {
        let empty = Aabb::EMPTY;
        assert!(empty.is_empty());
        assert!(!empty.intersects(Aabb::new(Vec3::splat(-1e9), Vec3::splat(1e9))));

        let unit = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        assert_eq!(empty.union(unit), unit);
        assert_eq!(Aabb::from_points(std::iter::empty()), Aabb::EMPTY);
    }

    #[test]
    fn overlap_and_containment() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5));
        let c = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(a.intersects(b));
        assert!(!a.intersects(c));
        assert!(a.union(c).contains(b));
        assert!(a.contains_point(Vec3::splat(0.25)));
        assert!(!a.contains_point(Vec3::splat(1.25)));
    }

    #[test]
    fn segment_hits_and_misses() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let t = aabb
            .segment_intersection(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(3.0, 0.5, 0.5))
            .unwrap();
        assert!((t - 0.25).abs() < 1e-6);

        assert!(aabb
            .segment_intersection(Vec3::new(-1.0, 2.0, 0.5), Vec3::new(3.0, 2.0, 0.5))
            .is_none());
        // Segment stops short of the box.
        assert!(aabb
            .segment_intersection(Vec3::new(-3.0, 0.5, 0.5), Vec3::new(-1.0, 0.5, 0.5))
            .is_none());
    }
}
