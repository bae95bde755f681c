use crate::dynamics::Collidable;
use crate::geometry::Shape;
use crate::math::consts::EPSILON_SQUARED;
use crate::math::{normalize_or, Quat, Transform, Vec3};

/// Maximum iterations for GJK
const GJK_MAX_ITERATIONS: usize = 64;

/// Relative progress below which the distance is considered converged
const GJK_RELATIVE_TOLERANCE: f32 = 1e-5;

/// Anything with a convex support function in world space.
pub trait SupportMap {
    /// Farthest point along `direction` (world space).
    fn support(&self, direction: Vec3) -> Vec3;
}

/// A convex [`Shape`] placed by a transform.
#[derive(Debug, Clone, Copy)]
pub struct ConvexSupport<'a> {
    pub shape: &'a Shape,
    pub transform: Transform,
}

impl<'a> ConvexSupport<'a> {
    pub fn new(shape: &'a Shape, transform: Transform) -> Self {
        Self { shape, transform }
    }

    pub fn of(collidable: &'a dyn Collidable) -> Self {
        Self::new(collidable.shape(), *collidable.transform())
    }
}

impl SupportMap for ConvexSupport<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        let local = self.transform.inverse_transform_vector(direction);
        self.transform
            .transform_point(self.shape.find_support_point(local))
    }
}

/// A single point: lets the same queries answer point containment and distance.
impl SupportMap for Vec3 {
    fn support(&self, _direction: Vec3) -> Vec3 {
        *self
    }
}

/// A line segment, such as the inner core of a capsule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
}

impl Segment {
    #[inline]
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }
}

impl SupportMap for Segment {
    fn support(&self, direction: Vec3) -> Vec3 {
        if (self.end - self.start).dot(direction) > 0.0 {
            self.end
        } else {
            self.start
        }
    }
}

/// Point of the Minkowski difference `A - B` together with the two support
/// points that produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupportVertex {
    pub w: Vec3,
    pub a: Vec3,
    pub b: Vec3,
}

impl SupportVertex {
    pub fn compute(a: &impl SupportMap, b: &impl SupportMap, direction: Vec3) -> Self {
        let sa = a.support(direction);
        let sb = b.support(-direction);
        Self { w: sa - sb, a: sa, b: sb }
    }
}

/// Result of a GJK query
#[derive(Debug, Clone)]
pub enum GjkResult {
    /// The origin is inside (or on) the simplex; it seeds EPA.
    Intersecting(Simplex),
    /// Shapes are apart; closest points on each and their distance.
    Separated {
        closest_a: Vec3,
        closest_b: Vec3,
        distance: f32,
    },
}

impl GjkResult {
    pub fn is_intersecting(&self) -> bool {
        matches!(self, GjkResult::Intersecting(_))
    }
}

/// Up to four support vertices with the barycentric weights of the point
/// closest to the origin.
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    vertices: [SupportVertex; 4],
    weights: [f32; 4],
    len: usize,
}

impl Simplex {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn vertices(&self) -> &[SupportVertex] {
        &self.vertices[..self.len]
    }

    fn push(&mut self, vertex: SupportVertex) {
        debug_assert!(self.len < 4);
        self.vertices[self.len] = vertex;
        self.len += 1;
    }

    fn contains(&self, w: Vec3) -> bool {
        self.vertices()
            .iter()
            .any(|v| v.w.distance_squared(w) <= EPSILON_SQUARED)
    }

    /// Witness points on A and B for the current closest point.
    fn closest_points(&self) -> (Vec3, Vec3) {
        self.vertices()
            .iter()
            .zip(self.weights)
            .fold((Vec3::ZERO, Vec3::ZERO), |(pa, pb), (v, weight)| {
                (pa + v.a * weight, pb + v.b * weight)
            })
    }

    /// Replaces the simplex by the smallest sub-simplex supporting the point
    /// closest to the origin, and returns that point. A tetrahedron that
    /// contains the origin is kept whole.
    fn reduce(&mut self) -> Vec3 {
        let p: [Vec3; 4] = [
            self.vertices[0].w,
            self.vertices[1].w,
            self.vertices[2].w,
            self.vertices[3].w,
        ];
        let (point, weights) = match self.len {
            1 => (p[0], [1.0, 0.0, 0.0, 0.0]),
            2 => {
                let (point, [u, v]) = closest_on_segment(p[0], p[1]);
                (point, [u, v, 0.0, 0.0])
            }
            3 => {
                let (point, [u, v, w]) = closest_on_triangle(p[0], p[1], p[2]);
                (point, [u, v, w, 0.0])
            }
            _ => match closest_on_tetrahedron(p) {
                Some(found) => found,
                None => {
                    self.weights = [0.25; 4];
                    return Vec3::ZERO;
                }
            },
        };

        let mut kept = 0;
        for i in 0..self.len {
            if weights[i] > 0.0 {
                self.vertices[kept] = self.vertices[i];
                self.weights[kept] = weights[i];
                kept += 1;
            }
        }
        self.len = kept;
        point
    }
}

/// Runs GJK between two convex support maps.
///
/// Returns the witness points when the shapes are apart, or the final simplex
/// when the origin lies inside the Minkowski difference.
pub fn gjk(a: &impl SupportMap, b: &impl SupportMap) -> GjkResult {
    let mut simplex = Simplex::default();
    let first = SupportVertex::compute(a, b, Vec3::X);
    simplex.push(first);
    simplex.weights[0] = 1.0;
    let mut v = first.w;

    for _ in 0..GJK_MAX_ITERATIONS {
        let dist_sq = v.length_squared();
        if dist_sq <= EPSILON_SQUARED {
            return GjkResult::Intersecting(simplex);
        }

        let vertex = SupportVertex::compute(a, b, -v);

        // No further progress toward the origin
        if dist_sq - v.dot(vertex.w) <= GJK_RELATIVE_TOLERANCE * dist_sq || simplex.contains(vertex.w) {
            break;
        }

        simplex.push(vertex);
        let closest = simplex.reduce();
        if simplex.len() == 4 {
            return GjkResult::Intersecting(simplex);
        }
        if closest.length_squared() >= dist_sq {
            break;
        }
        v = closest;
    }

    let (closest_a, closest_b) = simplex.closest_points();
    GjkResult::Separated {
        closest_a,
        closest_b,
        distance: closest_a.distance(closest_b),
    }
}

/// Simple intersection test using GJK
pub fn intersects(a: &impl SupportMap, b: &impl SupportMap) -> bool {
    gjk(a, b).is_intersecting()
}

/// Distance between two convex shapes, zero when they overlap.
pub fn distance(a: &impl SupportMap, b: &impl SupportMap) -> f32 {
    match gjk(a, b) {
        GjkResult::Intersecting(_) => 0.0,
        GjkResult::Separated { distance, .. } => distance,
    }
}

fn closest_on_segment(a: Vec3, b: Vec3) -> (Vec3, [f32; 2]) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= EPSILON_SQUARED {
        return (a, [1.0, 0.0]);
    }
    let t = (-a).dot(ab) / len_sq;
    if t <= 0.0 {
        (a, [1.0, 0.0])
    } else if t >= 1.0 {
        (b, [0.0, 1.0])
    } else {
        (a + ab * t, [1.0 - t, t])
    }
}

/// Closest point on triangle ABC to the origin, with barycentric weights
fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, [f32; 3]) {
    let ab = b - a;
    let ac = c - a;
    let ao = -a;

    let d1 = ab.dot(ao);
    let d2 = ac.dot(ao);

    // Vertex region A
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, [1.0, 0.0, 0.0]);
    }

    let bo = -b;
    let d3 = ab.dot(bo);
    let d4 = ac.dot(bo);

    // Vertex region B
    if d3 >= 0.0 && d4 <= d3 {
        return (b, [0.0, 1.0, 0.0]);
    }

    // Edge region AB
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0]);
    }

    let co = -c;
    let d5 = ab.dot(co);
    let d6 = ac.dot(co);

    // Vertex region C
    if d6 >= 0.0 && d5 <= d6 {
        return (c, [0.0, 0.0, 1.0]);
    }

    // Edge region AC
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w]);
    }

    // Edge region BC
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, [0.0, 1.0 - w, w]);
    }

    let sum = va + vb + vc;
    if sum.abs() <= f32::EPSILON {
        // Collinear corners: fall back to the best edge
        return [(0, 1), (1, 2), (0, 2)]
            .into_iter()
            .map(|(i, j)| {
                let corners = [a, b, c];
                let (point, [u, v]) = closest_on_segment(corners[i], corners[j]);
                let mut weights = [0.0; 3];
                weights[i] = u;
                weights[j] = v;
                (point, weights)
            })
            .min_by(|x, y| x.0.length_squared().total_cmp(&y.0.length_squared()))
            .unwrap_or((a, [1.0, 0.0, 0.0]));
    }

    // Inside the face
    let v = vb / sum;
    let w = vc / sum;
    (a + ab * v + ac * w, [1.0 - v - w, v, w])
}

/// Closest point on a tetrahedron to the origin, `None` when the origin is inside.
fn closest_on_tetrahedron(p: [Vec3; 4]) -> Option<(Vec3, [f32; 4])> {
    const FACES: [([usize; 3], usize); 4] = [([0, 1, 2], 3), ([0, 3, 1], 2), ([0, 2, 3], 1), ([1, 3, 2], 0)];

    let volume = (p[1] - p[0]).cross(p[2] - p[0]).dot(p[3] - p[0]);
    let degenerate = volume.abs() <= f32::EPSILON;

    let mut best: Option<(Vec3, [f32; 4])> = None;
    for ([i, j, k], opposite) in FACES {
        let normal = (p[j] - p[i]).cross(p[k] - p[i]);
        let origin_side = normal.dot(-p[i]);
        let other_side = normal.dot(p[opposite] - p[i]);
        if !degenerate && origin_side * other_side >= 0.0 {
            continue;
        }

        let (point, [u, v, w]) = closest_on_triangle(p[i], p[j], p[k]);
        if best.map_or(true, |(b, _)| point.length_squared() < b.length_squared()) {
            let mut weights = [0.0; 4];
            weights[i] = u;
            weights[j] = v;
            weights[k] = w;
            best = Some((point, weights));
        }
    }
    best
}

/// Maximum advancement steps of [`time_of_impact`]
const TOI_MAX_ITERATIONS: usize = 32;

/// Gap at which [`time_of_impact`] reports contact
const TOI_TOLERANCE: f32 = 1e-4;

/// First contact of a convex `shape` swept without rotation from `start` to
/// `end` against a fixed `target`, by conservative advancement.
///
/// Returns the fraction of the sweep travelled, the contact point on the
/// target and the target's surface normal there. A shape that already
/// overlaps at `start` hits at fraction zero with a normal against the sweep.
pub fn time_of_impact(
    shape: &Shape,
    rotation: Quat,
    start: Vec3,
    end: Vec3,
    target: &impl SupportMap,
) -> Option<(f32, Vec3, Vec3)> {
    let motion = end - start;
    let mut fraction = 0.0f32;

    for _ in 0..TOI_MAX_ITERATIONS {
        let moving = ConvexSupport::new(shape, Transform::new(start + motion * fraction, rotation));
        match gjk(&moving, target) {
            GjkResult::Intersecting(_) => {
                let normal = normalize_or(-motion, Vec3::Y);
                return Some((fraction, moving.support(motion), normal));
            }
            GjkResult::Separated {
                closest_a,
                closest_b,
                distance,
            } => {
                let normal = normalize_or(closest_a - closest_b, Vec3::Y);
                if distance <= TOI_TOLERANCE {
                    return Some((fraction, closest_b, normal));
                }
                // Speed of approach along the separating direction
                let closing = -motion.dot(normal);
                if closing <= f32::EPSILON {
                    return None;
                }
                // Stop just short of touching so the witness points stay valid
                fraction += (distance - TOI_TOLERANCE * 0.5) / closing;
                if fraction > 1.0 {
                    return None;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn placed(shape: &Shape, position: Vec3) -> ConvexSupport<'_> {
        ConvexSupport::new(shape, Transform::from_position(position))
    }

    #[test]
    fn spheres_intersecting() {
        let sphere = Shape::sphere(1.0);
        assert!(intersects(&placed(&sphere, Vec3::ZERO), &placed(&sphere, Vec3::new(1.5, 0.0, 0.0))));
    }

    #[test]
    fn segment_over_a_box() {
        let cube = Shape::cuboid(Vec3::splat(0.5));
        let core = Segment::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let GjkResult::Separated { closest_b, distance, .. } = gjk(&core, &placed(&cube, Vec3::ZERO)) else {
            panic!("expected separation");
        };
        assert_relative_eq!(distance, 0.5, epsilon = 1e-4);
        assert_relative_eq!(closest_b.y, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn spheres_separated() {
        let sphere = Shape::sphere(1.0);
        let result = gjk(&placed(&sphere, Vec3::ZERO), &placed(&sphere, Vec3::new(3.0, 0.0, 0.0)));
        let GjkResult::Separated {
            closest_a,
            closest_b,
            distance,
        } = result
        else {
            panic!("expected separation");
        };
        assert_relative_eq!(distance, 1.0, epsilon = 1e-3);
        assert!(closest_a.abs_diff_eq(Vec3::X, 1e-2));
        assert!(closest_b.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-2));
    }

    #[test]
    fn box_distance_is_exact() {
        let cube = Shape::cuboid(Vec3::ONE);
        let d = distance(&placed(&cube, Vec3::ZERO), &placed(&cube, Vec3::new(3.0, 0.5, 0.0)));
        assert_relative_eq!(d, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn point_inside_and_outside() {
        let cube = Shape::cuboid(Vec3::ONE);
        let body = placed(&cube, Vec3::ZERO);
        assert!(intersects(&Vec3::new(0.5, 0.2, -0.3), &body));
        assert_relative_eq!(distance(&Vec3::new(0.0, 3.0, 0.0), &body), 2.0, epsilon = 1e-4);
    }

    #[test]
    fn rotated_boxes() {
        let bar = Shape::cuboid(Vec3::new(2.0, 0.5, 0.5));
        let a = placed(&bar, Vec3::ZERO);
        let b = ConvexSupport::new(
            &bar,
            Transform::new(Vec3::new(2.0, 0.0, 0.0), Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_4)),
        );
        assert!(intersects(&a, &b));
    }

    #[test]
    fn sweep_stops_at_first_contact() {
        let ball = Shape::sphere(0.5);
        let wall = Shape::cuboid(Vec3::splat(1.0));
        let target = placed(&wall, Vec3::new(5.0, 0.0, 0.0));

        let (fraction, point, normal) =
            time_of_impact(&ball, Quat::IDENTITY, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), &target).unwrap();
        assert_relative_eq!(fraction * 10.0, 3.5, epsilon = 1e-3);
        assert_relative_eq!(point.x, 4.0, epsilon = 1e-3);
        assert!(normal.abs_diff_eq(Vec3::NEG_X, 1e-3));

        let short = time_of_impact(&ball, Quat::IDENTITY, Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), &target);
        assert!(short.is_none());
        let away = time_of_impact(&ball, Quat::IDENTITY, Vec3::ZERO, Vec3::new(-10.0, 0.0, 0.0), &target);
        assert!(away.is_none());
    }
}
