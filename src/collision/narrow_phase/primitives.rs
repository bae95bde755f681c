//! Closed-form routines for the curved primitives and the GJK/EPA fallback.

use crate::collision::contact::ContactDetails;
use crate::dynamics::Collidable;
use crate::geometry::Shape;
use crate::math::consts::EPSILON;
use crate::math::{normalize_or, Vec3};

use super::clip::{face_contacts, feature_contacts};
use super::epa::epa;
use super::gjk::{gjk, ConvexSupport, GjkResult, Segment};
use super::sat::perform_sat;

/// Segments whose directions agree this closely (|cos|) are treated as parallel.
pub(super) const PARALLEL_COS: f32 = 1.0 - 1e-3;

fn sphere_radius(c: &dyn Collidable) -> Option<f32> {
    match c.shape() {
        Shape::Sphere(s) => Some(s.radius),
        _ => None,
    }
}

/// World space inner segment and radius of a capsule collidable.
fn capsule_segment(c: &dyn Collidable) -> Option<(Vec3, Vec3, f32)> {
    match c.shape() {
        Shape::Capsule(capsule) => {
            let (p, q) = capsule.segment();
            let t = c.transform();
            Some((t.transform_point(p), t.transform_point(q), capsule.radius))
        }
        _ => None,
    }
}

/// Contact between two surface points given the normal from A to B.
fn push_contact(a: &dyn Collidable, b: &dyn Collidable, point_a: Vec3, point_b: Vec3, normal: Vec3, out: &mut Vec<ContactDetails>) {
    let depth = (point_a - point_b).dot(normal);
    out.push(ContactDetails::between(a, b, (point_a + point_b) * 0.5, normal, depth));
}

/// Contact between two rounded cores (points on the inner geometry) of radii `ra`, `rb`.
/// Returns whether the cores are within `ra + rb`.
fn rounded_contact(
    a: &dyn Collidable,
    b: &dyn Collidable,
    core_a: Vec3,
    core_b: Vec3,
    (ra, rb): (f32, f32),
    lightweight: bool,
    out: &mut Vec<ContactDetails>,
) -> bool {
    let offset = core_b - core_a;
    let distance_sq = offset.length_squared();
    let radii = ra + rb;
    if distance_sq >= radii * radii {
        return false;
    }
    if lightweight {
        out.push(ContactDetails::lightweight(a, b));
        return true;
    }
    let normal = normalize_or(offset, Vec3::Y);
    push_contact(a, b, core_a + normal * ra, core_b - normal * rb, normal, out);
    true
}

/// Closest point to `p` on segment `[start, end]` and its parameter.
pub(crate) fn closest_on_segment(start: Vec3, end: Vec3, p: Vec3) -> (Vec3, f32) {
    let d = end - start;
    let length_sq = d.length_squared();
    if length_sq <= EPSILON {
        return (start, 0.0);
    }
    let t = ((p - start).dot(d) / length_sq).clamp(0.0, 1.0);
    (start + d * t, t)
}

/// Closest points between segments `[p1, q1]` and `[p2, q2]` (Ericson, RTCD 5.1.9).
pub(crate) fn closest_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    let (s, t) = if a <= EPSILON && e <= EPSILON {
        (0.0, 0.0)
    } else if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

pub fn sphere_sphere(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let (Some(ra), Some(rb)) = (sphere_radius(a), sphere_radius(b)) else {
        return;
    };
    rounded_contact(a, b, a.transform().position, b.transform().position, (ra, rb), lightweight, out);
}

pub fn sphere_capsule(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let (Some(ra), Some((start, end, rb))) = (sphere_radius(a), capsule_segment(b)) else {
        return;
    };
    let center = a.transform().position;
    let (closest, _) = closest_on_segment(start, end, center);
    rounded_contact(a, b, center, closest, (ra, rb), lightweight, out);
}

/// Capsule pairs. Parallel capsules get two points, one at each end of the
/// overlap of their segments, so they can rest side by side.
pub fn capsule_capsule(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let (Some((p1, q1, ra)), Some((p2, q2, rb))) = (capsule_segment(a), capsule_segment(b)) else {
        return;
    };

    let (d1, d2) = (q1 - p1, q2 - p2);
    let a_len_sq = d1.length_squared();
    let parallel = a_len_sq > EPSILON
        && d2.length_squared() > EPSILON
        && d1.normalize().dot(d2.normalize()).abs() > PARALLEL_COS;

    if parallel && !lightweight {
        // B's endpoints projected onto A's segment parameter.
        let (u, v) = ((p2 - p1).dot(d1) / a_len_sq, (q2 - p1).dot(d1) / a_len_sq);
        let (lo, hi) = (u.min(v).max(0.0), u.max(v).min(1.0));
        if hi - lo > EPSILON {
            let start = out.len();
            for s in [lo, hi] {
                let on_a = p1 + d1 * s;
                let (on_b, _) = closest_on_segment(p2, q2, on_a);
                rounded_contact(a, b, on_a, on_b, (ra, rb), false, out);
            }
            if out.len() > start {
                return;
            }
        }
    }

    let (core_a, core_b) = closest_between_segments(p1, q1, p2, q2);
    rounded_contact(a, b, core_a, core_b, (ra, rb), lightweight, out);
}

/// Sphere against any convex hull. A center outside the hull takes the
/// closest point from GJK; a center inside it falls back to SAT.
pub fn sphere_hull(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let Some(radius) = sphere_radius(a) else {
        return;
    };
    let center = a.transform().position;

    if let GjkResult::Separated { closest_b, distance, .. } = gjk(&center, &ConvexSupport::of(b)) {
        if distance >= radius {
            return;
        }
        if distance > EPSILON {
            if lightweight {
                out.push(ContactDetails::lightweight(a, b));
                return;
            }
            let normal = (closest_b - center) / distance;
            push_contact(a, b, center + normal * radius, closest_b, normal, out);
            return;
        }
    }

    let Some(sat) = perform_sat(a, b) else {
        return;
    };
    if lightweight {
        out.push(ContactDetails::lightweight(a, b));
        return;
    }
    let point_a = center + sat.normal * radius;
    push_contact(a, b, point_a, point_a - sat.normal * sat.depth, sat.normal, out);
}

/// Capsule against a convex hull (box, triangle or cone).
///
/// While the inner segment stays outside the hull, GJK between the segment
/// and the hull gives the normal, and the capsule's side line is clipped
/// against the hull face it lies on: a capsule lying flat gets a point under
/// each end. A segment that reached inside the hull goes through EPA.
pub fn capsule_hull(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let Some((start, end, radius)) = capsule_segment(a) else {
        return;
    };

    if let GjkResult::Separated {
        closest_a,
        closest_b,
        distance,
    } = gjk(&Segment::new(start, end), &ConvexSupport::of(b))
    {
        if distance >= radius {
            return;
        }
        if distance > EPSILON {
            if lightweight {
                out.push(ContactDetails::lightweight(a, b));
                return;
            }
            let normal = (closest_b - closest_a) / distance;
            if !face_contacts(a, b, normal, out) {
                push_contact(a, b, closest_a + normal * radius, closest_b, normal, out);
            }
            return;
        }
    }

    gjk_epa(a, b, lightweight, out);
}

/// Generic convex pair: GJK for overlap, EPA for normal and depth. The
/// points come from the features the two shapes turn towards each other
/// along the EPA normal, so they sit on the contact plane.
pub fn gjk_epa(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let (support_a, support_b) = (ConvexSupport::of(a), ConvexSupport::of(b));
    let GjkResult::Intersecting(simplex) = gjk(&support_a, &support_b) else {
        return;
    };
    if lightweight {
        out.push(ContactDetails::lightweight(a, b));
        return;
    }
    let Some(penetration) = epa(&simplex, &support_a, &support_b) else {
        return;
    };
    if penetration.depth <= 0.0 {
        return;
    }
    if face_contacts(a, b, penetration.normal, out) {
        return;
    }
    feature_contacts(
        a,
        b,
        penetration.normal,
        penetration.depth,
        (penetration.point_a, penetration.point_b),
        out,
    );
}
