//! Contact patches. A face of either shape that lines up with the contact
//! normal becomes the reference face, and the feature the other shape turns
//! towards it (a face, an edge line or a single point) is clipped against it.
//! Pairs with no such face get a single point placed on whichever side
//! presents one.

use std::f32::consts::TAU;

use smallvec::{smallvec, SmallVec};

use crate::collision::contact::ContactDetails;
use crate::collision::manifold::MAX_CONTACT_POINTS;
use crate::dynamics::Collidable;
use crate::geometry::{Cone, Shape};
use crate::math::consts::EPSILON;
use crate::math::{Transform, Vec3};

use super::gjk::{ConvexSupport, SupportMap};
use super::primitives::{closest_between_segments, closest_on_segment, PARALLEL_COS};
use super::sat::perform_sat;

/// A reference face must be at least this aligned with the contact normal;
/// below it the contact is an edge crossing and is reported as one point.
const FACE_ALIGNMENT: f32 = 0.99;

/// Largest |cos| between a direction and a capsule axis or cone side for
/// that line to still face the direction. Same angle as [`FACE_ALIGNMENT`].
const LINE_ALIGNMENT: f32 = 0.14;

/// Slack when preferring A's face over B's as the reference.
const REFERENCE_BIAS: f32 = 1e-3;

/// Rim vertices of a cone's base polygon.
const BASE_SAMPLES: usize = 8;

type Polygon = SmallVec<[Vec3; 8]>;

/// Surface points on A and B and the depth between them.
type Candidate = (Vec3, Vec3, f32);

#[derive(Debug, Clone)]
struct Face {
    normal: Vec3,
    vertices: Polygon,
}

/// The part of a convex surface that is extreme along a direction.
#[derive(Debug, Clone)]
enum Feature {
    Point(Vec3),
    Segment(Vec3, Vec3),
    Face(Face),
}

fn cone_base(cone: &Cone, transform: &Transform) -> Face {
    let vertices = (0..BASE_SAMPLES)
        .map(|i| {
            let angle = i as f32 * TAU / BASE_SAMPLES as f32;
            let rim = Vec3::new(cone.radius * angle.cos(), -cone.half_height, cone.radius * angle.sin());
            transform.transform_point(rim)
        })
        .collect();
    Face {
        normal: transform.transform_vector(Vec3::NEG_Y),
        vertices,
    }
}

/// World space flat faces: six for a box, both sides of a triangle and the
/// base of a cone. Other shapes have none.
fn world_faces(shape: &Shape, transform: &Transform) -> SmallVec<[Face; 6]> {
    let mut faces = SmallVec::new();
    match shape {
        Shape::Box(b) => {
            let h = b.half_extents;
            for axis in 0..3 {
                let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
                for sign in [1.0f32, -1.0] {
                    let mut normal = Vec3::ZERO;
                    normal[axis] = sign;
                    let center = normal * h[axis];
                    let mut eu = Vec3::ZERO;
                    eu[u] = h[u];
                    let mut ev = Vec3::ZERO;
                    ev[v] = h[v];
                    let corners = [
                        center - eu - ev,
                        center + eu - ev,
                        center + eu + ev,
                        center - eu + ev,
                    ];
                    faces.push(Face {
                        normal: transform.transform_vector(normal),
                        vertices: corners.iter().map(|&c| transform.transform_point(c)).collect(),
                    });
                }
            }
        }
        Shape::Triangle(t) => {
            let [a, b, c] = t.vertices.map(|p| transform.transform_point(p));
            let normal = transform.transform_vector(t.normal);
            faces.push(Face {
                normal,
                vertices: smallvec![a, b, c],
            });
            faces.push(Face {
                normal: -normal,
                vertices: smallvec![a, c, b],
            });
        }
        Shape::Cone(c) => faces.push(cone_base(c, transform)),
        _ => {}
    }
    faces
}

fn most_aligned(faces: &[Face], direction: Vec3) -> Option<&Face> {
    faces
        .iter()
        .max_by(|x, y| x.normal.dot(direction).total_cmp(&y.normal.dot(direction)))
}

/// Feature of `c` facing the unit `direction`.
///
/// Boxes and triangles always answer with their best aligned face. A capsule
/// lying across the direction answers with its side line, a cone with its
/// base or the side line from rim to apex when those face it.
fn feature(c: &dyn Collidable, direction: Vec3) -> Feature {
    let transform = c.transform();
    let local = transform.inverse_transform_vector(direction);
    let support = || Feature::Point(ConvexSupport::of(c).support(direction));

    match c.shape() {
        Shape::Box(_) | Shape::Triangle(_) => {
            let faces = world_faces(c.shape(), transform);
            match most_aligned(&faces, direction) {
                Some(face) => Feature::Face(face.clone()),
                None => support(),
            }
        }
        Shape::Capsule(capsule) if capsule.half_height > EPSILON && local.y.abs() <= LINE_ALIGNMENT => {
            let (p, q) = capsule.segment();
            let offset = local * capsule.radius;
            Feature::Segment(transform.transform_point(p + offset), transform.transform_point(q + offset))
        }
        Shape::Cone(cone) => {
            if -local.y >= FACE_ALIGNMENT {
                return Feature::Face(cone_base(cone, transform));
            }
            let sigma = (local.x * local.x + local.z * local.z).sqrt();
            if sigma <= EPSILON || cone.half_height <= EPSILON {
                return support();
            }
            let (cos, sin) = (local.x / sigma, local.z / sigma);
            let slope = cone.radius / (2.0 * cone.half_height);
            let side = Vec3::new(cos, slope, sin).normalize();
            if side.dot(local) < FACE_ALIGNMENT {
                return support();
            }
            let rim = Vec3::new(cone.radius * cos, -cone.half_height, cone.radius * sin);
            let apex = Vec3::new(0.0, cone.half_height, 0.0);
            Feature::Segment(transform.transform_point(rim), transform.transform_point(apex))
        }
        _ => support(),
    }
}

/// Side planes of `face`, each as a point on it and its outward normal.
fn side_planes(face: &Face) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
    let centroid = face.vertices.iter().copied().sum::<Vec3>() / face.vertices.len() as f32;
    face.vertices.iter().enumerate().map(move |(i, &start)| {
        let end = face.vertices[(i + 1) % face.vertices.len()];
        let mut plane = (end - start).cross(face.normal);
        if plane.dot(centroid - start) > 0.0 {
            plane = -plane;
        }
        (start, plane)
    })
}

/// Sutherland-Hodgman clip of `polygon` against the side planes of `face`.
fn clip_to_face(polygon: &Polygon, face: &Face) -> Polygon {
    let mut current = polygon.clone();

    for (start, plane) in side_planes(face) {
        if current.is_empty() {
            break;
        }
        let distance = |p: Vec3| plane.dot(p - start);

        let input = std::mem::take(&mut current);
        for (j, &p) in input.iter().enumerate() {
            let q = input[(j + 1) % input.len()];
            let (dp, dq) = (distance(p), distance(q));
            if dp <= 0.0 {
                current.push(p);
            }
            if (dp < 0.0) != (dq < 0.0) && (dp - dq).abs() > f32::EPSILON {
                let t = dp / (dp - dq);
                current.push(p + (q - p) * t);
            }
        }
    }
    current
}

/// The part of segment `[start, end]` over `face`: zero, one or two points.
fn clip_segment(start: Vec3, end: Vec3, face: &Face) -> Polygon {
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for (origin, plane) in side_planes(face) {
        let (ds, de) = (plane.dot(start - origin), plane.dot(end - origin));
        if ds > 0.0 && de > 0.0 {
            return Polygon::new();
        }
        if ds > 0.0 {
            lo = lo.max(ds / (ds - de));
        } else if de > 0.0 {
            hi = hi.min(ds / (ds - de));
        }
    }
    if lo > hi {
        return Polygon::new();
    }
    let d = end - start;
    if (hi - lo) * d.length() <= EPSILON {
        smallvec![start + d * lo]
    } else {
        smallvec![start + d * lo, start + d * hi]
    }
}

fn clip_feature(feature: &Feature, face: &Face) -> Polygon {
    match feature {
        Feature::Face(incident) => clip_to_face(&incident.vertices, face),
        &Feature::Segment(start, end) => clip_segment(start, end, face),
        &Feature::Point(p) => {
            if side_planes(face).all(|(origin, plane)| plane.dot(p - origin) <= 0.0) {
                smallvec![p]
            } else {
                Polygon::new()
            }
        }
    }
}

/// Cuts `candidates` down to [`MAX_CONTACT_POINTS`]: the deepest one, the
/// one farthest from it, then the widest on either side of that line.
fn reduce(candidates: &mut SmallVec<[Candidate; 8]>, normal: Vec3) {
    if candidates.len() <= MAX_CONTACT_POINTS {
        return;
    }
    let at = |i: usize| (candidates[i].0 + candidates[i].1) * 0.5;
    let arg_max = |key: &dyn Fn(usize) -> f32| {
        (0..candidates.len())
            .max_by(|&x, &y| key(x).total_cmp(&key(y)))
            .unwrap_or(0)
    };

    let deepest = arg_max(&|i: usize| candidates[i].2);
    let origin = at(deepest);
    let farthest = arg_max(&|i: usize| at(i).distance_squared(origin));
    let edge = at(farthest) - origin;
    let area = |i: usize| edge.cross(at(i) - origin).dot(normal);
    let left = arg_max(&area);
    let right = arg_max(&|i: usize| -area(i));

    let mut keep: SmallVec<[usize; MAX_CONTACT_POINTS]> = smallvec![deepest];
    for i in [farthest, left, right] {
        if !keep.contains(&i) {
            keep.push(i);
        }
    }
    *candidates = keep.iter().map(|&i| candidates[i]).collect();
}

/// Contact patch for shapes touching along `normal` (from A to B), clipped
/// against a reference face. Returns `false`, pushing nothing, when neither
/// shape has a face within [`FACE_ALIGNMENT`] of the normal or the clip
/// leaves no overlapping point.
pub(super) fn face_contacts(a: &dyn Collidable, b: &dyn Collidable, normal: Vec3, out: &mut Vec<ContactDetails>) -> bool {
    let faces_a = world_faces(a.shape(), a.transform());
    let faces_b = world_faces(b.shape(), b.transform());
    let ref_a = most_aligned(&faces_a, normal);
    let ref_b = most_aligned(&faces_b, -normal);
    let align_a = ref_a.map_or(f32::NEG_INFINITY, |face| face.normal.dot(normal));
    let align_b = ref_b.map_or(f32::NEG_INFINITY, |face| face.normal.dot(-normal));
    if align_a.max(align_b) < FACE_ALIGNMENT {
        return false;
    }

    let (reference, incident, reference_is_a) = match (ref_a, ref_b) {
        (Some(face), _) if align_a + REFERENCE_BIAS >= align_b => (face, feature(b, -face.normal), true),
        (_, Some(face)) => (face, feature(a, -face.normal), false),
        _ => return false,
    };

    let origin = reference.vertices[0];
    let mut candidates: SmallVec<[Candidate; 8]> = SmallVec::new();
    for p in clip_feature(&incident, reference) {
        let separation = reference.normal.dot(p - origin);
        if separation > 0.0 {
            continue;
        }
        let depth = -separation;
        let on_reference = p + reference.normal * depth;
        candidates.push(if reference_is_a {
            (on_reference, p, depth)
        } else {
            (p, on_reference, depth)
        });
    }

    let normal = if reference_is_a {
        reference.normal
    } else {
        -reference.normal
    };
    reduce(&mut candidates, normal);
    for &(point_a, point_b, depth) in &candidates {
        out.push(ContactDetails::between(a, b, (point_a + point_b) * 0.5, normal, depth));
    }
    !candidates.is_empty()
}

/// Contacts for shapes overlapping by `depth` along `normal` where no face
/// lines up. The point goes where one side presents a single point (a
/// vertex, a tip or a curved patch) so its lever arms follow the normal.
/// Two lines lying along each other get a point at each end of their
/// overlap. `witnesses` place the point when nothing else does.
pub(super) fn feature_contacts(
    a: &dyn Collidable,
    b: &dyn Collidable,
    normal: Vec3,
    depth: f32,
    witnesses: (Vec3, Vec3),
    out: &mut Vec<ContactDetails>,
) {
    let (point_a, point_b) = match (feature(a, normal), feature(b, -normal)) {
        (Feature::Point(p), _) => (p, p - normal * depth),
        (_, Feature::Point(p)) => (p + normal * depth, p),
        (Feature::Segment(p1, q1), Feature::Segment(p2, q2)) => {
            if segment_pair_contacts(a, b, (p1, q1), (p2, q2), normal, out) {
                return;
            }
            let (on_a, on_b) = closest_between_segments(p1, q1, p2, q2);
            let mid = (on_a + on_b) * 0.5;
            (mid + normal * (depth * 0.5), mid - normal * (depth * 0.5))
        }
        _ => {
            let mid = (witnesses.0 + witnesses.1) * 0.5;
            (mid + normal * (depth * 0.5), mid - normal * (depth * 0.5))
        }
    };
    out.push(ContactDetails::between(a, b, (point_a + point_b) * 0.5, normal, depth));
}

/// Two points for surface lines lying along each other, one at each end of
/// their overlap. Returns `false` when the lines cross or miss.
fn segment_pair_contacts(
    a: &dyn Collidable,
    b: &dyn Collidable,
    (p1, q1): (Vec3, Vec3),
    (p2, q2): (Vec3, Vec3),
    normal: Vec3,
    out: &mut Vec<ContactDetails>,
) -> bool {
    let (d1, d2) = (q1 - p1, q2 - p2);
    let length_sq = d1.length_squared();
    if length_sq <= EPSILON || d2.length_squared() <= EPSILON {
        return false;
    }
    if d1.normalize().dot(d2.normalize()).abs() <= PARALLEL_COS {
        return false;
    }

    let (u, v) = ((p2 - p1).dot(d1) / length_sq, (q2 - p1).dot(d1) / length_sq);
    let (lo, hi) = (u.min(v).max(0.0), u.max(v).min(1.0));
    if hi - lo <= EPSILON {
        return false;
    }
    let start = out.len();
    for s in [lo, hi] {
        let on_a = p1 + d1 * s;
        let (on_b, _) = closest_on_segment(p2, q2, on_a);
        let depth = (on_a - on_b).dot(normal);
        if depth > 0.0 {
            out.push(ContactDetails::between(a, b, (on_a + on_b) * 0.5, normal, depth));
        }
    }
    out.len() > start
}

/// Box and triangle pairs: SAT for the axis, then face clipping. Edge
/// crossings report a single point midway between the two support points.
pub fn polyhedral(a: &dyn Collidable, b: &dyn Collidable, lightweight: bool, out: &mut Vec<ContactDetails>) {
    let Some(sat) = perform_sat(a, b) else {
        return;
    };
    if lightweight {
        out.push(ContactDetails::lightweight(a, b));
        return;
    }
    if face_contacts(a, b, sat.normal, out) {
        return;
    }

    let witnesses = (
        ConvexSupport::of(a).support(sat.normal),
        ConvexSupport::of(b).support(-sat.normal),
    );
    feature_contacts(a, b, sat.normal, sat.depth, witnesses, out);
}
