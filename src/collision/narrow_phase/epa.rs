use crate::math::Vec3;

use super::gjk::{Simplex, SupportMap, SupportVertex};

/// Maximum iterations for EPA algorithm
const EPA_MAX_ITERATIONS: usize = 64;

/// Tolerance for EPA convergence
const EPA_TOLERANCE: f32 = 1e-4;

/// Maximum number of faces in the polytope
const EPA_MAX_FACES: usize = 128;

/// Directions tried when a touching contact leaves GJK with a flat simplex.
const BLOW_UP_DIRECTIONS: [Vec3; 6] = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

/// Result of EPA algorithm
#[derive(Debug, Clone, Copy)]
pub struct EpaResult {
    /// Penetration normal, pointing from A towards B
    pub normal: Vec3,
    /// Penetration depth
    pub depth: f32,
    /// Deepest point of A inside B (world space)
    pub point_a: Vec3,
    /// Deepest point of B inside A (world space)
    pub point_b: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// Expands the GJK simplex into a polytope until the face closest to the
/// origin lies on the boundary of `A - B`.
///
/// Simplices smaller than a tetrahedron (shapes just touching) are grown with
/// extra support points first. Returns `None` when the difference is flat.
pub fn epa(simplex: &Simplex, a: &impl SupportMap, b: &impl SupportMap) -> Option<EpaResult> {
    let mut vertices: Vec<SupportVertex> = simplex.vertices().to_vec();
    if vertices.len() < 4 {
        blow_up(&mut vertices, a, b);
        if vertices.len() < 4 {
            return None;
        }
    }

    let mut faces: Vec<Face> = Vec::with_capacity(EPA_MAX_FACES);
    for indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        if let Some(face) = create_face(&vertices, indices) {
            faces.push(face);
        }
    }
    fix_winding(&vertices, &mut faces);

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest = *closest_face(&faces)?;

        let vertex = SupportVertex::compute(a, b, closest.normal);
        let distance = vertex.w.dot(closest.normal);
        if distance - closest.distance < EPA_TOLERANCE {
            return Some(compute_contact(&vertices, &closest));
        }

        let new_index = vertices.len();
        vertices.push(vertex);

        // Remove faces visible from the new point, keeping their silhouette
        let mut edges: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let on_face = vertices[face.indices[0]].w;
            if face.normal.dot(vertex.w - on_face) > 0.0 {
                for j in 0..3 {
                    add_or_remove_edge(&mut edges, (face.indices[j], face.indices[(j + 1) % 3]));
                }
                false
            } else {
                true
            }
        });

        for (i, j) in edges {
            if let Some(face) = create_face(&vertices, [i, j, new_index]) {
                faces.push(face);
            }
        }

        if faces.len() > EPA_MAX_FACES {
            break;
        }
    }

    closest_face(&faces).map(|face| compute_contact(&vertices, face))
}

fn closest_face(faces: &[Face]) -> Option<&Face> {
    faces.iter().min_by(|x, y| x.distance.total_cmp(&y.distance))
}

/// Adds support points until the vertices span a tetrahedron.
fn blow_up(vertices: &mut Vec<SupportVertex>, a: &impl SupportMap, b: &impl SupportMap) {
    for direction in BLOW_UP_DIRECTIONS {
        if vertices.len() == 4 {
            return;
        }
        let candidate = SupportVertex::compute(a, b, direction);
        if raises_dimension(vertices, candidate.w) {
            vertices.push(candidate);
        }
    }
}

fn raises_dimension(vertices: &[SupportVertex], w: Vec3) -> bool {
    const TOLERANCE: f32 = 1e-8;
    match vertices {
        [] => true,
        [p] => p.w.distance_squared(w) > TOLERANCE,
        [p, q] => (q.w - p.w).cross(w - p.w).length_squared() > TOLERANCE,
        [p, q, r, ..] => (q.w - p.w).cross(r.w - p.w).dot(w - p.w).abs() > TOLERANCE,
    }
}

fn create_face(vertices: &[SupportVertex], indices: [usize; 3]) -> Option<Face> {
    let a = vertices[indices[0]].w;
    let b = vertices[indices[1]].w;
    let c = vertices[indices[2]].w;

    let normal = (b - a).cross(c - a);
    let len = normal.length();
    if len < 1e-10 {
        return None;
    }

    let normal = normal / len;
    Some(Face {
        indices,
        normal,
        distance: normal.dot(a),
    })
}

/// Flips faces of the initial tetrahedron so normals point away from its centroid.
fn fix_winding(vertices: &[SupportVertex], faces: &mut [Face]) {
    let centroid = vertices.iter().map(|v| v.w).sum::<Vec3>() / vertices.len() as f32;

    for face in faces.iter_mut() {
        let to_face = vertices[face.indices[0]].w - centroid;
        if face.normal.dot(to_face) < 0.0 {
            face.normal = -face.normal;
            face.distance = -face.distance;
            face.indices.swap(0, 1);
        }
    }
}

/// Adds an edge to the silhouette, or drops it when its twin is already there.
fn add_or_remove_edge(edges: &mut Vec<(usize, usize)>, edge: (usize, usize)) {
    let reverse = (edge.1, edge.0);
    if let Some(pos) = edges.iter().position(|e| *e == reverse) {
        edges.swap_remove(pos);
    } else {
        edges.push(edge);
    }
}

fn compute_contact(vertices: &[SupportVertex], face: &Face) -> EpaResult {
    let [i, j, k] = face.indices;
    let bary = barycentric_coordinates(
        face.normal * face.distance,
        vertices[i].w,
        vertices[j].w,
        vertices[k].w,
    );

    let point_a = vertices[i].a * bary.x + vertices[j].a * bary.y + vertices[k].a * bary.z;
    let point_b = vertices[i].b * bary.x + vertices[j].b * bary.y + vertices[k].b * bary.z;

    EpaResult {
        normal: face.normal,
        depth: face.distance.max(0.0),
        point_a,
        point_b,
    }
}

fn barycentric_coordinates(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-10 {
        return Vec3::splat(1.0 / 3.0);
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vec3::new(1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::narrow_phase::gjk::{gjk, ConvexSupport, GjkResult};
    use crate::geometry::Shape;
    use crate::math::Transform;
    use approx::assert_relative_eq;

    fn penetration(shape_a: &Shape, pa: Vec3, shape_b: &Shape, pb: Vec3) -> EpaResult {
        let a = ConvexSupport::new(shape_a, Transform::from_position(pa));
        let b = ConvexSupport::new(shape_b, Transform::from_position(pb));
        let GjkResult::Intersecting(simplex) = gjk(&a, &b) else {
            panic!("expected intersection");
        };
        epa(&simplex, &a, &b).expect("penetration")
    }

    #[test]
    fn sphere_sphere_penetration() {
        let sphere = Shape::sphere(1.0);
        let contact = penetration(&sphere, Vec3::ZERO, &sphere, Vec3::new(1.5, 0.0, 0.0));
        assert_relative_eq!(contact.depth, 0.5, epsilon = 0.05);
        assert!(contact.normal.x > 0.9);
        assert_relative_eq!((contact.point_a - contact.point_b).dot(contact.normal), contact.depth, epsilon = 0.05);
    }

    #[test]
    fn box_box_penetration() {
        let cube = Shape::cuboid(Vec3::ONE);
        let contact = penetration(&cube, Vec3::ZERO, &cube, Vec3::new(0.0, 1.5, 0.3));
        assert_relative_eq!(contact.depth, 0.5, epsilon = 1e-3);
        assert!(contact.normal.abs_diff_eq(Vec3::Y, 1e-3));
    }
}
