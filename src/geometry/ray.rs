use crate::dynamics::BodyHandle;
use crate::math::{normalize_or, Vec3};

/// Where a segment first meets a surface.
///
/// Shape level queries fill in local space values and leave `body` empty; the
/// world maps them into world space and records the body that was hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntersection {
    pub body: Option<BodyHandle>,
    pub point: Vec3,
    pub normal: Vec3,
    /// Distance from the segment start to `point`.
    pub t: f32,
}

impl RayIntersection {
    #[inline]
    pub(crate) fn local(point: Vec3, normal: Vec3, t: f32) -> Self {
        Self {
            body: None,
            point,
            normal,
            t,
        }
    }
}

/// Splits a segment into a unit direction and its length. `None` for zero length segments.
#[inline]
fn direction_and_length(start: Vec3, end: Vec3) -> Option<(Vec3, f32)> {
    let delta = end - start;
    let length = delta.length();
    (length > f32::EPSILON).then(|| (delta / length, length))
}

pub(crate) fn ray_sphere(center: Vec3, radius: f32, start: Vec3, end: Vec3) -> Option<RayIntersection> {
    let (dir, length) = direction_and_length(start, end)?;
    let m = start - center;
    let b = m.dot(dir);
    let c = m.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()).max(0.0);
    if t > length {
        return None;
    }
    let point = start + dir * t;
    let normal = normalize_or(point - center, -dir);
    Some(RayIntersection::local(point, normal, t))
}

pub(crate) fn ray_box(half_extents: Vec3, start: Vec3, end: Vec3) -> Option<RayIntersection> {
    let (dir, length) = direction_and_length(start, end)?;
    let mut t_min = 0.0f32;
    let mut t_max = length;
    let mut normal = -dir;

    for axis in 0..3 {
        let d = dir[axis];
        let s = start[axis];
        let h = half_extents[axis];
        if d.abs() < 1e-9 {
            if s < -h || s > h {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (near, far, sign) = if inv >= 0.0 {
            ((-h - s) * inv, (h - s) * inv, -1.0)
        } else {
            ((h - s) * inv, (-h - s) * inv, 1.0)
        };
        if near > t_min {
            t_min = near;
            normal = Vec3::ZERO;
            normal[axis] = sign;
        }
        t_max = t_max.min(far);
        if t_min > t_max {
            return None;
        }
    }

    Some(RayIntersection::local(start + dir * t_min, normal, t_min))
}

/// Capsule along local Y: the first entry into the union of the side wall and both end spheres.
pub(crate) fn ray_capsule(
    radius: f32,
    half_height: f32,
    start: Vec3,
    end: Vec3,
) -> Option<RayIntersection> {
    let (dir, length) = direction_and_length(start, end)?;
    let mut best: Option<RayIntersection> = None;
    let mut keep = |hit: RayIntersection| {
        if best.map_or(true, |b| hit.t < b.t) {
            best = Some(hit);
        }
    };

    let a = dir.x * dir.x + dir.z * dir.z;
    if a > 1e-12 {
        let b = start.x * dir.x + start.z * dir.z;
        let c = start.x * start.x + start.z * start.z - radius * radius;
        let discriminant = b * b - a * c;
        if discriminant >= 0.0 {
            let t = ((-b - discriminant.sqrt()) / a).max(0.0);
            let point = start + dir * t;
            if t <= length && point.y.abs() <= half_height {
                let normal = normalize_or(Vec3::new(point.x, 0.0, point.z), -dir);
                keep(RayIntersection::local(point, normal, t));
            }
        }
    }

    for cap in [Vec3::Y * half_height, Vec3::NEG_Y * half_height] {
        if let Some(hit) = ray_sphere(cap, radius, start, end) {
            keep(hit);
        }
    }

    best
}

/// Cone with its apex at `+half_height` and base disk at `-half_height`.
pub(crate) fn ray_cone(
    radius: f32,
    half_height: f32,
    start: Vec3,
    end: Vec3,
) -> Option<RayIntersection> {
    let (dir, length) = direction_and_length(start, end)?;
    let k = radius / (2.0 * half_height);
    let k2 = k * k;
    let h = half_height - start.y;

    let mut best: Option<RayIntersection> = None;
    let mut keep = |hit: RayIntersection| {
        if best.map_or(true, |b| hit.t < b.t) {
            best = Some(hit);
        }
    };

    // Side wall: x^2 + z^2 = k^2 (half_height - y)^2 restricted to the lower nappe.
    let a = dir.x * dir.x + dir.z * dir.z - k2 * dir.y * dir.y;
    let b = 2.0 * (start.x * dir.x + start.z * dir.z) + 2.0 * k2 * h * dir.y;
    let c = start.x * start.x + start.z * start.z - k2 * h * h;
    let mut roots = [f32::NAN; 2];
    if a.abs() > 1e-12 {
        let discriminant = b * b - 4.0 * a * c;
        if discriminant >= 0.0 {
            let sq = discriminant.sqrt();
            roots = [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)];
        }
    } else if b.abs() > 1e-12 {
        roots[0] = -c / b;
    }
    for t in roots {
        if !(0.0..=length).contains(&t) {
            continue;
        }
        let point = start + dir * t;
        if point.y < -half_height || point.y > half_height {
            continue;
        }
        let radial = Vec3::new(point.x, 0.0, point.z);
        let normal = normalize_or(
            normalize_or(radial, Vec3::X) + Vec3::new(0.0, k, 0.0),
            Vec3::Y,
        );
        keep(RayIntersection::local(point, normal, t));
    }

    // Base disk.
    if dir.y.abs() > 1e-12 {
        let t = (-half_height - start.y) / dir.y;
        if (0.0..=length).contains(&t) {
            let point = start + dir * t;
            if point.x * point.x + point.z * point.z <= radius * radius {
                keep(RayIntersection::local(point, Vec3::NEG_Y, t));
            }
        }
    }

    best
}

/// Double sided Moller-Trumbore test. The reported normal faces the incoming segment.
pub(crate) fn ray_triangle(
    a: Vec3,
    b: Vec3,
    c: Vec3,
    start: Vec3,
    end: Vec3,
) -> Option<RayIntersection> {
    let (dir, length) = direction_and_length(start, end)?;
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-9 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = start - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    if !(0.0..=length).contains(&t) {
        return None;
    }
    let mut normal = normalize_or(e1.cross(e2), Vec3::Y);
    if normal.dot(dir) > 0.0 {
        normal = -normal;
    }
    Some(RayIntersection::local(start + dir * t, normal, t))
}
