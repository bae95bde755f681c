use glam::{Mat3, Mat4, Quat, Vec3};

/// A rigid transformation: rotation followed by translation.
///
/// Bodies cache both their transform and its inverse; compound children and
/// proxies compose them with [`Transform::mul_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[inline]
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    #[inline]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    #[inline]
    pub const fn from_rotation(rotation: Quat) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation,
        }
    }

    /// Rotation part as a 3x3 matrix.
    #[inline]
    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    /// Local space point to world space.
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// Local space direction to world space. Translation is ignored.
    #[inline]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// World space point to local space.
    #[inline]
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    /// World space direction to local space.
    #[inline]
    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.inverse() * vector
    }

    #[inline]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: rotation * -self.position,
            rotation,
        }
    }

    /// `self * other`: maps from `other`'s local frame through `self` into world space.
    #[inline]
    pub fn mul_transform(&self, other: &Transform) -> Self {
        Self {
            position: self.transform_point(other.position),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// Homogeneous matrix form, for renderers and debug drawing.
    #[inline]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// Advances an orientation by an angular velocity over `dt`.
///
/// First-order quaternion integration: `q' = q + 0.5 * dt * (w, 0) * q`,
/// renormalized.
#[inline]
pub fn integrate_rotation(rotation: Quat, angular_velocity: Vec3, dt: f32) -> Quat {
    let w = angular_velocity * (0.5 * dt);
    let spin = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * rotation;
    let q = Quat::from_xyzw(
        rotation.x + spin.x,
        rotation.y + spin.y,
        rotation.z + spin.z,
        rotation.w + spin.w,
    );
    let length = q.length();
    if length > f32::EPSILON {
        q / length
    } else {
        rotation
    }
}

/// Builds two unit tangents that together with `normal` form an orthonormal basis.
#[inline]
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    // Pick the axis least aligned with the normal.
    let t1 = if normal.x.abs() >= 0.57735 {
        Vec3::new(normal.y, -normal.x, 0.0).normalize()
    } else {
        Vec3::new(0.0, normal.z, -normal.y).normalize()
    };
    let t2 = normal.cross(t1);
    (t1, t2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn point_round_trip() {
        let t = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_2),
        );
        let p = Vec3::new(0.5, -1.0, 2.0);
        let back = t.inverse_transform_point(t.transform_point(p));
        assert!(back.abs_diff_eq(p, 1e-5));
    }

    #[test]
    fn inverse_composes_to_identity() {
        let t = Transform::new(
            Vec3::new(-3.0, 0.5, 4.0),
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 0.7),
        );
        let id = t.mul_transform(&t.inverse());
        assert!(id.position.abs_diff_eq(Vec3::ZERO, 1e-5));
        assert_relative_eq!(id.rotation.dot(Quat::IDENTITY).abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn integrate_rotation_spins_about_axis() {
        let mut q = Quat::IDENTITY;
        let dt = 1.0 / 240.0;
        for _ in 0..240 {
            q = integrate_rotation(q, Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0), dt);
        }
        // A quarter turn about +Y takes +X to -Z.
        let x = q * Vec3::X;
        assert!(x.abs_diff_eq(Vec3::NEG_Z, 1e-2), "{x:?}");
    }

    #[test]
    fn tangent_basis_is_orthonormal() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (t1, t2) = tangent_basis(n);
            assert_relative_eq!(t1.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(t2.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(t1.dot(n), 0.0, epsilon = 1e-5);
            assert_relative_eq!(t2.dot(n), 0.0, epsilon = 1e-5);
            assert_relative_eq!(t1.dot(t2), 0.0, epsilon = 1e-5);
        }
    }
}
