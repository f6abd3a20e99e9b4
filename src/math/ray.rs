use glam::{Mat4, Vec3, Vec4};

use super::bounds::{BoundingBox, BoundingSphere};

/// A half-line used for picking and eye-ray sorting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Unprojects a point in normalized device coordinates ([-1, 1] x/y) into a
    /// world-space ray, using the inverse of `view_projection`.
    pub fn from_ndc(ndc_x: f32, ndc_y: f32, view_projection: &Mat4) -> Self {
        let inverse = view_projection.inverse();
        let near = inverse * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
        let far = inverse * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;
        Self::new(near, far - near)
    }

    /// Distance to the first intersection with `sphere`, or `None` if the ray
    /// misses it. A ray starting inside the sphere reports its exit point.
    pub fn intersect_sphere(&self, sphere: &BoundingSphere) -> Option<f32> {
        let oc = self.origin - sphere.center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - sphere.radius * sphere.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let t0 = -b - root;
        let t1 = -b + root;
        if t0 >= 0.0 {
            Some(t0)
        } else if t1 >= 0.0 {
            Some(t1)
        } else {
            None
        }
    }

    /// Slab test; returns the entry distance (zero if the origin is inside).
    pub fn intersect_box(&self, aabb: &BoundingBox) -> Option<f32> {
        let inv = self.direction.recip();
        let t1 = (aabb.min - self.origin) * inv;
        let t2 = (aabb.max - self.origin) * inv;

        let t_min = t1.min(t2).max_element();
        let t_max = t1.max(t2).min_element();

        if t_max < 0.0 || t_min > t_max || t_min.is_nan() || t_max.is_nan() {
            return None;
        }
        Some(t_min.max(0.0))
    }
}
