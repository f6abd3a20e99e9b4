use glam::{Mat4, Vec3, Vec4};

/// Result of testing a bounding volume against a set of planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Entirely on the negative side of at least one plane.
    Outside,
    /// On the positive side of every tested plane.
    Inside,
    /// Straddles at least one plane.
    Intersecting,
}

/// Bitmask selecting which of the six frustum planes still need testing.
pub type PlaneMask = u8;

/// All six planes active.
pub const ALL_PLANES: PlaneMask = 0b0011_1111;

/// View frustum as six inward-facing planes (Left, Right, Bottom, Top, Near, Far).
///
/// Planes are normalized so that `dot(n, p) + w` is a signed distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix (Gribb-Hartmann) for a
    /// [0, 1] clip-space depth range.
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0], // Left
            rows[3] - rows[0], // Right
            rows[3] + rows[1], // Bottom
            rows[3] - rows[1], // Top
            rows[2],           // Near
            rows[3] - rows[2], // Far
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[inline]
    fn distance(plane: Vec4, point: Vec3) -> f32 {
        plane.truncate().dot(point) + plane.w
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| Self::distance(*p, point) >= 0.0)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.classify_sphere(center, radius, ALL_PLANES).0 != Containment::Outside
    }

    /// Classifies a sphere against the planes selected by `mask`.
    ///
    /// The returned mask drops every plane the sphere lies fully inside, so
    /// descendants enclosed by this sphere only need to test the rest. A
    /// returned mask of zero means the whole subtree is trivially accepted.
    pub fn classify_sphere(
        &self,
        center: Vec3,
        radius: f32,
        mask: PlaneMask,
    ) -> (Containment, PlaneMask) {
        let mut remaining = mask;

        for (i, plane) in self.planes.iter().enumerate() {
            let bit = 1 << i;
            if mask & bit == 0 {
                continue;
            }
            let d = Self::distance(*plane, center);
            if d < -radius {
                return (Containment::Outside, mask);
            }
            if d >= radius {
                remaining &= !bit;
            }
        }

        if remaining == 0 {
            (Containment::Inside, 0)
        } else {
            (Containment::Intersecting, remaining)
        }
    }

    /// Classifies an axis-aligned box using the positive/negative vertex test.
    pub fn classify_box(&self, min: Vec3, max: Vec3) -> Containment {
        let mut result = Containment::Inside;

        for plane in &self.planes {
            let n = plane.truncate();
            let positive = Vec3::select(n.cmpge(Vec3::ZERO), max, min);
            let negative = Vec3::select(n.cmpge(Vec3::ZERO), min, max);

            if Self::distance(*plane, positive) < 0.0 {
                return Containment::Outside;
            }
            if Self::distance(*plane, negative) < 0.0 {
                result = Containment::Intersecting;
            }
        }

        result
    }
}
