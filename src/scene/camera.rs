use glam::{Affine3A, Mat4, Vec3};

/// The viewer: where the eye is and where it looks.
///
/// Projection lives in the render pass configuration, so one camera can
/// drive a perspective 3D pass and a parallel overlay pass in the same frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    world: Affine3A,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Affine3A::IDENTITY)
    }
}

impl Camera {
    #[must_use]
    pub fn new(world: Affine3A) -> Self {
        Self { world }
    }

    /// Camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        Self {
            world: Affine3A::from_mat4(view.inverse()),
        }
    }

    pub fn set_world_transform(&mut self, world: Affine3A) {
        self.world = world;
    }

    #[inline]
    pub fn world_transform(&self) -> &Affine3A {
        &self.world
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.world.translation.into()
    }

    /// Unit facing direction (local -Z in world space).
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.world.transform_vector3(Vec3::NEG_Z).normalize_or_zero()
    }

    /// View matrix = inverse of the world transform.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from(self.world.inverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_faces_target() {
        let cam = Camera::look_at(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0), Vec3::Y);
        assert!((cam.forward() - Vec3::Z).length() < 1e-5);
        assert!(cam.position().length() < 1e-5);
    }

    #[test]
    fn view_matrix_is_inverse_of_world() {
        let cam = Camera::new(Affine3A::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let product = Mat4::from(*cam.world_transform()) * cam.view_matrix();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }
}
