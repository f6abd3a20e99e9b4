//! Render pass configuration
//!
//! [`RenderPassConfig`] is a plain record read once per frame. Named presets
//! cover the usual cases (perspective 3D, parallel, pixel-aligned 2D); the
//! setters below enforce the few ordering rules the record has.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Affine3A, Mat4};
use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};
use crate::renderer::sorting::{RenderBinSorter, SortingPolicy, ZValueSorter};
use crate::scene::Camera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionPolicy {
    Perspective,
    Parallel,
}

/// How the pass derives its view transform from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMode {
    /// Follows the camera.
    Normal,
    /// Ignores the camera; identity view unless overridden.
    Fixed,
    /// Follows the camera's rotation only (sky boxes, backgrounds).
    FixedPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RenderOptions: u32 {
        const LIGHTING  = 1 << 0;
        const TEXTURING = 1 << 1;
        const WIREFRAME = 1 << 2;
        const FOG       = 1 << 3;
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions::LIGHTING | RenderOptions::TEXTURING
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorMask: u8 {
        const RED   = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE  = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::all()
    }
}

/// Per-bin sorting override. Empty means "use the renderer default".
#[derive(Clone, Default)]
pub struct SorterSlot {
    policy: Option<SortingPolicy>,
    sorter: Option<Arc<dyn RenderBinSorter>>,
}

impl fmt::Debug for SorterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SorterSlot")
            .field("policy", &self.policy)
            .field("sorter", &self.sorter)
            .finish()
    }
}

impl SorterSlot {
    pub fn policy(&self) -> Option<SortingPolicy> {
        self.policy
    }

    pub fn sorter(&self) -> Option<&Arc<dyn RenderBinSorter>> {
        self.sorter.as_ref()
    }

    pub fn is_overridden(&self) -> bool {
        self.policy.is_some()
    }

    /// Installs the canonical sorter of `policy`, replacing any custom one.
    pub fn set_policy(&mut self, policy: SortingPolicy) -> Result<()> {
        let sorter = policy
            .canonical_sorter()
            .ok_or(RenderError::CustomPolicyWithoutSorter)?;
        self.policy = Some(policy);
        self.sorter = Some(sorter);
        Ok(())
    }

    /// Installs an explicit sorter; the policy becomes `Custom`.
    pub fn set_sorter(&mut self, sorter: Arc<dyn RenderBinSorter>) {
        self.policy = Some(SortingPolicy::Custom);
        self.sorter = Some(sorter);
    }

    pub fn clear(&mut self) {
        self.policy = None;
        self.sorter = None;
    }
}

/// Configuration of one render pass.
#[derive(Debug, Clone)]
pub struct RenderPassConfig {
    camera_mode: Option<CameraMode>,
    projection: Option<ProjectionPolicy>,
    pub front_clip: f32,
    pub back_clip: f32,
    /// Vertical field of view in radians (perspective only).
    pub fov_y: f32,
    /// Half-height of the view volume (parallel only).
    pub screen_scale: f32,
    pub view_override: Option<Affine3A>,
    pub viewport: Option<Viewport>,
    pub options: RenderOptions,
    pub color_mask: ColorMask,
    opaque: SorterSlot,
    transparent: SorterSlot,
}

impl Default for RenderPassConfig {
    fn default() -> Self {
        Self {
            camera_mode: None,
            projection: None,
            front_clip: 0.1,
            back_clip: 1000.0,
            fov_y: std::f32::consts::FRAC_PI_4,
            screen_scale: 1.0,
            view_override: None,
            viewport: None,
            options: RenderOptions::default(),
            color_mask: ColorMask::default(),
            opaque: SorterSlot::default(),
            transparent: SorterSlot::default(),
        }
    }
}

impl RenderPassConfig {
    /// Empty configuration. A camera mode must be set before the projection
    /// policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Perspective projection following the camera.
    #[must_use]
    pub fn perspective(fov_y: f32, front_clip: f32, back_clip: f32) -> Self {
        Self {
            camera_mode: Some(CameraMode::Normal),
            projection: Some(ProjectionPolicy::Perspective),
            fov_y,
            front_clip,
            back_clip,
            ..Self::default()
        }
    }

    /// Parallel projection following the camera.
    #[must_use]
    pub fn parallel(screen_scale: f32, front_clip: f32, back_clip: f32) -> Self {
        Self {
            camera_mode: Some(CameraMode::Normal),
            projection: Some(ProjectionPolicy::Parallel),
            screen_scale,
            front_clip,
            back_clip,
            ..Self::default()
        }
    }

    /// Fixed parallel view for overlays: ignores the camera, draws by raw Z.
    #[must_use]
    pub fn two_d() -> Self {
        let mut config = Self {
            camera_mode: Some(CameraMode::Fixed),
            projection: Some(ProjectionPolicy::Parallel),
            front_clip: -1.0,
            back_clip: 1.0,
            options: RenderOptions::TEXTURING,
            ..Self::default()
        };
        let by_z: Arc<dyn RenderBinSorter> = Arc::new(ZValueSorter::default());
        config.opaque = SorterSlot {
            policy: Some(SortingPolicy::ByZValue),
            sorter: Some(by_z.clone()),
        };
        config.transparent = SorterSlot {
            policy: Some(SortingPolicy::ByZValue),
            sorter: Some(by_z),
        };
        config
    }

    pub fn camera_mode(&self) -> Option<CameraMode> {
        self.camera_mode
    }

    pub fn set_camera_mode(&mut self, mode: CameraMode) {
        self.camera_mode = Some(mode);
    }

    pub fn projection_policy(&self) -> Option<ProjectionPolicy> {
        self.projection
    }

    pub fn set_projection_policy(&mut self, policy: ProjectionPolicy) -> Result<()> {
        if self.camera_mode.is_none() {
            return Err(RenderError::CameraModeNotSet);
        }
        self.projection = Some(policy);
        Ok(())
    }

    pub fn opaque_sorting(&self) -> &SorterSlot {
        &self.opaque
    }

    pub fn transparent_sorting(&self) -> &SorterSlot {
        &self.transparent
    }

    pub fn opaque_sorting_policy(&self) -> Option<SortingPolicy> {
        self.opaque.policy()
    }

    pub fn transparent_sorting_policy(&self) -> Option<SortingPolicy> {
        self.transparent.policy()
    }

    pub fn set_opaque_sorting_policy(&mut self, policy: SortingPolicy) -> Result<()> {
        self.opaque.set_policy(policy)
    }

    pub fn set_transparent_sorting_policy(&mut self, policy: SortingPolicy) -> Result<()> {
        self.transparent.set_policy(policy)
    }

    pub fn set_opaque_sorter(&mut self, sorter: Arc<dyn RenderBinSorter>) {
        self.opaque.set_sorter(sorter);
    }

    pub fn set_transparent_sorter(&mut self, sorter: Arc<dyn RenderBinSorter>) {
        self.transparent.set_sorter(sorter);
    }

    /// Falls back to the renderer's default sorting for both bins.
    pub fn clear_sorting_overrides(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Projection matrix for the given aspect ratio. Passes without a
    /// projection policy render in perspective.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        match self.projection.unwrap_or(ProjectionPolicy::Perspective) {
            ProjectionPolicy::Perspective => {
                Mat4::perspective_rh(self.fov_y, aspect, self.front_clip, self.back_clip)
            }
            ProjectionPolicy::Parallel => {
                let half_h = self.screen_scale;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(
                    -half_w,
                    half_w,
                    -half_h,
                    half_h,
                    self.front_clip,
                    self.back_clip,
                )
            }
        }
    }

    /// World transform of the eye this pass renders from.
    pub fn eye_transform(&self, camera: &Camera) -> Affine3A {
        if let Some(view) = self.view_override {
            return view;
        }
        match self.camera_mode.unwrap_or(CameraMode::Normal) {
            CameraMode::Normal => *camera.world_transform(),
            CameraMode::Fixed => Affine3A::IDENTITY,
            CameraMode::FixedPosition => {
                let mut rotation_only = *camera.world_transform();
                rotation_only.translation = glam::Vec3A::ZERO;
                rotation_only
            }
        }
    }

    /// View matrix (inverse eye transform).
    pub fn view_matrix(&self, camera: &Camera) -> Mat4 {
        Mat4::from(self.eye_transform(camera).inverse())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::renderer::sorting::StateSorter;

    #[test]
    fn projection_policy_needs_camera_mode() {
        let mut config = RenderPassConfig::new();
        assert_eq!(
            config.set_projection_policy(ProjectionPolicy::Parallel),
            Err(RenderError::CameraModeNotSet)
        );
        config.set_camera_mode(CameraMode::Normal);
        assert!(config.set_projection_policy(ProjectionPolicy::Parallel).is_ok());
        assert_eq!(config.projection_policy(), Some(ProjectionPolicy::Parallel));
    }

    #[test]
    fn named_policy_replaces_custom_sorter() {
        let mut config = RenderPassConfig::perspective(1.0, 0.1, 100.0);
        config.set_opaque_sorter(Arc::new(StateSorter));
        assert_eq!(config.opaque_sorting_policy(), Some(SortingPolicy::Custom));

        config.set_opaque_sorting_policy(SortingPolicy::FrontToBack).unwrap();
        assert_eq!(config.opaque_sorting_policy(), Some(SortingPolicy::FrontToBack));
        assert!(config.opaque_sorting().sorter().is_some());
    }

    #[test]
    fn custom_policy_by_name_is_rejected() {
        let mut config = RenderPassConfig::new();
        assert_eq!(
            config.set_transparent_sorting_policy(SortingPolicy::Custom),
            Err(RenderError::CustomPolicyWithoutSorter)
        );
        assert_eq!(config.transparent_sorting_policy(), None);
    }

    #[test]
    fn fixed_position_mode_drops_translation() {
        let mut config = RenderPassConfig::perspective(1.0, 0.1, 100.0);
        config.set_camera_mode(CameraMode::FixedPosition);
        let camera = Camera::new(Affine3A::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(config.eye_transform(&camera), Affine3A::IDENTITY);
    }
}
