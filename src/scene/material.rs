use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Scene-level identifier of a shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

/// Scene-level identifier of a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u32);

/// Scene-level identifier of a vertex/index buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Source-alpha blending with a constant material alpha.
    Alpha(f32),
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullFace {
    #[default]
    Back,
    Front,
    None,
}

/// Render state of a shape: what the GPU has to be configured with to draw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub blend: BlendMode,
    pub program: Option<ProgramId>,
    /// Texture bound per unit, unit index = position.
    pub textures: SmallVec<[TextureId; 4]>,
    pub vertex_buffer: Option<BufferId>,
    pub index_buffer: Option<BufferId>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_face: CullFace,
    /// Grouping key for materials that share all state but textures.
    pub material_id: u32,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            blend: BlendMode::Opaque,
            program: None,
            textures: SmallVec::new(),
            vertex_buffer: None,
            index_buffer: None,
            depth_test: true,
            depth_write: true,
            cull_face: CullFace::Back,
            material_id: 0,
        }
    }
}

impl Appearance {
    #[must_use]
    pub fn opaque(material_id: u32) -> Self {
        Self {
            material_id,
            ..Default::default()
        }
    }

    /// Alpha-blended appearance; depth writes are disabled as usual for
    /// sorted transparent geometry.
    #[must_use]
    pub fn transparent(material_id: u32, alpha: f32) -> Self {
        Self {
            blend: BlendMode::Alpha(alpha),
            depth_write: false,
            material_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: ProgramId) -> Self {
        self.program = Some(program);
        self
    }

    #[must_use]
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.textures.push(texture);
        self
    }

    /// Transparency decides the render bin. `Alpha(a)` with `a >= 1.0` draws
    /// like an opaque surface and is binned as opaque.
    pub fn is_transparent(&self) -> bool {
        match self.blend {
            BlendMode::Opaque => false,
            BlendMode::Alpha(alpha) => alpha < 1.0,
            BlendMode::Additive => true,
        }
    }
}
