//! Render targets: where a pass's pixels go.
//!
//! A target is a tagged union over the default framebuffer, an offscreen
//! texture and a CPU-readable image buffer. Backends dispatch on
//! [`RenderTargetKind`] once, when the target is activated.

use std::sync::Arc;

use glam::Vec4;
use parking_lot::Mutex;

use crate::errors::{RenderError, Result};
use crate::scene::{NodeKey, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Converts bottom-left-origin read-back bytes into top-left-origin packed
/// `0xAARRGGBB` pixels. When `flip` is false rows are kept in source order.
pub fn convert_readback(
    raw: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    flip: bool,
) -> Result<Vec<u32>> {
    let bpp = format.bytes_per_pixel();
    let row_bytes = width as usize * bpp;
    let expected = row_bytes * height as usize;
    if raw.len() != expected {
        return Err(RenderError::InvalidImageBuffer {
            expected,
            actual: raw.len(),
        });
    }

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        let src_row = if flip { height as usize - 1 - y } else { y };
        let row = &raw[src_row * row_bytes..(src_row + 1) * row_bytes];
        for px in row.chunks_exact(bpp) {
            let a = if bpp == 4 { u32::from(px[3]) } else { 0xFF };
            pixels.push(
                (a << 24) | (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]),
            );
        }
    }
    Ok(pixels)
}

/// CPU-side pixel store filled after each frame that renders into it.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    flip_on_readback: bool,
    pixels: Arc<Mutex<Vec<u32>>>,
}

impl ImageBuffer {
    #[must_use]
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            flip_on_readback: true,
            pixels: Arc::new(Mutex::new(vec![0; width as usize * height as usize])),
        }
    }

    /// Disables the vertical flip, for backends that already read top-down.
    #[must_use]
    pub fn without_flip(mut self) -> Self {
        self.flip_on_readback = false;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn flip_on_readback(&self) -> bool {
        self.flip_on_readback
    }

    /// Snapshot of the current pixels, row-major from the top-left corner.
    pub fn pixels(&self) -> Vec<u32> {
        self.pixels.lock().clone()
    }

    /// Converts and stores raw read-back bytes. Synchronous, O(width x height).
    pub fn store_readback(&self, raw: &[u8]) -> Result<()> {
        self.store_readback_as(raw, self.format)
    }

    /// Like [`store_readback`](Self::store_readback) for bytes read in
    /// another format, e.g. a screenshot taken without alpha.
    pub fn store_readback_as(&self, raw: &[u8], format: PixelFormat) -> Result<()> {
        let converted =
            convert_readback(raw, self.width, self.height, format, self.flip_on_readback)?;
        *self.pixels.lock() = converted;
        Ok(())
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.pixels) as usize
    }
}

#[derive(Debug, Clone)]
pub enum RenderTargetKind {
    DefaultFramebuffer,
    OffscreenTexture(TextureId),
    ImageBuffer(ImageBuffer),
}

/// Identity used by the renderer's target-to-pass mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKey {
    DefaultFramebuffer,
    Texture(TextureId),
    Image(usize),
}

#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub kind: RenderTargetKind,
    /// Subtree drawn into this target; `None` uses the pass's own root.
    pub root: Option<NodeKey>,
    pub background: Vec4,
    pub background_enabled: bool,
    /// Backing size of an offscreen texture; `None` follows the canvas.
    pub size: Option<(u32, u32)>,
}

impl RenderTarget {
    #[must_use]
    pub fn new(kind: RenderTargetKind) -> Self {
        Self {
            kind,
            root: None,
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            background_enabled: true,
            size: None,
        }
    }

    #[must_use]
    pub fn offscreen(texture: TextureId) -> Self {
        Self::new(RenderTargetKind::OffscreenTexture(texture))
    }

    #[must_use]
    pub fn image(buffer: ImageBuffer) -> Self {
        Self::new(RenderTargetKind::ImageBuffer(buffer))
    }

    #[must_use]
    pub fn with_background(mut self, color: Vec4) -> Self {
        self.background = color;
        self.background_enabled = true;
        self
    }

    #[must_use]
    pub fn without_background(mut self) -> Self {
        self.background_enabled = false;
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: NodeKey) -> Self {
        self.root = Some(root);
        self
    }

    pub fn key(&self) -> TargetKey {
        match &self.kind {
            RenderTargetKind::DefaultFramebuffer => TargetKey::DefaultFramebuffer,
            RenderTargetKind::OffscreenTexture(t) => TargetKey::Texture(*t),
            RenderTargetKind::ImageBuffer(b) => TargetKey::Image(b.identity()),
        }
    }

    /// Size of the frame drawn into this target, when it does not follow the
    /// canvas. Image buffers always draw at their own size.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        match &self.kind {
            RenderTargetKind::ImageBuffer(buffer) => Some((buffer.width(), buffer.height())),
            _ => self.size,
        }
    }

    /// Color the target is cleared to before a frame, if clearing is enabled.
    pub fn clear_color(&self) -> Option<Vec4> {
        self.background_enabled.then_some(self.background)
    }
}
