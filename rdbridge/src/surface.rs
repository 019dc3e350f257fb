//! Facades over the remote desktop's drawing surface and pointer.
//!
//! The bridge never touches platform graphics directly; the embedding RDP
//! client supplies implementations of these traits (GDI, XRender, a
//! framebuffer — whatever backs its primary surface).

use image::RgbaImage;

/// Pixel buffer exchanged with the capture pipeline, RGBA8 row-major.
pub type Bitmap = RgbaImage;

// ── Rect ─────────────────────────────────────────────────────────

/// A desktop-space rectangle, `(left, top)` inclusive, `(right, bottom)`
/// exclusive. Signed so that out-of-bounds and inverted regions reported by
/// the RDP stack can be rejected rather than wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    /// Valid within a desktop of the given size: inside bounds and not
    /// inverted.
    pub fn fits(&self, desktop_width: u32, desktop_height: u32) -> bool {
        let (w, h) = (desktop_width as i32, desktop_height as i32);
        self.left >= 0
            && self.top >= 0
            && self.right <= w
            && self.bottom <= h
            && self.left <= self.right
            && self.top <= self.bottom
    }
}

// ── DesktopSurface ───────────────────────────────────────────────

/// Source of desktop pixels.
pub trait DesktopSurface: Send + Sync {
    /// Current desktop dimensions, or `None` while there is no primary
    /// drawing surface (e.g. before the first graphics update).
    fn size(&self) -> Option<(u32, u32)>;

    /// Copy the pixels of `rect` out of the primary surface.
    ///
    /// Returns `None` when no surface is available; the rectangle has
    /// already been validated against [`DesktopSurface::size`].
    fn grab(&self, rect: Rect) -> Option<Bitmap>;
}

// ── PointerSource ────────────────────────────────────────────────

/// The current pointer icon, rendered by the platform over the solid
/// chroma-key background the compositor expects.
#[derive(Debug, Clone)]
pub struct PointerSprite {
    pub image: Bitmap,
    /// Pointer hot-spot, relative to the sprite's top-left corner.
    pub hotspot_x: u32,
    pub hotspot_y: u32,
}

/// Source of the current pointer icon.
pub trait PointerSource: Send + Sync {
    /// Render the current pointer over the chroma-key background, sized to
    /// the platform cursor metrics. `None` while no surface or pointer is
    /// available.
    fn render(&self) -> Option<PointerSprite>;
}
