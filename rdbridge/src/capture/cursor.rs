//! Pointer icon compositing.
//!
//! The platform renders the pointer over a solid chroma-key background
//! (pure blue), because icon masks cannot express transparency directly.
//! This pass rebuilds the alpha channel from the key color and fixes up the
//! cursors that come out yellow on that path (the text beam among them).

use image::Rgba;

use crate::surface::{Bitmap, PointerSprite};

/// The chroma-key the platform draws the pointer over.
const MASK_BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
/// Mis-rendered strokes to restore to black.
const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);
/// Key pixels become transparent white.
const TRANSPARENT_WHITE: Rgba<u8> = Rgba([255, 255, 255, 0]);
const OPAQUE_BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Rebuild transparency for a pointer sprite.
///
/// Returns `None` when no opaque black pixel remains: such a cursor is
/// invisible and the frame is suppressed rather than sent.
pub fn compose(sprite: &PointerSprite) -> Option<Bitmap> {
    let mut image = sprite.image.clone();
    let mut has_visible_stroke = false;

    for pixel in image.pixels_mut() {
        if *pixel == MASK_BLUE {
            *pixel = TRANSPARENT_WHITE;
        } else if *pixel == YELLOW {
            *pixel = OPAQUE_BLACK;
        }
        if *pixel == OPAQUE_BLACK {
            has_visible_stroke = true;
        }
    }

    has_visible_stroke.then_some(image)
}
