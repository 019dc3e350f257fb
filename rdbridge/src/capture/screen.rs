//! Desktop capture with optional client-side scaling.
//!
//! When `scale_display` is on and the client window differs from the
//! desktop, captured pixels are downsampled to client size and rectangle
//! coordinates are remapped with `x' = x * client_w / desktop_w`
//! (symmetric for y). Pointer events travel the inverse transform in the
//! dispatcher, so both sides of the wire agree on client coordinates.

use image::imageops::{self, FilterType};

use rdbridge_core::ImagePolicy;

use crate::surface::{Bitmap, DesktopSurface, Rect};

/// A captured bitmap together with its placement in client coordinates.
pub struct Capture {
    pub bitmap: Bitmap,
    pub pos_x: u32,
    pub pos_y: u32,
}

/// Capture the whole desktop, downscaled to the client window when scaling
/// is on. `None` when no primary surface exists.
pub fn capture_full(surface: &dyn DesktopSurface, policy: &ImagePolicy) -> Option<Capture> {
    let (desktop_w, desktop_h) = surface.size()?;
    let full = Rect::new(0, 0, desktop_w as i32, desktop_h as i32);
    let mut bitmap = surface.grab(full)?;
    if policy.scales_from((desktop_w, desktop_h)) {
        bitmap = downsample(&bitmap, policy.client_width, policy.client_height);
    }
    Some(Capture {
        bitmap,
        pos_x: 0,
        pos_y: 0,
    })
}

/// Capture a desktop region, rejecting rectangles outside the desktop or
/// with inverted coordinates. Under scaling both the pixels and the
/// reported position are mapped to client coordinates.
pub fn capture_region(
    surface: &dyn DesktopSurface,
    policy: &ImagePolicy,
    rect: Rect,
) -> Option<Capture> {
    let (desktop_w, desktop_h) = surface.size()?;
    if !rect.fits(desktop_w, desktop_h) {
        return None;
    }
    if rect.width() == 0 || rect.height() == 0 {
        return None;
    }

    let mut bitmap = surface.grab(rect)?;
    if !policy.scales_from((desktop_w, desktop_h)) {
        return Some(Capture {
            bitmap,
            pos_x: rect.left as u32,
            pos_y: rect.top as u32,
        });
    }

    let mapped = map_rect(rect, (desktop_w, desktop_h), policy);
    if mapped.width() == 0 || mapped.height() == 0 {
        return None;
    }
    bitmap = downsample(&bitmap, mapped.width(), mapped.height());
    Some(Capture {
        bitmap,
        pos_x: mapped.left as u32,
        pos_y: mapped.top as u32,
    })
}

/// Map a desktop-space rectangle into client space.
fn map_rect(rect: Rect, desktop: (u32, u32), policy: &ImagePolicy) -> Rect {
    let scale = |v: i32, client: u32, desktop: u32| -> i32 {
        (v as i64 * client as i64 / desktop as i64) as i32
    };
    Rect::new(
        scale(rect.left, policy.client_width, desktop.0),
        scale(rect.top, policy.client_height, desktop.1),
        scale(rect.right, policy.client_width, desktop.0),
        scale(rect.bottom, policy.client_height, desktop.1),
    )
}

/// High-quality averaging downsample, matching the halftone stretch of the
/// reference client.
fn downsample(bitmap: &Bitmap, width: u32, height: u32) -> Bitmap {
    imageops::resize(bitmap, width, height, FilterType::Triangle)
}
