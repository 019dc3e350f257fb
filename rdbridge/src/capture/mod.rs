//! Capture entry points and the encode/emit pipeline.
//!
//! The RDP client calls the three [`CaptureHooks`] entry points from its own
//! threads whenever the display changes; the gateway can also force a full
//! refresh through the `FSU` command. Everything funnels into
//! [`CapturePipeline::process`], which applies the quality rules, encodes,
//! allocates the frame index and hands the frame to the updates writer.

mod cursor;
mod encode;
mod rate;
mod screen;

pub use encode::Encoder;
pub use rate::RateController;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use rdbridge_core::{Frame, FrameFormat, ImageQuality, MAX_FRAME_PAYLOAD};

use crate::config::BridgeConfig;
use crate::session::SessionState;
use crate::surface::{Bitmap, DesktopSurface, PointerSource, Rect};
use crate::writer::UpdatesSender;

// ── CaptureHooks ─────────────────────────────────────────────────

/// Display-change entry points, implemented by the bridge and injected into
/// the RDP client at startup.
pub trait CaptureHooks: Send + Sync {
    /// Capture and send the whole desktop.
    fn send_screen(&self);

    /// Capture and send one updated desktop region.
    fn send_region(&self, region: Rect);

    /// Send the current pointer icon.
    fn send_cursor(&self);
}

// ── CapturePipeline ──────────────────────────────────────────────

/// The capture → encode → emit pipeline shared by the RDP callbacks and the
/// input dispatcher.
pub struct CapturePipeline {
    state: Arc<SessionState>,
    surface: Arc<dyn DesktopSurface>,
    pointer: Arc<dyn PointerSource>,
    updates: UpdatesSender,
    rate: RateController,
    save_dir: Option<PathBuf>,
}

impl CapturePipeline {
    pub fn new(
        state: Arc<SessionState>,
        surface: Arc<dyn DesktopSurface>,
        pointer: Arc<dyn PointerSource>,
        updates: UpdatesSender,
        config: &BridgeConfig,
    ) -> Self {
        let save_dir = config.capture.save_frames.then(|| {
            let dir = BridgeConfig::log_dir()
                .unwrap_or_else(|| PathBuf::from("log"))
                .join(format!(
                    "remotesession_{}.{}",
                    state.id(),
                    std::process::id()
                ));
            if let Err(e) = std::fs::create_dir_all(&dir) {
                warn!("cannot create frame directory {}: {e}", dir.display());
            }
            dir
        });
        Self {
            state,
            surface,
            pointer,
            updates,
            rate: RateController::new(),
            save_dir,
        }
    }

    /// Desktop dimensions, for pointer coordinate remapping.
    pub fn desktop_size(&self) -> Option<(u32, u32)> {
        self.surface.size()
    }

    /// Encode one bitmap per the session policy and emit it.
    fn process(&self, bitmap: Bitmap, pos_x: u32, pos_y: u32, fullscreen: bool) {
        let policy = self.state.policy();
        // Full-screen updates go out at raised quality; a PNG outcome
        // overrides to lossless either way.
        let quality = if fullscreen {
            ImageQuality::Higher
        } else {
            policy.quality
        };

        let encoder = Encoder::from_policy(policy.encoding, quality);
        let (format, quality, payload) = match encoder.encode(&bitmap) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("{err}; frame dropped");
                return;
            }
        };

        self.emit(Frame {
            idx: self.state.next_image_idx(),
            pos_x,
            pos_y,
            width: bitmap.width(),
            height: bitmap.height(),
            format,
            quality,
            fullscreen,
            payload: Bytes::from(payload),
        });
    }

    fn emit(&self, frame: Frame) {
        // Images are capped so a single frame cannot overload the channel
        // or the browser.
        if frame.payload.len() > MAX_FRAME_PAYLOAD {
            debug!(
                idx = frame.idx,
                len = frame.payload.len(),
                "frame over payload cap, dropped"
            );
            return;
        }
        self.save_artifact(&frame);
        self.updates.send_frame(frame);
    }

    /// Debug artifact: dump the encoded payload next to the log files.
    fn save_artifact(&self, frame: &Frame) {
        let Some(dir) = &self.save_dir else { return };
        let name = match frame.format {
            FrameFormat::Cur => format!("cursor_{}.png", frame.idx),
            FrameFormat::Png if frame.fullscreen => format!("screen_{}.png", frame.idx),
            FrameFormat::Png => format!("region_{}.png", frame.idx),
            FrameFormat::Jpeg if frame.fullscreen => {
                format!("screen_{}_{}.jpg", frame.idx, frame.quality.percent())
            }
            FrameFormat::Jpeg => {
                format!("region_{}_{}.jpg", frame.idx, frame.quality.percent())
            }
            FrameFormat::Webp if frame.fullscreen => {
                format!("screen_{}_{}.webp", frame.idx, frame.quality.percent())
            }
            FrameFormat::Webp => {
                format!("region_{}_{}.webp", frame.idx, frame.quality.percent())
            }
        };
        if let Err(e) = std::fs::write(dir.join(&name), &frame.payload) {
            warn!("cannot save frame artifact {name}: {e}");
        }
    }
}

impl CaptureHooks for CapturePipeline {
    fn send_screen(&self) {
        if self.state.id() == 0 {
            return;
        }
        let policy = self.state.policy();
        let Some(capture) = screen::capture_full(self.surface.as_ref(), &policy) else {
            trace!("send_screen: no primary surface");
            return;
        };
        self.process(capture.bitmap, capture.pos_x, capture.pos_y, true);
    }

    fn send_region(&self, region: Rect) {
        if self.state.id() == 0 {
            return;
        }
        let policy = self.state.policy();
        let Some((desktop_w, desktop_h)) = self.surface.size() else {
            trace!("send_region: no primary surface");
            return;
        };
        if !region.fits(desktop_w, desktop_h) {
            return;
        }
        if !self.rate.admit(policy.quantity) {
            trace!(quantity = ?policy.quantity, "region dropped by rate control");
            return;
        }
        let Some(capture) = screen::capture_region(self.surface.as_ref(), &policy, region) else {
            return;
        };
        self.process(capture.bitmap, capture.pos_x, capture.pos_y, false);
    }

    fn send_cursor(&self) {
        if self.state.id() == 0 {
            return;
        }
        let Some(sprite) = self.pointer.render() else {
            trace!("send_cursor: no pointer available");
            return;
        };
        let Some(image) = cursor::compose(&sprite) else {
            trace!("send_cursor: empty cursor suppressed");
            return;
        };

        let payload = match encode::encode_png(&image) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("{err}; cursor dropped");
                return;
            }
        };
        self.emit(Frame {
            idx: self.state.next_image_idx(),
            pos_x: sprite.hotspot_x,
            pos_y: sprite.hotspot_y,
            width: image.width(),
            height: image.height(),
            format: FrameFormat::Cur,
            quality: ImageQuality::Highest,
            fullscreen: false,
            payload: Bytes::from(payload),
        });
    }
}
