//! Region frame rate control.
//!
//! Region updates pass through a counting gate driven by the image-quantity
//! policy: at quantity `q < 100`, one of every `100 / q` updates is emitted
//! and the rest are dropped before any pixels are copied. Full-screen and
//! cursor frames bypass the gate entirely.

use std::sync::atomic::{AtomicU32, Ordering};

use rdbridge_core::ImageQuantity;

/// Counting gate for region frames.
///
/// The counter is atomic so concurrent capture callbacks cannot corrupt it,
/// and wraps to 0 past `i32::MAX` like the image index.
#[derive(Default)]
pub struct RateController {
    image_count: AtomicU32,
}

impl RateController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a region update and decide whether it may be emitted.
    pub fn admit(&self, quantity: ImageQuantity) -> bool {
        let previous = self
            .image_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(if count >= i32::MAX as u32 { 0 } else { count + 1 })
            })
            .expect("count update never fails");
        let count = if previous >= i32::MAX as u32 {
            0
        } else {
            previous + 1
        };

        match quantity.period() {
            None => true,
            Some(period) => count % period == 0,
        }
    }
}
