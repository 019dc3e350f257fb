//! Image policy knobs driven by the browser client.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.

use crate::error::BridgeError;

// ── ImageEncoding ────────────────────────────────────────────────

/// Encoder selection for region and full-screen frames.
///
/// `Auto` encodes both PNG and JPEG per frame and keeps whichever payload is
/// smaller: text-heavy regions compress better losslessly, photographic ones
/// as JPEG.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageEncoding {
    /// Per-frame choice of the smaller of PNG and JPEG.
    #[default]
    Auto = 0,
    Png = 1,
    Jpeg = 2,
    Webp = 3,
}

impl TryFrom<u32> for ImageEncoding {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ImageEncoding::Auto),
            1 => Ok(ImageEncoding::Png),
            2 => Ok(ImageEncoding::Jpeg),
            3 => Ok(ImageEncoding::Webp),
            _ => Err(BridgeError::UnknownValue {
                type_name: "ImageEncoding",
                value,
            }),
        }
    }
}

// ── ImageQuality ─────────────────────────────────────────────────

/// Quality step for lossy encoders, in percent.
///
/// The same base values are used for JPEG and WebP. PNG is lossless and
/// always reports [`ImageQuality::Highest`] regardless of the policy value.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ImageQuality {
    Low = 10,
    Medium = 25,
    /// Default; tweaked dynamically from client bandwidth.
    #[default]
    High = 50,
    /// Used for full-screen updates.
    Higher = 75,
    Highest = 100,
}

impl ImageQuality {
    /// The percentage value carried in frame metadata and fed to encoders.
    pub fn percent(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ImageQuality {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(ImageQuality::Low),
            25 => Ok(ImageQuality::Medium),
            50 => Ok(ImageQuality::High),
            75 => Ok(ImageQuality::Higher),
            100 => Ok(ImageQuality::Highest),
            _ => Err(BridgeError::UnknownValue {
                type_name: "ImageQuality",
                value,
            }),
        }
    }
}

// ── ImageQuantity ────────────────────────────────────────────────

/// Fraction of region updates to emit, in percent (IPS ratio).
///
/// `All` emits every region update; a value `q < 100` emits one of every
/// `100 / q` updates and drops the rest.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageQuantity {
    Five = 5,
    Ten = 10,
    Twenty = 20,
    TwentyFive = 25,
    Fifty = 50,
    #[default]
    All = 100,
}

impl ImageQuantity {
    /// Emit period: one of every `period` region updates goes out.
    /// `None` means no rate limiting.
    pub fn period(self) -> Option<u32> {
        match self {
            ImageQuantity::All => None,
            q => Some(100 / q as u32),
        }
    }
}

impl TryFrom<u32> for ImageQuantity {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(ImageQuantity::Five),
            10 => Ok(ImageQuantity::Ten),
            20 => Ok(ImageQuantity::Twenty),
            25 => Ok(ImageQuantity::TwentyFive),
            50 => Ok(ImageQuantity::Fifty),
            100 => Ok(ImageQuantity::All),
            _ => Err(BridgeError::UnknownValue {
                type_name: "ImageQuantity",
                value,
            }),
        }
    }
}

// ── ImagePolicy ──────────────────────────────────────────────────

/// A consistent snapshot of the per-session image policy.
///
/// The live session keeps these fields in atomics and mutexes; this value is
/// what the capture pipeline reads once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePolicy {
    pub encoding: ImageEncoding,
    pub quality: ImageQuality,
    pub quantity: ImageQuantity,
    /// Downscale captures to the client window size and remap coordinates.
    pub scale_display: bool,
    /// Browser client window size, in pixels. Mutated together.
    pub client_width: u32,
    pub client_height: u32,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            encoding: ImageEncoding::default(),
            quality: ImageQuality::default(),
            quantity: ImageQuantity::default(),
            scale_display: false,
            client_width: 1024,
            client_height: 768,
        }
    }
}

impl ImagePolicy {
    /// Whether captures must be rescaled for the given desktop size.
    pub fn scales_from(&self, desktop: (u32, u32)) -> bool {
        self.scale_display
            && self.client_width > 0
            && self.client_height > 0
            && (self.client_width, self.client_height) != desktop
    }
}
