//! Native facade wiring.
//!
//! The bridge consumes its platform through four traits: [`RdpClient`],
//! [`DesktopSurface`], [`PointerSource`] and [`Spooler`]. A native client
//! build registers its implementations here; this crate itself ships none —
//! the protocol stack, the drawing surface and the spooler belong to the
//! embedding RDP client process.

use std::sync::Arc;

use rdbridge_core::BridgeError;

use crate::printer::Spooler;
use crate::rdp::RdpClient;
use crate::surface::{DesktopSurface, PointerSource};

/// The full facade set a bridge needs.
pub struct Facades {
    pub rdp: Arc<dyn RdpClient>,
    pub surface: Arc<dyn DesktopSurface>,
    pub pointer: Arc<dyn PointerSource>,
    pub spooler: Arc<dyn Spooler>,
}

/// Facades for the current platform.
///
/// Errors until a native client integration is linked in; the standalone
/// binary can then drive a session end to end.
pub fn native_facades() -> Result<Facades, BridgeError> {
    Err(BridgeError::Other(
        "no native RDP engine in this build; embed rdbridge as a library".into(),
    ))
}
