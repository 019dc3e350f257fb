//! Headless bridge between a native RDP client and a web gateway.
//!
//! One process serves one remote session: the bridge connects the session's
//! two local IPC channels, translates tagged gateway commands into RDP input
//! events, and streams encoded desktop updates back. The RDP stack, the
//! drawing surface, the pointer renderer and the print spooler are external
//! collaborators injected through the traits in [`rdp`], [`surface`] and
//! [`printer`].

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod ipc;
pub mod platform;
pub mod printer;
pub mod rdp;
pub mod session;
pub mod surface;
pub mod writer;

pub use config::BridgeConfig;
pub use session::Bridge;
