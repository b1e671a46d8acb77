//! `efex-core`: EFEX/FEL/FES protocol logic for Allwinner bring-up over USB.
//!
//! Builds the command-state-machine layer (`request`, `fel`, `fes`,
//! `payload`) on top of `efex_usb`'s outer-envelope framing. This crate
//! owns the session lifecycle, the closed error taxonomy, and the mode
//! gating that decides which command families a given session may use.

pub mod consts;
pub mod error;
pub mod fel;
pub mod fes;
pub mod payload;
pub mod request;
pub mod session;

pub use error::{Error, Result};
pub use payload::PayloadArch;
pub use session::{DeviceMode, DeviceResponse, Session};

/// A sink for chunked-operation progress, fed bytes as they complete.
/// `efex-core`'s FEL/FES chunked operations accept `impl ProgressReporter`
/// so the core never owns a terminal dependency; the CLI supplies a
/// `pbr`-backed implementation, tests and library callers pass
/// [`NoProgress`].
pub trait ProgressReporter {
    fn start(&mut self, total_bytes: usize);
    fn advance(&mut self, bytes: usize);
    fn finish(&mut self);
}

/// A no-op [`ProgressReporter`] for callers that don't want progress events.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _total_bytes: usize) {}
    fn advance(&mut self, _bytes: usize) {}
    fn finish(&mut self) {}
}
