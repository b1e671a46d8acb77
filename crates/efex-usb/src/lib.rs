//! USB backend abstraction and bulk transport framing for the Allwinner
//! EFEX bring-up protocol.
//!
//! This crate knows nothing about EFEX command codes or device modes — it
//! only opens a USB device, discovers its bulk endpoints, and frames the
//! outer "AWUC"/"AWUS" envelope around a payload. `efex-core` builds the
//! protocol on top of it.

pub mod backend;
pub mod envelope;
pub mod error;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

#[cfg(feature = "trace-io")]
mod trace;

pub use backend::{UsbBackend, UsbBackendKind, new_backend};
pub use envelope::{Direction, OuterRequest, OuterResponse};
pub use error::{Error, Result};
