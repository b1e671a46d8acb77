//! The USB backend capability set.
//!
//! One trait, multiple implementors selected at runtime: a capability-set
//! trait rather than a function-pointer table.

use crate::error::{Error, Result};

mod rusb_backend;
pub use rusb_backend::RusbBackend;

#[cfg(all(windows, feature = "platform-native"))]
mod native;
#[cfg(all(windows, feature = "platform-native"))]
pub use native::NativeBackend;

/// The default timeout applied to every USB control or bulk transfer.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Transport-level chunk size: `bulk_send`/`bulk_recv` loop internally in
/// pieces this large to tolerate short transfers, returning success only
/// once every byte has actually gone out or come in.
pub const TRANSPORT_CHUNK_SIZE: usize = 128 * 1024;

/// The EFEX USB device identity: a fixed vendor/product pair.
pub const EFEX_VENDOR_ID: u16 = 0x1F3A;
pub const EFEX_PRODUCT_ID: u16 = 0xEFE8;

/// Backend selection: a plain argument threaded through `Session::open`,
/// never a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsbBackendKind {
    /// Picks `PlatformNative` on Windows, `Libusb` everywhere else.
    #[default]
    Auto,
    /// The `rusb`-backed (libusb-equivalent) backend.
    Libusb,
    /// The Windows-only `nusb`-backed backend. Selecting it on a non-Windows
    /// build, or one compiled without the `platform-native` feature, fails
    /// with `Error::InvalidParam`.
    PlatformNative,
}

/// Narrow, five-operation USB contract every backend implements.
///
/// `scan` finds and opens the device, `init` claims the interface and
/// discovers endpoints. A backend is useless for transfers until both have
/// succeeded.
pub trait UsbBackend: std::fmt::Debug {
    /// Enumerate attached devices, open the first matching `vendor`/`product`.
    fn scan(&mut self, vendor: u16, product: u16) -> Result<()>;

    /// Claim the interface, detaching any blocking kernel driver, and
    /// discover the single bulk IN / bulk OUT endpoint pair. Returns
    /// `(ep_in, ep_out)`.
    fn init(&mut self) -> Result<(u8, u8)>;

    /// Close the handle and release any claimed interface. Idempotent.
    fn exit(&mut self);

    /// Send `buf` out endpoint `ep`, looping internally in
    /// `TRANSPORT_CHUNK_SIZE` pieces until every byte has been sent.
    fn bulk_send(&mut self, ep: u8, buf: &[u8]) -> Result<()>;

    /// Fill `buf` by reading from endpoint `ep`, looping internally until
    /// every byte has been received.
    fn bulk_recv(&mut self, ep: u8, buf: &mut [u8]) -> Result<()>;
}

/// Construct the default backend for `kind` on this platform.
///
/// This is the one place backend selection is resolved; everything above it
/// programs against `dyn UsbBackend`.
pub fn new_backend(kind: UsbBackendKind) -> Result<Box<dyn UsbBackend>> {
    match resolve(kind)? {
        ResolvedKind::Libusb => Ok(Box::new(RusbBackend::new())),
        #[cfg(all(windows, feature = "platform-native"))]
        ResolvedKind::PlatformNative => Ok(Box::new(NativeBackend::new())),
    }
}

enum ResolvedKind {
    Libusb,
    #[cfg(all(windows, feature = "platform-native"))]
    PlatformNative,
}

fn resolve(kind: UsbBackendKind) -> Result<ResolvedKind> {
    match kind {
        UsbBackendKind::Libusb => Ok(ResolvedKind::Libusb),
        UsbBackendKind::Auto => {
            #[cfg(all(windows, feature = "platform-native"))]
            {
                Ok(ResolvedKind::PlatformNative)
            }
            #[cfg(not(all(windows, feature = "platform-native")))]
            {
                Ok(ResolvedKind::Libusb)
            }
        }
        UsbBackendKind::PlatformNative => {
            #[cfg(all(windows, feature = "platform-native"))]
            {
                Ok(ResolvedKind::PlatformNative)
            }
            #[cfg(not(all(windows, feature = "platform-native")))]
            {
                Err(Error::InvalidParam)
            }
        }
    }
}
