use thiserror::Error;

/// Errors produced by the USB backend and bulk transport layer.
///
/// This is deliberately narrow: only USB- and transport-origin failures live
/// here. Protocol-level failures (bad status byte, wrong device mode, and so
/// on) belong to `efex-core`, which wraps this type via `#[from]`.
#[derive(Error, Debug)]
pub enum Error {
    /// No device matching the EFEX vendor/product pair was found during scan.
    #[error("no usb device found for vendor {vendor:#06x} product {product:#06x}")]
    DeviceNotFound { vendor: u16, product: u16 },

    /// The device was found but could not be opened.
    #[error("failed to open usb device: {0}")]
    Open(rusb::Error),

    /// The mass-storage-shaped interface could not be claimed.
    #[error("failed to claim usb interface: {0}")]
    ClaimInterface(rusb::Error),

    /// Configuration descriptors were walked but no matching bulk IN/OUT
    /// endpoint pair was found on any altsetting.
    #[error("no bulk in/out endpoint pair found on device")]
    EndpointsNotFound,

    /// A bulk transfer failed partway through.
    #[error("usb bulk transfer failed: {0}")]
    Transfer(#[from] rusb::Error),

    /// A bulk transfer did not complete within the default timeout.
    #[error("usb transfer timed out")]
    Timeout,

    /// An invalid parameter was supplied, e.g. requesting the platform-native
    /// backend on a platform that does not compile it in.
    #[error("invalid parameter")]
    InvalidParam,

    /// The requested capability is not implemented by the active backend.
    #[error("operation not supported by this backend")]
    NotSupport,
}

pub type Result<T> = std::result::Result<T, Error>;
