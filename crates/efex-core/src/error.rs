use thiserror::Error;

use crate::session::DeviceMode;

/// The closed error taxonomy, grouped by origin exactly as spec'd: generic,
/// USB (folded into the wrapped `efex_usb::Error`), protocol, operation,
/// flash, verification, and file. One `thiserror` enum end-to-end.
#[derive(Error, Debug)]
pub enum Error {
    // --- generic ---
    #[error("invalid parameter")]
    InvalidParam,
    /// Unreachable from this crate's safe API (no raw-pointer entry points);
    /// retained for a future FFI/scripting binding built on top of it.
    #[error("null pointer")]
    NullPtr,
    #[error("memory allocation failure")]
    Memory,
    #[error("operation not supported")]
    NotSupport,

    // --- usb ---
    /// USB_INIT / USB_DEVICE_NOT_FOUND / USB_OPEN / USB_TRANSFER /
    /// USB_TIMEOUT all live on `efex_usb::Error`; this variant folds them
    /// into one error type for callers.
    #[error(transparent)]
    Usb(#[from] efex_usb::Error),

    // --- protocol ---
    #[error("device reported protocol status {0:#04x}")]
    Protocol(u8),
    #[error("invalid response from device (bad outer envelope magic)")]
    InvalidResponse,
    #[error("unexpected status {0:#04x} from device")]
    UnexpectedStatus(u8),
    #[error("invalid session state")]
    InvalidState,
    #[error("operation not permitted in device mode {0:?}")]
    InvalidDeviceMode(DeviceMode),

    // --- operation ---
    #[error("operation failed")]
    OperationFailed,
    #[error("device busy")]
    DeviceBusy,
    #[error("device not ready")]
    DeviceNotReady,

    // --- flash ---
    #[error("flash access error")]
    FlashAccess,
    #[error("flash size probe failed")]
    FlashSizeProbe,
    #[error("failed to set flash on/off state")]
    FlashSetOnOff,

    // --- verification ---
    #[error("verification failed")]
    Verification,
    #[error("crc mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    // --- file ---
    #[error("failed to open file: {0}")]
    FileOpen(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to determine file size: {0}")]
    FileSize(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
