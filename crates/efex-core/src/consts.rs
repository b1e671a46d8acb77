//! Named configuration constants. Nothing protocol-critical should be an
//! inline literal at its call site — these are the single source of truth.

/// FEL memory read/write chunk size.
pub const FEL_CHUNK_SIZE: usize = 64 * 1024;

/// The EFEX inner-payload size limit. Some firmware revisions cap this at
/// 32 KiB; 64 KiB is used here, exposed as a named constant so a caller
/// targeting older firmware has somewhere to point instead of touching call
/// sites.
pub const EFEX_CODE_MAX_SIZE: usize = 64 * 1024;

/// `flags` bit marking the chunk that completes a FES down/up transfer.
pub const TRANS_FINISH: u32 = 0x10000;

/// `flags` bit callers may set on the first chunk of a FES down/up transfer.
/// Whether firmware actually requires it is unconfirmed; this crate never
/// sets it implicitly.
pub const TRANS_START: u32 = 0x20000;

/// Mask isolating the data-type classification bits from the transfer-phase
/// markers above when deciding advance-by-bytes vs. advance-by-sectors:
/// checks `tag & 0x7FFF` rather than the full low 16 bits.
pub const DATA_TYPE_MASK: u32 = 0x7FFF;

/// Sector size used to compute address advance for non-data-type FES
/// transfers (`length / FES_SECTOR_SIZE`).
pub const FES_SECTOR_SIZE: u64 = 512;
