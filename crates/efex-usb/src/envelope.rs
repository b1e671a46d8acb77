//! Outer USB request/response envelope (the mass-storage-class-shaped frame
//! that wraps every inner EFEX command).
//!
//! Wire layout is authoritative; these host structs use natural field types
//! and alignment. Byte order is handled entirely by `to_bytes`/`from_bytes`,
//! never by `#[repr(C, packed)]` + a transmute.

pub const OUTER_REQUEST_MAGIC: [u8; 4] = *b"AWUC";
pub const OUTER_RESPONSE_MAGIC: [u8; 4] = *b"AWUS";

pub const OUTER_REQUEST_LEN: usize = 31;
pub const OUTER_RESPONSE_LEN: usize = 13;

/// `cmd_length` is always 12: the size of the inner EFEX request that rides
/// inside the outer envelope's `cmd_package`.
pub const INNER_CMD_LENGTH: u8 = 12;

/// First byte of `cmd_package`: which way the data phase moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read = 0x11,
    Write = 0x12,
}

/// The 31-byte outer request envelope.
#[derive(Debug, Clone)]
pub struct OuterRequest {
    pub direction: Direction,
    pub data_length: u32,
}

impl OuterRequest {
    pub fn new(direction: Direction, data_length: u32) -> Self {
        Self {
            direction,
            data_length,
        }
    }

    pub fn to_bytes(&self) -> [u8; OUTER_REQUEST_LEN] {
        let mut out = [0u8; OUTER_REQUEST_LEN];
        out[0..4].copy_from_slice(&OUTER_REQUEST_MAGIC);
        // tag (4 bytes) stays zero
        out[8..12].copy_from_slice(&self.data_length.to_le_bytes());
        // reserved1 (2 bytes), reserved2 (1 byte) stay zero
        out[15] = INNER_CMD_LENGTH;
        out[16] = self.direction as u8;
        // remaining 15 bytes of cmd_package stay zero
        out
    }
}

/// The 13-byte outer response envelope, parsed but not protocol-validated —
/// validating `magic`/`status` is the EFEX request layer's job (`efex-core`),
/// so that magic/status failures surface as `efex_core::Error`, not
/// `efex_usb::Error`.
#[derive(Debug, Clone, Copy)]
pub struct OuterResponse {
    pub magic: [u8; 4],
    pub tag: u32,
    pub residue: u32,
    pub status: u8,
}

impl OuterResponse {
    pub fn from_bytes(buf: &[u8; OUTER_RESPONSE_LEN]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        Self {
            magic,
            tag: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            residue: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            status: buf[12],
        }
    }

    pub fn is_valid_magic(&self) -> bool {
        self.magic == OUTER_RESPONSE_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_to_bytes_has_awuc_magic_and_fixed_cmd_length() {
        let req = OuterRequest::new(Direction::Write, 64);
        let bytes = req.to_bytes();
        assert_eq!(&bytes[0..4], b"AWUC");
        assert_eq!(bytes[15], 12);
        assert_eq!(bytes[16], 0x12);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 64);
    }

    #[test]
    fn read_direction_is_0x11() {
        let req = OuterRequest::new(Direction::Read, 0);
        assert_eq!(req.to_bytes()[16], 0x11);
    }

    #[test]
    fn response_round_trips_fields() {
        let mut raw = [0u8; OUTER_RESPONSE_LEN];
        raw[0..4].copy_from_slice(b"AWUS");
        raw[8..12].copy_from_slice(&7u32.to_le_bytes());
        raw[12] = 0;
        let resp = OuterResponse::from_bytes(&raw);
        assert!(resp.is_valid_magic());
        assert_eq!(resp.residue, 7);
        assert_eq!(resp.status, 0);
    }

    #[test]
    fn response_with_bad_magic_is_detected() {
        let raw = [0u8; OUTER_RESPONSE_LEN];
        let resp = OuterResponse::from_bytes(&raw);
        assert!(!resp.is_valid_magic());
    }
}
