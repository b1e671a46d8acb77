//! The EFEX request layer: frames the 16-byte inner command block for a
//! given command code and reads the 8-byte inner status response. Sits
//! between the command families (FEL/FES) and `efex_usb::transport`.

use crate::error::{Error, Result};
use crate::session::Session;

// --- command codes ---
pub const CMD_VERIFY_DEVICE: u16 = 0x0001;
pub const CMD_SWITCH_ROLE: u16 = 0x0002;
pub const CMD_IS_READY: u16 = 0x0003;
pub const CMD_GET_CMD_SET_VER: u16 = 0x0004;
pub const CMD_DISCONNECT: u16 = 0x0010;

pub const CMD_FEL_WRITE: u16 = 0x0101;
pub const CMD_FEL_EXEC: u16 = 0x0102;
pub const CMD_FEL_READ: u16 = 0x0103;

pub const CMD_FES_TRANS: u16 = 0x0201;
pub const CMD_FES_RUN: u16 = 0x0202;
pub const CMD_FES_INFO: u16 = 0x0203;
pub const CMD_FES_GET_MSG: u16 = 0x0204;
pub const CMD_FES_UNREG_FED: u16 = 0x0205;
pub const CMD_FES_DOWN: u16 = 0x0206;
pub const CMD_FES_UP: u16 = 0x0207;
pub const CMD_FES_VERIFY: u16 = 0x0208;
pub const CMD_FES_QUERY_STORAGE: u16 = 0x0209;
pub const CMD_FES_FLASH_SET_ON: u16 = 0x020A;
pub const CMD_FES_FLASH_SET_OFF: u16 = 0x020B;
pub const CMD_FES_VERIFY_VALUE: u16 = 0x020C;
pub const CMD_FES_VERIFY_STATUS: u16 = 0x020D;
pub const CMD_FES_FLASH_SIZE_PROBE: u16 = 0x020E;
pub const CMD_FES_TOOL_MODE: u16 = 0x020F;
pub const CMD_FES_VERIFY_UBOOT_BLK: u16 = 0x0214;
pub const CMD_FES_FORCE_ERASE_FLASH: u16 = 0x0220;
pub const CMD_FES_FORCE_ERASE_KEY: u16 = 0x0221;
pub const CMD_FES_QUERY_SECURE: u16 = 0x0230;
pub const CMD_FES_QUERY_INFO: u16 = 0x0231;
pub const CMD_FES_GET_CHIPID: u16 = 0x0232;

pub const INNER_REQUEST_LEN: usize = 16;
pub const INNER_RESPONSE_LEN: usize = 8;

/// Observed canonical value of the inner response's `magic` field. Some
/// command paths in Allwinner's own tooling skip this check; this crate
/// validates uniformly against this one value on every path instead.
/// ASCII "OK", little-endian.
pub const INNER_RESPONSE_MAGIC: u16 = 0x4B4F;

/// The 16-byte inner EFEX request. `tag` is always zero: the field is
/// parsed by firmware but never validated against a prior value.
struct InnerRequest {
    cmd: u16,
    address: u32,
    length: u32,
    flags: u32,
}

impl InnerRequest {
    fn to_bytes(&self) -> [u8; INNER_REQUEST_LEN] {
        let mut out = [0u8; INNER_REQUEST_LEN];
        out[0..2].copy_from_slice(&self.cmd.to_le_bytes());
        // tag stays zero
        out[4..8].copy_from_slice(&self.address.to_le_bytes());
        out[8..12].copy_from_slice(&self.length.to_le_bytes());
        out[12..16].copy_from_slice(&self.flags.to_le_bytes());
        out
    }
}

struct InnerResponse {
    magic: u16,
    status: u8,
}

impl InnerResponse {
    fn from_bytes(buf: &[u8; INNER_RESPONSE_LEN]) -> Self {
        Self {
            magic: u16::from_le_bytes(buf[0..2].try_into().unwrap()),
            status: buf[4],
        }
    }
}

/// Build the 16-byte inner request with `cmd`, `address`, `length` (both
/// little-endian), `tag = 0`, and `flags`, then send it via the bulk
/// transport's write. Always frames the inner command inside a WRITE outer
/// request.
pub fn send_request(session: &mut Session, cmd: u16, address: u32, length: u32, flags: u32) -> Result<()> {
    let inner = InnerRequest {
        cmd,
        address,
        length,
        flags,
    };
    let bytes = inner.to_bytes();
    let (ep_in, ep_out) = session.endpoints();
    let outer = efex_usb::transport::write(session.backend_mut(), ep_in, ep_out, &bytes)?;
    validate_outer(&outer)
}

/// Receive the 8-byte inner response, validate its magic uniformly, and
/// return its status byte. Always read back inside a READ outer request.
pub fn read_status(session: &mut Session) -> Result<u8> {
    let mut buf = [0u8; INNER_RESPONSE_LEN];
    let (ep_in, ep_out) = session.endpoints();
    let outer = efex_usb::transport::read(session.backend_mut(), ep_in, ep_out, &mut buf)?;
    validate_outer(&outer)?;

    let inner = InnerResponse::from_bytes(&buf);
    if inner.magic != INNER_RESPONSE_MAGIC {
        return Err(Error::InvalidResponse);
    }
    if inner.status != 0 {
        return Err(Error::Protocol(inner.status));
    }
    Ok(inner.status)
}

fn validate_outer(outer: &efex_usb::OuterResponse) -> Result<()> {
    if !outer.is_valid_magic() {
        return Err(Error::InvalidResponse);
    }
    if outer.status != 0 {
        return Err(Error::Protocol(outer.status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use efex_usb::mock::MockBackend;

    fn ok_outer() -> Vec<u8> {
        let mut raw = [0u8; efex_usb::envelope::OUTER_RESPONSE_LEN];
        raw[0..4].copy_from_slice(b"AWUS");
        raw.to_vec()
    }

    #[test]
    fn send_request_frames_12_byte_inner_inside_outer_write() {
        let mut backend = MockBackend::new(0x81, 0x02);
        // outer response for send_request's own write-phase read-back
        // (send_request only validates the outer envelope, not the inner
        // status -- that is a separate call to read_status).
        backend.push_recv(ok_outer());
        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);

        send_request(&mut session, CMD_FEL_EXEC, 0x1000, 0, 0).unwrap();
    }

    #[test]
    fn read_status_rejects_bad_inner_magic() {
        let mut backend = MockBackend::new(0x81, 0x02);

        let inner = [0u8; INNER_RESPONSE_LEN]; // status ok, magic left zero (invalid)
        backend.push_recv(inner.to_vec());
        backend.push_recv(ok_outer());

        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        let err = read_status(&mut session).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse));
    }

    #[test]
    fn read_status_surfaces_nonzero_status_as_protocol_error() {
        let mut backend = MockBackend::new(0x81, 0x02);

        let mut inner = [0u8; INNER_RESPONSE_LEN];
        inner[0..2].copy_from_slice(&INNER_RESPONSE_MAGIC.to_le_bytes());
        inner[4] = 7;
        backend.push_recv(inner.to_vec());
        backend.push_recv(ok_outer());

        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        let err = read_status(&mut session).unwrap_err();
        assert!(matches!(err, Error::Protocol(7)));
    }
}
