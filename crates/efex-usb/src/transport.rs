//! Bulk transport: frames the outer envelope, performs the payload phase,
//! and hands back the raw outer response. Protocol validation of that
//! response (magic check, status-to-error mapping) belongs to the EFEX
//! request layer in `efex-core`, which owns the protocol-origin error
//! variants — this crate only knows about USB and framing, not EFEX
//! semantics.

use crate::backend::UsbBackend;
use crate::envelope::{Direction, OUTER_RESPONSE_LEN, OuterRequest, OuterResponse};
use crate::error::Result;

/// Outer-envelope WRITE: send `buf` to the device, then read the outer
/// response. Used both to carry an inner EFEX request and to carry a FES
/// header/payload — both ride inside a WRITE-direction outer envelope.
pub fn write(
    backend: &mut dyn UsbBackend,
    ep_in: u8,
    ep_out: u8,
    buf: &[u8],
) -> Result<OuterResponse> {
    let envelope = OuterRequest::new(Direction::Write, buf.len() as u32);
    backend.bulk_send(ep_out, &envelope.to_bytes())?;
    if !buf.is_empty() {
        backend.bulk_send(ep_out, buf)?;
    }
    read_response(backend, ep_in)
}

/// Outer-envelope READ: ask the device for `buf.len()` bytes, fill `buf`,
/// then read the outer response.
pub fn read(
    backend: &mut dyn UsbBackend,
    ep_in: u8,
    ep_out: u8,
    buf: &mut [u8],
) -> Result<OuterResponse> {
    let envelope = OuterRequest::new(Direction::Read, buf.len() as u32);
    backend.bulk_send(ep_out, &envelope.to_bytes())?;
    if !buf.is_empty() {
        backend.bulk_recv(ep_in, buf)?;
    }
    read_response(backend, ep_in)
}

fn read_response(backend: &mut dyn UsbBackend, ep_in: u8) -> Result<OuterResponse> {
    let mut raw = [0u8; OUTER_RESPONSE_LEN];
    backend.bulk_recv(ep_in, &mut raw)?;
    Ok(OuterResponse::from_bytes(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn ok_response() -> Vec<u8> {
        let mut raw = [0u8; OUTER_RESPONSE_LEN];
        raw[0..4].copy_from_slice(b"AWUS");
        raw.to_vec()
    }

    #[test]
    fn write_emits_awuc_envelope_then_payload() {
        let mut backend = MockBackend::new(0x81, 0x02);
        backend.push_recv(ok_response());

        let resp = write(&mut backend, 0x81, 0x02, &[1, 2, 3, 4]).unwrap();
        assert!(resp.is_valid_magic());

        assert_eq!(backend.send_count(), 2);
        assert_eq!(&backend.sent[0][0..4], b"AWUC");
        assert_eq!(backend.sent[0][15], 12);
        assert_eq!(backend.sent[1], vec![1, 2, 3, 4]);
    }

    #[test]
    fn read_with_empty_buffer_skips_data_phase() {
        let mut backend = MockBackend::new(0x81, 0x02);
        backend.push_recv(ok_response());

        let resp = read(&mut backend, 0x81, 0x02, &mut []).unwrap();
        assert!(resp.is_valid_magic());
        assert_eq!(backend.send_count(), 1);
    }
}
