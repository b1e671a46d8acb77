//! FEL (First-stage External Loader) operations: exec, chunked read/write.
//! Gated to `ctx.mode == FEL`; any other mode fails with
//! `Error::InvalidDeviceMode` before any USB I/O is attempted.

use crate::consts::FEL_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::request::{self, CMD_FEL_EXEC, CMD_FEL_READ, CMD_FEL_WRITE};
use crate::session::{DeviceMode, Session};
use crate::{NoProgress, ProgressReporter};

/// Execute at `addr`. The device runs the code there and returns control to
/// its USB loop before responding; `exec` only observes that handoff, not
/// anything the executed code itself does.
pub fn exec(session: &mut Session, addr: u32) -> Result<()> {
    session.require_mode(DeviceMode::Fel)?;
    request::send_request(session, CMD_FEL_EXEC, addr, 0, 0)?;
    request::read_status(session)?;
    Ok(())
}

/// Read `len` bytes from `addr` into `buf`, chunked at `FEL_CHUNK_SIZE`. The
/// loop is strictly serial: a chunk's status must be read successfully
/// before the next chunk is requested.
pub fn read(session: &mut Session, addr: u32, buf: &mut [u8]) -> Result<()> {
    read_with_progress(session, addr, buf, &mut NoProgress)
}

pub fn read_with_progress(
    session: &mut Session,
    addr: u32,
    buf: &mut [u8],
    progress: &mut dyn ProgressReporter,
) -> Result<()> {
    session.require_mode(DeviceMode::Fel)?;
    if buf.is_empty() {
        return Err(Error::InvalidParam);
    }

    progress.start(buf.len());
    let mut offset = 0usize;
    let mut addr = addr;
    while offset < buf.len() {
        let n = (buf.len() - offset).min(FEL_CHUNK_SIZE);
        request::send_request(session, CMD_FEL_READ, addr, n as u32, 0)?;

        let (ep_in, ep_out) = session.endpoints();
        efex_usb::transport::read(
            session.backend_mut(),
            ep_in,
            ep_out,
            &mut buf[offset..offset + n],
        )?;
        request::read_status(session)?;

        offset += n;
        addr = addr.wrapping_add(n as u32);
        progress.advance(n);
    }
    progress.finish();
    Ok(())
}

/// Write `buf` to `addr`, chunked at `FEL_CHUNK_SIZE`, same serial ordering
/// as `read`.
pub fn write(session: &mut Session, addr: u32, buf: &[u8]) -> Result<()> {
    write_with_progress(session, addr, buf, &mut NoProgress)
}

pub fn write_with_progress(
    session: &mut Session,
    addr: u32,
    buf: &[u8],
    progress: &mut dyn ProgressReporter,
) -> Result<()> {
    session.require_mode(DeviceMode::Fel)?;
    if buf.is_empty() {
        return Err(Error::InvalidParam);
    }

    progress.start(buf.len());
    let mut offset = 0usize;
    let mut addr = addr;
    while offset < buf.len() {
        let n = (buf.len() - offset).min(FEL_CHUNK_SIZE);
        request::send_request(session, CMD_FEL_WRITE, addr, n as u32, 0)?;

        let (ep_in, ep_out) = session.endpoints();
        efex_usb::transport::write(session.backend_mut(), ep_in, ep_out, &buf[offset..offset + n])?;
        request::read_status(session)?;

        offset += n;
        addr = addr.wrapping_add(n as u32);
        progress.advance(n);
    }
    progress.finish();
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

    fn ok_inner_status() -> Vec<u8> {
        let mut raw = [0u8; request::INNER_RESPONSE_LEN];
        raw[0..2].copy_from_slice(&request::INNER_RESPONSE_MAGIC.to_le_bytes());
        raw.to_vec()
    }

    #[test]
    fn read_rejects_wrong_mode_without_any_io() {
        let backend = MockBackend::new(0x81, 0x02);
        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        session.set_mode_for_test(DeviceMode::Srv);

        let mut buf = [0u8; 16];
        let err = read(&mut session, 0x1000, &mut buf).unwrap_err();
        assert!(matches!(err, Error::InvalidDeviceMode(DeviceMode::Fel)));
    }

    #[test]
    fn zero_length_read_is_invalid_param() {
        let backend = MockBackend::new(0x81, 0x02);
        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        session.set_mode_for_test(DeviceMode::Fel);

        let err = read(&mut session, 0x1000, &mut []).unwrap_err();
        assert!(matches!(err, Error::InvalidParam));
    }

    #[test]
    fn write_then_read_round_trips_across_a_chunk_boundary() {
        let chunk = FEL_CHUNK_SIZE;
        let len = chunk + 17;
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();

        let mut backend = MockBackend::new(0x81, 0x02);
        // write: outer response per chunk, then inner status per chunk (2 chunks)
        for _ in 0..2 {
            backend.push_recv(ok_outer());
            backend.push_recv(ok_inner_status());
            backend.push_recv(ok_outer());
        }
        // read: per chunk, the outer response that follows the data phase,
        // the data itself, then the inner status
        for c in data.chunks(chunk) {
            backend.push_recv(ok_outer());
            backend.push_recv(c.to_vec());
            backend.push_recv(ok_outer());
            backend.push_recv(ok_inner_status());
            backend.push_recv(ok_outer());
        }

        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        session.set_mode_for_test(DeviceMode::Fel);

        write(&mut session, 0x4000_0000, &data).unwrap();

        let mut readback = vec![0u8; len];
        read(&mut session, 0x4000_0000, &mut readback).unwrap();
        assert_eq!(readback, data);
    }
}
