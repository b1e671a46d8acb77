//! An in-memory `UsbBackend` used by `efex-core`'s unit tests, and by the
//! framing tests below, to exercise the protocol logic without hardware —
//! the same role the original C `test/` directory's `fel_test.c` plays, but
//! run in-process instead of against a physical device.
#![cfg(any(test, feature = "test-support"))]

use std::collections::VecDeque;

use crate::backend::UsbBackend;
use crate::error::{Error, Result};

/// A scripted backend: callers queue up the bytes each `bulk_recv` call
/// should hand back, and every `bulk_send` is recorded so tests can assert
/// on exactly what was written to the wire.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub scanned: bool,
    pub initialized: bool,
    pub ep_in: u8,
    pub ep_out: u8,
    pub sent: Vec<Vec<u8>>,
    recv_queue: VecDeque<Vec<u8>>,
}

impl MockBackend {
    pub fn new(ep_in: u8, ep_out: u8) -> Self {
        Self {
            ep_in,
            ep_out,
            ..Default::default()
        }
    }

    /// Queue bytes to be returned by the next `bulk_recv` call(s). The queue
    /// is drained in FIFO order across as many `bulk_recv` calls as needed
    /// to satisfy the requested length.
    pub fn push_recv(&mut self, bytes: Vec<u8>) {
        self.recv_queue.push_back(bytes);
    }

    pub fn send_count(&self) -> usize {
        self.sent.len()
    }
}

impl UsbBackend for MockBackend {
    fn scan(&mut self, _vendor: u16, _product: u16) -> Result<()> {
        self.scanned = true;
        Ok(())
    }

    fn init(&mut self) -> Result<(u8, u8)> {
        self.initialized = true;
        Ok((self.ep_in, self.ep_out))
    }

    fn exit(&mut self) {
        self.initialized = false;
    }

    fn bulk_send(&mut self, _ep: u8, buf: &[u8]) -> Result<()> {
        self.sent.push(buf.to_vec());
        Ok(())
    }

    fn bulk_recv(&mut self, _ep: u8, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let Some(mut front) = self.recv_queue.pop_front() else {
                return Err(Error::Timeout);
            };
            let take = front.len().min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&front[..take]);
            filled += take;
            if take < front.len() {
                front.drain(0..take);
                self.recv_queue.push_front(front);
            }
        }
        Ok(())
    }
}
