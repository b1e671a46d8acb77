//! Windows-only platform-native backend, built on `nusb` — a pure-Rust USB
//! host stack — so a libusb redistributable is not required. Compiled only
//! under `cfg(windows)` and the `platform-native` feature; selecting it at
//! runtime on any other build returns `Error::InvalidParam` (see
//! `backend::resolve`), never a panic.

use futures_lite::future::block_on;
use nusb::transfer::{RequestBuffer, TransferError};

use super::{TRANSPORT_CHUNK_SIZE, UsbBackend};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct NativeBackend {
    device: Option<nusb::Device>,
    interface: Option<nusb::Interface>,
    ep_in: u8,
    ep_out: u8,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn map_transfer_err(err: TransferError) -> Error {
    match err {
        TransferError::Cancelled => Error::Timeout,
        other => {
            log::error!("nusb transfer failed: {other}");
            Error::NotSupport
        }
    }
}

impl UsbBackend for NativeBackend {
    fn scan(&mut self, vendor: u16, product: u16) -> Result<()> {
        let found = nusb::list_devices()
            .map_err(|_| Error::DeviceNotFound { vendor, product })?
            .find(|info| info.vendor_id() == vendor && info.product_id() == product)
            .ok_or(Error::DeviceNotFound { vendor, product })?;

        let device = found.open().map_err(|_| Error::NotSupport)?;
        self.device = Some(device);
        Ok(())
    }

    fn init(&mut self) -> Result<(u8, u8)> {
        let device = self.device.as_ref().ok_or(Error::NotSupport)?;
        let config = device.active_configuration().map_err(|_| Error::NotSupport)?;

        let mut found = None;
        'interfaces: for interface in config.interfaces() {
            for alt in interface.alt_settings() {
                let mut ep_in = None;
                let mut ep_out = None;
                for endpoint in alt.endpoints() {
                    use nusb::descriptors::{EndpointType, TransferDirection};
                    if endpoint.transfer_type() != EndpointType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        TransferDirection::In => ep_in = Some(endpoint.address()),
                        TransferDirection::Out => ep_out = Some(endpoint.address()),
                    }
                }
                if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
                    found = Some((interface.interface_number(), ep_in, ep_out));
                    break 'interfaces;
                }
            }
        }

        let (interface_number, ep_in, ep_out) = found.ok_or(Error::EndpointsNotFound)?;

        let interface = device
            .claim_interface(interface_number)
            .map_err(|_| Error::ClaimInterface(rusb::Error::NotSupported))?;

        self.ep_in = ep_in;
        self.ep_out = ep_out;
        self.interface = Some(interface);

        Ok((ep_in, ep_out))
    }

    fn exit(&mut self) {
        self.interface = None;
        self.device = None;
    }

    fn bulk_send(&mut self, ep: u8, buf: &[u8]) -> Result<()> {
        let interface = self.interface.as_ref().ok_or(Error::NotSupport)?;
        for chunk in buf.chunks(TRANSPORT_CHUNK_SIZE) {
            let completion = block_on(interface.bulk_out(ep, chunk.to_vec()));
            completion.status.map_err(map_transfer_err)?;
        }
        Ok(())
    }

    fn bulk_recv(&mut self, ep: u8, buf: &mut [u8]) -> Result<()> {
        let interface = self.interface.as_ref().ok_or(Error::NotSupport)?;
        let mut received = 0;
        let len = buf.len();
        while received < len {
            let want = (len - received).min(TRANSPORT_CHUNK_SIZE);
            let fut = interface.bulk_in(ep, RequestBuffer::new(want));
            let completion = block_on(fut);
            let data = completion.data;
            completion.status.map_err(map_transfer_err)?;
            buf[received..received + data.len()].copy_from_slice(&data);
            received += data.len();
        }
        Ok(())
    }
}
