use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType};

use super::{DEFAULT_TIMEOUT, TRANSPORT_CHUNK_SIZE, UsbBackend};
use crate::error::{Error, Result};

/// The libusb-equivalent backend, built on `rusb`.
///
/// Claims the device the same way a mass-storage-class bulk channel would —
/// open, claim interface, walk endpoint descriptors, recover from a stalled
/// endpoint with `clear_halt` — minus the mass-storage class-code filter:
/// the EFEX device exposes a single vendor-specific interface, not a
/// standard MSC one.
#[derive(Debug, Default)]
pub struct RusbBackend {
    device: Option<Device<GlobalContext>>,
    handle: Option<DeviceHandle<GlobalContext>>,
    interface_number: u8,
    ep_in: u8,
    ep_out: u8,
}

impl RusbBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<GlobalContext>> {
        self.handle.as_mut().ok_or(Error::NotSupport)
    }
}

impl UsbBackend for RusbBackend {
    fn scan(&mut self, vendor: u16, product: u16) -> Result<()> {
        let devices = rusb::devices().map_err(Error::Transfer)?;

        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            if desc.vendor_id() == vendor && desc.product_id() == product {
                log::info!(
                    "found efex device {:04x}:{:04x} on bus {} address {}",
                    vendor,
                    product,
                    device.bus_number(),
                    device.address()
                );
                self.device = Some(device);
                return Ok(());
            }
        }

        Err(Error::DeviceNotFound { vendor, product })
    }

    fn init(&mut self) -> Result<(u8, u8)> {
        let device = self.device.as_ref().ok_or(Error::NotSupport)?;

        let handle = device.open().map_err(|err| {
            if err == rusb::Error::Access {
                log::error!("insufficient permissions to open efex usb device");
            }
            Error::Open(err)
        })?;

        handle.set_auto_detach_kernel_driver(true).ok();

        let config = device.active_config_descriptor().map_err(Error::Transfer)?;
        handle.set_active_configuration(config.number()).ok();

        let mut found = None;
        'interfaces: for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                let mut ep_in = None;
                let mut ep_out = None;
                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => ep_in = Some(endpoint.address()),
                        Direction::Out => ep_out = Some(endpoint.address()),
                    }
                }
                if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
                    found = Some((descriptor.interface_number(), ep_in, ep_out));
                    break 'interfaces;
                }
            }
        }

        let (interface_number, ep_in, ep_out) = found.ok_or(Error::EndpointsNotFound)?;

        handle
            .claim_interface(interface_number)
            .map_err(|err| {
                if err == rusb::Error::NotSupported {
                    log::error!(
                        "interface not supported; on windows, installing a generic usb driver (e.g. Zadig) usually resolves this"
                    );
                }
                Error::ClaimInterface(err)
            })?;
        handle.set_alternate_setting(interface_number, 0).ok();
        handle.clear_halt(ep_in).ok();
        handle.clear_halt(ep_out).ok();

        self.interface_number = interface_number;
        self.ep_in = ep_in;
        self.ep_out = ep_out;
        self.handle = Some(handle);

        Ok((ep_in, ep_out))
    }

    fn exit(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.release_interface(self.interface_number);
        }
        self.device = None;
    }

    fn bulk_send(&mut self, ep: u8, buf: &[u8]) -> Result<()> {
        #[cfg(feature = "trace-io")]
        crate::trace::dump("bulk_send", buf);

        let handle = self.handle_mut()?;
        for chunk in buf.chunks(TRANSPORT_CHUNK_SIZE) {
            let mut sent = 0;
            while sent < chunk.len() {
                match handle.write_bulk(ep, &chunk[sent..], DEFAULT_TIMEOUT) {
                    Ok(n) => sent += n,
                    Err(rusb::Error::Pipe) => {
                        log::warn!("bulk out endpoint {:#04x} stalled, clearing halt", ep);
                        handle.clear_halt(ep).map_err(Error::Transfer)?;
                    }
                    Err(rusb::Error::Timeout) => return Err(Error::Timeout),
                    Err(err) => return Err(Error::Transfer(err)),
                }
            }
        }
        Ok(())
    }

    fn bulk_recv(&mut self, ep: u8, buf: &mut [u8]) -> Result<()> {
        let handle = self.handle_mut()?;
        let len = buf.len();
        let mut received = 0;
        while received < len {
            let end = (received + TRANSPORT_CHUNK_SIZE).min(len);
            match handle.read_bulk(ep, &mut buf[received..end], DEFAULT_TIMEOUT) {
                Ok(n) => received += n,
                Err(rusb::Error::Pipe) => {
                    log::warn!("bulk in endpoint {:#04x} stalled, clearing halt", ep);
                    handle.clear_halt(ep).map_err(Error::Transfer)?;
                }
                Err(rusb::Error::Timeout) => return Err(Error::Timeout),
                Err(err) => return Err(Error::Transfer(err)),
            }
        }

        #[cfg(feature = "trace-io")]
        crate::trace::dump("bulk_recv", buf);

        Ok(())
    }
}

impl Drop for RusbBackend {
    fn drop(&mut self) {
        self.exit();
    }
}
