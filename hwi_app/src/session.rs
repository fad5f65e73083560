use std::cell::Cell;

use hwi_common::{DeviceDescriptor, Error, HardwareWallet};
use hwi_signer::DeviceHandle;

use crate::Backend;

/// An open device, closed exactly once: explicitly with [`Session::close`] or when dropped
#[derive(Debug)]
pub struct Session {
    descriptor: DeviceDescriptor,
    handle: DeviceHandle,
    closed: Cell<bool>,
}

impl Session {
    pub fn open<B: Backend + ?Sized>(
        backend: &B,
        descriptor: DeviceDescriptor,
        allow_untested: bool,
    ) -> Result<Self, Error> {
        tracing::debug!("opening {} at {}", descriptor.device_type, descriptor.path);
        let device = backend.open(&descriptor)?;
        Ok(Self {
            descriptor,
            handle: DeviceHandle::new(device, allow_untested),
            closed: Cell::new(false),
        })
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Release the transport, calling it again has no effect
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.replace(true) {
            return Ok(());
        }
        tracing::debug!(
            "closing {} at {}",
            self.descriptor.device_type,
            self.descriptor.path
        );
        self.handle.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("error closing {}: {e}", self.descriptor.path);
        }
    }
}
