use hwi_common::{DeviceDescriptor, DeviceType, Error};
use hwi_signer::AnyDevice;

/// Where devices come from: physical devices over HID, emulators, or simulated devices in tests
pub trait Backend {
    /// List the connected devices of the given type.
    ///
    /// This is a lightweight listing, no transport is opened.
    fn probe(&self, device_type: DeviceType) -> Result<Vec<DeviceDescriptor>, Error>;

    /// Open the transport to the described device and wrap it in its adapter
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<AnyDevice, Error>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn probe(&self, device_type: DeviceType) -> Result<Vec<DeviceDescriptor>, Error> {
        (**self).probe(device_type)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<AnyDevice, Error> {
        (**self).open(descriptor)
    }
}
