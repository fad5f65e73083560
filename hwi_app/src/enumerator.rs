use hwi_common::bitcoin::bip32::Fingerprint;
use hwi_common::{DeviceDescriptor, DeviceType, Error, HardwareWallet};

use crate::{Backend, Session};

/// What probing a device type produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probed {
    Device(DeviceDescriptor),

    /// Probing a vendor failed, other vendors are still probed
    Diagnostic {
        device_type: DeviceType,
        error: String,
    },
}

/// Lists the devices reachable through a backend, probing live state on every call
pub struct Enumerator<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> Enumerator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Probe every vendor lazily, in [`DeviceType::ALL`] order
    pub fn enumerate(&self) -> impl Iterator<Item = Probed> + 'a {
        let backend = self.backend;
        DeviceType::ALL
            .into_iter()
            .flat_map(move |device_type| match backend.probe(device_type) {
                Ok(found) => found.into_iter().map(Probed::Device).collect::<Vec<_>>(),
                Err(e) => vec![Probed::Diagnostic {
                    device_type,
                    error: e.to_string(),
                }],
            })
    }

    /// The found devices, diagnostics are logged
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.enumerate()
            .filter_map(|probed| match probed {
                Probed::Device(d) => Some(d),
                Probed::Diagnostic { device_type, error } => {
                    tracing::warn!("cannot enumerate {device_type} devices: {error}");
                    None
                }
            })
            .collect()
    }

    /// The found devices, each one opened briefly to read its master fingerprint
    pub fn devices_with_fingerprint(&self, allow_untested: bool) -> Vec<DeviceDescriptor> {
        self.devices()
            .into_iter()
            .map(|descriptor| self.with_fingerprint(descriptor, allow_untested))
            .collect()
    }

    fn with_fingerprint(
        &self,
        mut descriptor: DeviceDescriptor,
        allow_untested: bool,
    ) -> DeviceDescriptor {
        let fingerprint = Session::open(self.backend, descriptor.clone(), allow_untested)
            .and_then(|session| {
                let fingerprint = session.handle().fingerprint();
                session.close()?;
                fingerprint
            });
        match fingerprint {
            Ok(fingerprint) => descriptor.fingerprint = Some(fingerprint),
            Err(e) => {
                descriptor.error = Some(format!(
                    "Could not open client or get fingerprint information: {e}"
                ))
            }
        }
        descriptor
    }

    /// The single device of the given type at the given path, without opening any device
    pub fn find(&self, device_type: DeviceType, path: &str) -> Result<DeviceDescriptor, Error> {
        let target = format!("{device_type} at {path}");
        let found: Vec<_> = self
            .backend
            .probe(device_type)?
            .into_iter()
            .filter(|d| d.matches(device_type, path))
            .collect();
        single(found, target)
    }

    /// The single device having the given master fingerprint
    pub fn find_by_fingerprint(
        &self,
        fingerprint: Fingerprint,
        allow_untested: bool,
    ) -> Result<DeviceDescriptor, Error> {
        let found: Vec<_> = self
            .devices_with_fingerprint(allow_untested)
            .into_iter()
            .filter(|d| d.fingerprint == Some(fingerprint))
            .collect();
        single(found, format!("fingerprint {fingerprint}"))
    }
}

fn single(mut found: Vec<DeviceDescriptor>, target: String) -> Result<DeviceDescriptor, Error> {
    match found.len() {
        0 => Err(Error::DeviceNotFound(target)),
        1 => Ok(found.remove(0)),
        count => Err(Error::AmbiguousDevice { target, count }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single() {
        let d = DeviceDescriptor::new(DeviceType::TrezorOne, "a");
        assert!(matches!(
            single(vec![], "x".into()),
            Err(Error::DeviceNotFound(_))
        ));
        assert_eq!(single(vec![d.clone()], "x".into()).unwrap(), d);
        assert!(matches!(
            single(vec![d.clone(), d], "x".into()),
            Err(Error::AmbiguousDevice { count: 2, .. })
        ));
    }
}
