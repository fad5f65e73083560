use hwi_common::{DeviceDescriptor, DeviceType, Error};
use hwi_ledger::AnyLedger;
use hwi_signer::AnyDevice;

use crate::{Backend, Config};

/// Prefix of the path of the Ledger emulator, followed by its address
pub const EMULATOR_PATH_PREFIX: &str = "tcp:";

/// USB vendor and product ids of the supported devices
pub const USB_IDS: [(DeviceType, u16, u16); 5] = [
    (
        DeviceType::LedgerNanoS,
        hwi_ledger::LEDGER_VENDOR_ID,
        hwi_ledger::LEDGER_DEVICE_ID,
    ),
    (DeviceType::TrezorOne, 0x534c, 0x0001),
    (DeviceType::DigitalBitBox, 0x03eb, 0x2402),
    (DeviceType::KeepKey, 0x2b24, 0x0001),
    (DeviceType::Coldcard, 0xd13e, 0xcc10),
];

/// Usage page of the Ledger interface carrying APDUs, on platforms not reporting interfaces
const LEDGER_USAGE_PAGE: u16 = 0xffa0;

/// The devices connected to this machine, plus the Ledger emulator if configured
#[derive(Debug, Clone)]
pub struct HidBackend {
    config: Config,
}

impl HidBackend {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn emulator(&self) -> Option<DeviceDescriptor> {
        self.config.ledger_emulator.as_ref().map(|addr| {
            DeviceDescriptor::new(
                DeviceType::LedgerNanoS,
                format!("{EMULATOR_PATH_PREFIX}{addr}"),
            )
        })
    }

    #[cfg(feature = "hid")]
    fn probe_usb(&self, device_type: DeviceType) -> Result<Vec<DeviceDescriptor>, Error> {
        use hwi_ledger::ledger_transport_hid::hidapi::HidApi;

        let (_, vendor_id, product_id) = USB_IDS
            .iter()
            .find(|(t, _, _)| *t == device_type)
            .copied()
            .ok_or_else(|| Error::Connection(format!("no USB ids for {device_type}")))?;

        if device_type == DeviceType::TrezorOne {
            let found = hwi_signer::TrezorUsb::list()
                .into_iter()
                .map(|path| DeviceDescriptor::new(device_type, path))
                .collect();
            return Ok(found);
        }

        let api = HidApi::new().map_err(|e| Error::Connection(e.to_string()))?;
        let mut found = vec![];
        for info in api.device_list() {
            if info.vendor_id() != vendor_id || info.product_id() != product_id {
                continue;
            }
            if device_type == DeviceType::LedgerNanoS
                && info.interface_number() != 0
                && info.usage_page() != LEDGER_USAGE_PAGE
            {
                continue;
            }
            let path = info.path().to_string_lossy().to_string();
            found.push(DeviceDescriptor::new(device_type, path));
        }
        Ok(found)
    }

    #[cfg(not(feature = "hid"))]
    fn probe_usb(&self, device_type: DeviceType) -> Result<Vec<DeviceDescriptor>, Error> {
        match device_type {
            // the emulator is still reachable
            DeviceType::LedgerNanoS => Ok(vec![]),
            _ => Err(Error::Connection(format!(
                "cannot list {device_type} devices, built without the hid feature"
            ))),
        }
    }

    #[cfg(feature = "hid")]
    fn open_ledger(&self, path: &str) -> Result<AnyLedger, Error> {
        use hwi_ledger::ledger_transport_hid::hidapi::HidApi;

        let api = HidApi::new().map_err(|e| Error::Connection(e.to_string()))?;
        let transport = hwi_ledger::TransportHID::open_path(&api, path)
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(hwi_ledger::Ledger::new(Box::new(transport), self.config.network))
    }

    #[cfg(not(feature = "hid"))]
    fn open_ledger(&self, path: &str) -> Result<AnyLedger, Error> {
        Err(Error::Connection(format!("cannot open {path}, built without the hid feature")))
    }

    #[cfg(feature = "hid")]
    fn open_usb(&self, descriptor: &DeviceDescriptor) -> Result<AnyDevice, Error> {
        use hwi_ledger::ledger_transport_hid::hidapi::HidApi;
        use hwi_signer::{Coldcard, ColdcardUsb, Trezor, TrezorUsb};

        let device_type = descriptor.device_type;
        let path = &descriptor.path;
        let common = |e: hwi_signer::VendorError| e.into_common(device_type);
        match device_type {
            DeviceType::TrezorOne => {
                let client = TrezorUsb::open(path, &self.config.password).map_err(common)?;
                Ok(AnyDevice::Trezor(Trezor::new(
                    Box::new(client),
                    self.config.network,
                    &self.config.password,
                )))
            }
            DeviceType::Coldcard => {
                let api = HidApi::new().map_err(|e| Error::Connection(e.to_string()))?;
                let client = ColdcardUsb::open_path(&api, path).map_err(common)?;
                Ok(AnyDevice::Coldcard(Coldcard::new(
                    Box::new(client),
                    self.config.network,
                    self.config.backup_dir.clone(),
                )))
            }
            _ => Err(unsupported(descriptor)),
        }
    }

    #[cfg(not(feature = "hid"))]
    fn open_usb(&self, descriptor: &DeviceDescriptor) -> Result<AnyDevice, Error> {
        Err(Error::Connection(format!(
            "cannot open {}, built without the hid feature",
            descriptor.path
        )))
    }
}

/// KeepKey and Digital BitBox are listed but have no USB client
#[cfg_attr(not(feature = "hid"), allow(dead_code))]
fn unsupported(descriptor: &DeviceDescriptor) -> Error {
    Error::Connection(format!(
        "no {} USB client available to open {}",
        descriptor.device_type, descriptor.path
    ))
}

impl Backend for HidBackend {
    fn probe(&self, device_type: DeviceType) -> Result<Vec<DeviceDescriptor>, Error> {
        let mut found = self.probe_usb(device_type)?;
        if device_type == DeviceType::LedgerNanoS {
            found.extend(self.emulator());
        }
        tracing::debug!("probed {device_type}: {} devices", found.len());
        Ok(found)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<AnyDevice, Error> {
        match descriptor.device_type {
            DeviceType::LedgerNanoS => {
                let ledger = match descriptor.path.strip_prefix(EMULATOR_PATH_PREFIX) {
                    Some(addr) => AnyLedger::emulator(addr, self.config.network)?,
                    None => self.open_ledger(&descriptor.path)?,
                };
                Ok(AnyDevice::Ledger(ledger))
            }
            DeviceType::KeepKey | DeviceType::DigitalBitBox => Err(unsupported(descriptor)),
            DeviceType::TrezorOne | DeviceType::Coldcard => self.open_usb(descriptor),
        }
    }
}
