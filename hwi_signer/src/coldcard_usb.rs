use std::sync::Mutex;

use coldcard::protocol::{self, DerivationPath};
use hwi_ledger::ledger_transport_hid::hidapi::HidApi;

use crate::coldcard::{AddressFormat, ColdcardApi};
use crate::VendorError;

/// A Coldcard reached over USB through the `coldcard` crate, which encrypts the channel and
/// chunks uploads itself
pub struct ColdcardUsb {
    device: Mutex<Option<coldcard::Coldcard>>,
}

fn device<E: std::fmt::Debug>(e: E) -> VendorError {
    VendorError::Device(format!("{e:?}"))
}

fn path(path: &str) -> Result<DerivationPath, VendorError> {
    DerivationPath::new(path).map_err(|e| VendorError::InvalidArgument(format!("{e:?}")))
}

impl ColdcardUsb {
    /// Open the Coldcard at the HID `path`
    pub fn open_path(api: &HidApi, path: &str) -> Result<Self, VendorError> {
        let serial = api
            .device_list()
            .find(|info| info.path().to_string_lossy() == path)
            .and_then(|info| info.serial_number())
            .ok_or_else(|| VendorError::Transport(format!("no Coldcard at {path}")))?
            .to_string();
        let (device, _) = coldcard::Coldcard::open(api, &serial, None)
            .map_err(|e| VendorError::Transport(format!("{e:?}")))?;
        Ok(Self {
            device: Mutex::new(Some(device)),
        })
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(&mut coldcard::Coldcard) -> Result<T, VendorError>,
    ) -> Result<T, VendorError> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| VendorError::Transport("unable to get lock".into()))?;
        let device = device
            .as_mut()
            .ok_or_else(|| VendorError::Transport("device closed".into()))?;
        f(device)
    }
}

impl ColdcardApi for ColdcardUsb {
    fn get_xpub(&self, p: &str) -> Result<String, VendorError> {
        let p = path(p)?;
        self.with_device(|d| d.xpub(Some(p)).map_err(device))
    }

    fn sign_psbt(&self, psbt: &[u8]) -> Result<(), VendorError> {
        self.with_device(|d| d.sign_psbt(psbt, coldcard::SignMode::Signed).map_err(device))
    }

    fn get_signed_txn(&self) -> Result<Option<Vec<u8>>, VendorError> {
        self.with_device(|d| d.get_signed_tx().map_err(device))
    }

    fn show_address(&self, p: &str, format: AddressFormat) -> Result<String, VendorError> {
        let p = path(p)?;
        let format = match format {
            AddressFormat::Classic => protocol::AddressFormat::P2PKH,
            AddressFormat::P2wpkhP2sh => protocol::AddressFormat::P2WPKH_P2SH,
            AddressFormat::P2wpkh => protocol::AddressFormat::P2WPKH,
        };
        self.with_device(|d| d.address(p, format).map_err(device))
    }

    fn start_backup(&self) -> Result<(), VendorError> {
        self.with_device(|d| d.start_backup().map_err(device))
    }

    fn get_backup_file(&self) -> Result<Option<Vec<u8>>, VendorError> {
        self.with_device(|d| d.get_backup().map_err(device))
    }

    fn close(&self) -> Result<(), VendorError> {
        self.device
            .lock()
            .map_err(|_| VendorError::Transport("unable to get lock".into()))?
            .take();
        Ok(())
    }
}
