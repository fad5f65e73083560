use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hwi_common::bitcoin::bip32::{DerivationPath, Xpub};
use hwi_common::bitcoin::sign_message::MessageSignature;
use hwi_common::bitcoin::{NetworkKind, Psbt};
use hwi_common::{path_to_string, with_network, AddressType, DeviceType, HardwareWallet};

use crate::VendorError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Address formats understood by the show address command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    Classic,
    P2wpkhP2sh,
    P2wpkh,
}

impl From<AddressType> for AddressFormat {
    fn from(a: AddressType) -> Self {
        match a {
            AddressType::Legacy => AddressFormat::Classic,
            AddressType::ShWpkh => AddressFormat::P2wpkhP2sh,
            AddressType::Wpkh => AddressFormat::P2wpkh,
        }
    }
}

/// The Coldcard USB protocol used by the adapter.
///
/// Paths are strings with `'` marking hardened steps, as the firmware expects them.
pub trait ColdcardApi {
    /// Returns the xpub at path, always with mainnet version bytes
    fn get_xpub(&self, path: &str) -> Result<String, VendorError>;

    /// Upload the serialized PSBT and start the signing flow, the user must approve it on the
    /// device
    fn sign_psbt(&self, psbt: &[u8]) -> Result<(), VendorError>;

    /// The signed PSBT, `None` while the user hasn't approved yet
    fn get_signed_txn(&self) -> Result<Option<Vec<u8>>, VendorError>;

    fn show_address(&self, path: &str, format: AddressFormat) -> Result<String, VendorError>;

    fn start_backup(&self) -> Result<(), VendorError>;

    /// The encrypted backup file, `None` while the device is still preparing it
    fn get_backup_file(&self) -> Result<Option<Vec<u8>>, VendorError>;

    fn close(&self) -> Result<(), VendorError>;
}

pub struct Coldcard {
    client: Box<dyn ColdcardApi>,
    network: NetworkKind,
    backup_dir: PathBuf,
}

impl std::fmt::Debug for Coldcard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coldcard")
            .field("network", &self.network)
            .field("backup_dir", &self.backup_dir)
            .finish()
    }
}

impl Coldcard {
    /// Backups are written in `backup_dir`
    pub fn new(client: Box<dyn ColdcardApi>, network: NetworkKind, backup_dir: PathBuf) -> Self {
        Self {
            client,
            network,
            backup_dir,
        }
    }

    fn poll<T>(
        &self,
        mut f: impl FnMut() -> Result<Option<T>, VendorError>,
    ) -> Result<T, VendorError> {
        loop {
            if let Some(result) = f()? {
                return Ok(result);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl HardwareWallet for Coldcard {
    type Error = VendorError;

    fn device_type(&self) -> DeviceType {
        DeviceType::Coldcard
    }

    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Self::Error> {
        let s = self.client.get_xpub(&path_to_string(path, '\''))?;
        let xpub = Xpub::from_str(&s)
            .map_err(|e| VendorError::Device(format!("device returned an invalid xpub: {e}")))?;
        Ok(with_network(xpub, self.network))
    }

    fn sign_message(
        &self,
        _message: &str,
        _path: &DerivationPath,
    ) -> Result<MessageSignature, Self::Error> {
        Err(VendorError::Unavailable("message signing"))
    }

    fn sign_psbt(&self, psbt: &mut Psbt) -> Result<u32, Self::Error> {
        self.client.sign_psbt(&psbt.serialize())?;

        tracing::info!("Waiting for the user to approve the transaction on the Coldcard");
        let signed = self.poll(|| self.client.get_signed_txn())?;
        let signed = Psbt::deserialize(&signed)
            .map_err(|e| VendorError::Device(format!("device returned an invalid PSBT: {e}")))?;
        if signed.unsigned_tx.compute_txid() != psbt.unsigned_tx.compute_txid() {
            return Err(VendorError::Device("device returned a different transaction".into()));
        }

        let mut count = 0;
        for (input, signed_input) in psbt.inputs.iter_mut().zip(signed.inputs) {
            for (public_key, sig) in signed_input.partial_sigs {
                if input.partial_sigs.insert(public_key, sig) != Some(sig) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn display_address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
    ) -> Result<String, Self::Error> {
        self.client
            .show_address(&path_to_string(path, '\''), address_type.into())
    }

    fn setup(&self, _label: &str, _passphrase: &str) -> Result<(), Self::Error> {
        Err(VendorError::Unavailable("setup"))
    }

    fn wipe(&self) -> Result<(), Self::Error> {
        Err(VendorError::Unavailable("wipe"))
    }

    fn restore(&self, _label: &str) -> Result<(), Self::Error> {
        Err(VendorError::Unavailable("restore"))
    }

    fn backup(&self) -> Result<String, Self::Error> {
        self.client.start_backup()?;
        tracing::info!("Waiting for the Coldcard to prepare the backup");
        let data = self.poll(|| self.client.get_backup_file())?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self.backup_dir.join(format!("backup-{now}.7z"));
        std::fs::write(&path, data)?;
        Ok(format!("The backup has been written to {}", path.display()))
    }

    fn close(&self) -> Result<(), Self::Error> {
        self.client.close()
    }
}
