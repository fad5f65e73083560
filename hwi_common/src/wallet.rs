use std::fmt;

use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, Xpub};
use bitcoin::sign_message::MessageSignature;
use bitcoin::Psbt;

use crate::DeviceType;

/// The kind of address to show on the device screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressType {
    /// Pay to public key hash
    #[default]
    Legacy,

    /// Pay to witness public key hash nested in pay to script hash
    ShWpkh,

    /// Native segwit pay to witness public key hash
    Wpkh,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressType::Legacy => "legacy",
            AddressType::ShWpkh => "sh-wpkh",
            AddressType::Wpkh => "wpkh",
        };
        write!(f, "{s}")
    }
}

/// The operations every device adapter exposes.
///
/// Adapters don't check what the device supports, that's the job of the caller using
/// [`crate::Capabilities`], an adapter receiving a request its device can't fulfill returns an error.
pub trait HardwareWallet {
    type Error: std::fmt::Debug;

    fn device_type(&self) -> DeviceType;

    /// Derive an xpub from the master, path can contains hardened derivations
    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Self::Error>;

    /// Sign `message` with the key at `path`, the result can be verified with the P2PKH address
    /// of that key
    fn sign_message(
        &self,
        message: &str,
        path: &DerivationPath,
    ) -> Result<MessageSignature, Self::Error>;

    /// Try to sign the given psbt, mutating it in place.
    /// returns how many signatures were added or overwritten
    fn sign_psbt(&self, psbt: &mut Psbt) -> Result<u32, Self::Error>;

    /// Show the address derived at `path` on the device screen and return it
    fn display_address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
    ) -> Result<String, Self::Error>;

    /// Initialize a device without a seed
    fn setup(&self, label: &str, passphrase: &str) -> Result<(), Self::Error>;

    /// Erase the seed from the device
    fn wipe(&self) -> Result<(), Self::Error>;

    /// Initialize the device from an existing mnemonic entered on the device
    fn restore(&self, label: &str) -> Result<(), Self::Error>;

    /// Create a backup of the seed, returns a description of where the backup is
    fn backup(&self) -> Result<String, Self::Error>;

    /// Release the transport, no other call is allowed afterwards
    fn close(&self) -> Result<(), Self::Error>;

    /// Return the fingerprint of the device master key (4 bytes)
    ///
    /// Read as the parent fingerprint of the key at `m/0h`, some devices refuse exporting `m`.
    fn fingerprint(&self) -> Result<Fingerprint, Self::Error> {
        let path = DerivationPath::from(vec![ChildNumber::Hardened { index: 0 }]);
        Ok(self.get_extended_pubkey(&path)?.parent_fingerprint)
    }
}
