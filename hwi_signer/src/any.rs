use hwi_common::bitcoin::bip32::{DerivationPath, Fingerprint, Xpub};
use hwi_common::bitcoin::sign_message::MessageSignature;
use hwi_common::bitcoin::Psbt;
use hwi_common::{AddressType, DeviceType, Error, HardwareWallet};
use hwi_ledger::AnyLedger;

use crate::{Coldcard, DigitalBitBox, Trezor};

/// One of the supported hardware wallets, behind its adapter
#[derive(Debug)]
pub enum AnyDevice {
    Ledger(AnyLedger),
    Trezor(Trezor),
    DigitalBitBox(DigitalBitBox),
    KeepKey(Trezor),
    Coldcard(Coldcard),
}

/// Call the same method on the adapter whatever the variant, converting its error
macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            AnyDevice::Ledger($d) => $call.map_err(Error::from),
            AnyDevice::Trezor($d) | AnyDevice::KeepKey($d) => {
                $call.map_err(|e| e.into_common($d.device_type()))
            }
            AnyDevice::DigitalBitBox($d) => {
                $call.map_err(|e| e.into_common(DeviceType::DigitalBitBox))
            }
            AnyDevice::Coldcard($d) => $call.map_err(|e| e.into_common(DeviceType::Coldcard)),
        }
    };
}

impl HardwareWallet for AnyDevice {
    type Error = Error;

    fn device_type(&self) -> DeviceType {
        match self {
            AnyDevice::Ledger(d) => d.device_type(),
            AnyDevice::Trezor(d) | AnyDevice::KeepKey(d) => d.device_type(),
            AnyDevice::DigitalBitBox(d) => d.device_type(),
            AnyDevice::Coldcard(d) => d.device_type(),
        }
    }

    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Error> {
        dispatch!(self, d => d.get_extended_pubkey(path))
    }

    fn sign_message(
        &self,
        message: &str,
        path: &DerivationPath,
    ) -> Result<MessageSignature, Error> {
        dispatch!(self, d => d.sign_message(message, path))
    }

    fn sign_psbt(&self, psbt: &mut Psbt) -> Result<u32, Error> {
        dispatch!(self, d => d.sign_psbt(psbt))
    }

    fn display_address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
    ) -> Result<String, Error> {
        dispatch!(self, d => d.display_address(path, address_type))
    }

    fn setup(&self, label: &str, passphrase: &str) -> Result<(), Error> {
        dispatch!(self, d => d.setup(label, passphrase))
    }

    fn wipe(&self) -> Result<(), Error> {
        dispatch!(self, d => d.wipe())
    }

    fn restore(&self, label: &str) -> Result<(), Error> {
        dispatch!(self, d => d.restore(label))
    }

    fn backup(&self) -> Result<String, Error> {
        dispatch!(self, d => d.backup())
    }

    fn close(&self) -> Result<(), Error> {
        dispatch!(self, d => d.close())
    }

    fn fingerprint(&self) -> Result<Fingerprint, Error> {
        dispatch!(self, d => d.fingerprint())
    }
}
