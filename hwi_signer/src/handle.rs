use hwi_common::bitcoin::bip32::{DerivationPath, Fingerprint, Xpub};
use hwi_common::bitcoin::sign_message::MessageSignature;
use hwi_common::bitcoin::Psbt;
use hwi_common::{
    classify_input, AddressType, Capabilities, Capability, DeviceType, Error, HardwareWallet,
    ScriptType,
};

use crate::AnyDevice;

/// An open device paired with its capability set.
///
/// Every operation is checked against the capabilities before any I/O with the device, so that
/// unsupported requests fail fast and never reach the vendor client.
#[derive(Debug)]
pub struct DeviceHandle {
    device: AnyDevice,
    capabilities: Capabilities,
    allow_untested: bool,
}

impl DeviceHandle {
    pub fn new(device: AnyDevice, allow_untested: bool) -> Self {
        let capabilities = Capabilities::of(device.device_type());
        Self {
            device,
            capabilities,
            allow_untested,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The device without checks, for callers that already ran [`Self::check`] or
    /// [`Self::check_psbt`]
    pub fn device(&self) -> &AnyDevice {
        &self.device
    }

    pub fn check(&self, capability: Capability) -> Result<(), Error> {
        self.capabilities.check(capability, self.allow_untested)
    }

    /// Check the device can sign every input of the PSBT, returns the input types
    pub fn check_psbt(&self, psbt: &Psbt) -> Result<Vec<ScriptType>, Error> {
        let script_types = psbt
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| classify_input(i, &psbt.unsigned_tx, input))
            .collect::<Result<Vec<_>, _>>()?;

        for script_type in &script_types {
            self.check(Capability::SignInput(*script_type))?;
        }

        let segwit = script_types.iter().any(ScriptType::is_segwit);
        let legacy = script_types.iter().any(|t| !t.is_segwit());
        if segwit && legacy {
            self.check(Capability::MixedSegwitInputs)?;
        }
        tracing::debug!("inputs of the psbt: {:?}", script_types);
        Ok(script_types)
    }
}

impl HardwareWallet for DeviceHandle {
    type Error = Error;

    fn device_type(&self) -> DeviceType {
        self.capabilities.device_type()
    }

    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Error> {
        self.check(Capability::GetXpub)?;
        self.device.get_extended_pubkey(path)
    }

    fn sign_message(
        &self,
        message: &str,
        path: &DerivationPath,
    ) -> Result<MessageSignature, Error> {
        self.check(Capability::SignMessage)?;
        self.device.sign_message(message, path)
    }

    fn sign_psbt(&self, psbt: &mut Psbt) -> Result<u32, Error> {
        self.check_psbt(psbt)?;
        self.device.sign_psbt(psbt)
    }

    fn display_address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
    ) -> Result<String, Error> {
        self.check(Capability::DisplayAddress)?;
        self.device.display_address(path, address_type)
    }

    fn setup(&self, label: &str, passphrase: &str) -> Result<(), Error> {
        self.check(Capability::Setup)?;
        self.device.setup(label, passphrase)
    }

    fn wipe(&self) -> Result<(), Error> {
        self.check(Capability::Wipe)?;
        self.device.wipe()
    }

    fn restore(&self, label: &str) -> Result<(), Error> {
        self.check(Capability::Restore)?;
        self.device.restore(label)
    }

    fn backup(&self) -> Result<String, Error> {
        self.check(Capability::Backup)?;
        self.device.backup()
    }

    fn close(&self) -> Result<(), Error> {
        self.device.close()
    }

    fn fingerprint(&self) -> Result<Fingerprint, Error> {
        self.check(Capability::GetXpub)?;
        self.device.fingerprint()
    }
}
