use std::time::{SystemTime, UNIX_EPOCH};

use hwi_common::bitcoin::bip32::{DerivationPath, Xpub};
use hwi_common::bitcoin::ecdsa::Signature;
use hwi_common::bitcoin::hashes::Hash;
use hwi_common::bitcoin::secp256k1::ecdsa;
use hwi_common::bitcoin::sighash::{EcdsaSighashType, SighashCache};
use hwi_common::bitcoin::sign_message::MessageSignature;
use hwi_common::bitcoin::{NetworkKind, PublicKey, Psbt, TxOut};
use hwi_common::{keys_with_fingerprint, with_network, AddressType, DeviceType, HardwareWallet};

use crate::VendorError;

/// The device signs at most this many hashes per request
pub const MAX_HASHES_PER_REQUEST: usize = 15;

/// A sighash and the derivation of the key that must sign it
pub type SignRequest = ([u8; 32], DerivationPath);

/// The JSON commands of the Digital BitBox used by the adapter.
///
/// Implementors handle the encryption of the channel with the device password.
pub trait BitBoxApi {
    fn xpub(&self, path: &DerivationPath) -> Result<Xpub, VendorError>;

    /// Sign the hashes, in order, the user must confirm on the device
    fn sign(&self, requests: &[SignRequest]) -> Result<Vec<ecdsa::Signature>, VendorError>;

    fn is_initialized(&self) -> Result<bool, VendorError>;

    /// Create a new seed, with a backup named `backup_name` on the microSD card
    fn create_wallet(&self, name: &str, backup_name: &str) -> Result<(), VendorError>;

    fn reset(&self) -> Result<(), VendorError>;

    /// Write a backup of the seed to the microSD card
    fn backup(&self, backup_name: &str) -> Result<(), VendorError>;

    fn close(&self) -> Result<(), VendorError>;
}

pub struct DigitalBitBox {
    client: Box<dyn BitBoxApi>,
    network: NetworkKind,
}

impl std::fmt::Debug for DigitalBitBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalBitBox")
            .field("network", &self.network)
            .finish()
    }
}

impl DigitalBitBox {
    pub fn new(client: Box<dyn BitBoxApi>, network: NetworkKind) -> Self {
        Self { client, network }
    }

    /// The hash each of our keys must sign, with the input index and the key
    fn sighashes(
        &self,
        psbt: &Psbt,
    ) -> Result<Vec<(usize, PublicKey, SignRequest)>, VendorError> {
        let master_fp = self.fingerprint()?;
        let tx = &psbt.unsigned_tx;
        let mut cache = SighashCache::new(tx);
        let invalid = |e: &dyn std::fmt::Display| VendorError::InvalidPsbt(e.to_string());

        let mut result = vec![];
        for (i, input) in psbt.inputs.iter().enumerate() {
            let keys = keys_with_fingerprint(&input.bip32_derivation, master_fp);
            if keys.is_empty() {
                continue;
            }

            let spent: TxOut = match (&input.witness_utxo, &input.non_witness_utxo) {
                (Some(utxo), _) => utxo.clone(),
                (None, Some(prev_tx)) => {
                    let vout = tx.input[i].previous_output.vout as usize;
                    prev_tx.output.get(vout).cloned().ok_or_else(|| {
                        VendorError::InvalidPsbt(format!("input #{i} spends a missing output"))
                    })?
                }
                (None, None) => {
                    return Err(VendorError::InvalidPsbt(format!("input #{i} has no utxo")))
                }
            };

            let wpkh_script = match &input.redeem_script {
                Some(rs) if rs.is_p2wpkh() => Some(rs),
                None if spent.script_pubkey.is_p2wpkh() => Some(&spent.script_pubkey),
                _ => None,
            };

            let hash = if let Some(ws) = &input.witness_script {
                cache
                    .p2wsh_signature_hash(i, ws, spent.value, EcdsaSighashType::All)
                    .map_err(|e| invalid(&e))?
                    .to_byte_array()
            } else if let Some(wpkh) = wpkh_script {
                cache
                    .p2wpkh_signature_hash(i, wpkh, spent.value, EcdsaSighashType::All)
                    .map_err(|e| invalid(&e))?
                    .to_byte_array()
            } else {
                let script_code = input.redeem_script.as_ref().unwrap_or(&spent.script_pubkey);
                cache
                    .legacy_signature_hash(i, script_code, EcdsaSighashType::All.to_u32())
                    .map_err(|e| invalid(&e))?
                    .to_byte_array()
            };

            for (public_key, path) in keys {
                result.push((i, PublicKey::new(public_key), (hash, path)));
            }
        }
        Ok(result)
    }
}

impl HardwareWallet for DigitalBitBox {
    type Error = VendorError;

    fn device_type(&self) -> DeviceType {
        DeviceType::DigitalBitBox
    }

    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Self::Error> {
        Ok(with_network(self.client.xpub(path)?, self.network))
    }

    fn sign_message(
        &self,
        _message: &str,
        _path: &DerivationPath,
    ) -> Result<MessageSignature, Self::Error> {
        Err(VendorError::Unavailable("message signing"))
    }

    fn sign_psbt(&self, psbt: &mut Psbt) -> Result<u32, Self::Error> {
        let to_sign = self.sighashes(psbt)?;

        let mut count = 0;
        for batch in to_sign.chunks(MAX_HASHES_PER_REQUEST) {
            let requests: Vec<SignRequest> = batch.iter().map(|(_, _, r)| r.clone()).collect();
            tracing::info!("Waiting for the user to confirm {} signatures", requests.len());
            let signatures = self.client.sign(&requests)?;
            if signatures.len() != requests.len() {
                return Err(VendorError::Device(format!(
                    "device returned {} signatures for {} hashes",
                    signatures.len(),
                    requests.len()
                )));
            }
            for ((i, public_key, _), sig) in batch.iter().zip(signatures) {
                psbt.inputs[*i]
                    .partial_sigs
                    .insert(*public_key, Signature::sighash_all(sig));
                count += 1;
            }
        }
        Ok(count)
    }

    fn display_address(
        &self,
        _path: &DerivationPath,
        _address_type: AddressType,
    ) -> Result<String, Self::Error> {
        Err(VendorError::Unavailable("displaying addresses"))
    }

    fn setup(&self, label: &str, passphrase: &str) -> Result<(), Self::Error> {
        if passphrase.is_empty() {
            return Err(VendorError::InvalidArgument(
                "The Digital BitBox requires a password to be set up".into(),
            ));
        }
        if self.client.is_initialized()? {
            return Err(VendorError::AlreadyInitialized);
        }
        self.client.create_wallet(label, &backup_name())
    }

    fn wipe(&self) -> Result<(), Self::Error> {
        self.client.reset()
    }

    fn restore(&self, _label: &str) -> Result<(), Self::Error> {
        Err(VendorError::Unavailable("restore"))
    }

    fn backup(&self) -> Result<String, Self::Error> {
        let name = backup_name();
        self.client.backup(&name)?;
        Ok(format!("The backup has been written to the microSD card as {name}"))
    }

    fn close(&self) -> Result<(), Self::Error> {
        self.client.close()
    }
}

fn backup_name() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("backup-{now}.pdf")
}
