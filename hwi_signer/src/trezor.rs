use std::collections::BTreeMap;

use hwi_common::bitcoin::bip32::{DerivationPath, Xpub};
use hwi_common::bitcoin::ecdsa::Signature;
use hwi_common::bitcoin::secp256k1::ecdsa;
use hwi_common::bitcoin::sign_message::MessageSignature;
use hwi_common::bitcoin::{
    Address, Amount, Network, NetworkKind, PublicKey, Psbt, Sequence, Transaction, Txid,
};
use hwi_common::{classify_input, with_network, AddressType, DeviceType, HardwareWallet};

use crate::VendorError;

/// How the device must spend an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputScriptType {
    SpendAddress,
    SpendP2shWitness,
    SpendWitness,
}

impl From<AddressType> for InputScriptType {
    fn from(a: AddressType) -> Self {
        match a {
            AddressType::Legacy => InputScriptType::SpendAddress,
            AddressType::ShWpkh => InputScriptType::SpendP2shWitness,
            AddressType::Wpkh => InputScriptType::SpendWitness,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputScriptType {
    PayToAddress,
    PayToScriptHash,
    PayToWitness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_hash: Txid,
    pub prev_index: u32,
    pub sequence: Sequence,
    pub script_type: InputScriptType,

    /// Derivation of the signing key, `None` if the key belongs to another wallet
    pub address_n: Option<DerivationPath>,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub amount: Amount,
    pub script_type: OutputScriptType,
}

/// A transaction in the shape the firmware streams it
#[derive(Debug, Clone)]
pub struct SignTx {
    pub coin_name: &'static str,
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,

    /// Previous transactions of the inputs, when the PSBT carries them
    pub prev_txs: BTreeMap<Txid, Transaction>,
}

#[derive(Debug, Clone, Default)]
pub struct Features {
    pub vendor: String,
    pub initialized: bool,
    pub label: Option<String>,
}

/// The messages of the Trezor protocol used by the adapter, also spoken by KeepKey firmwares.
///
/// Implementors own the channel to the device, including the PIN and passphrase prompts.
pub trait TrezorApi {
    fn features(&self) -> Result<Features, VendorError>;

    fn get_public_node(&self, path: &DerivationPath, coin_name: &str) -> Result<Xpub, VendorError>;

    fn get_address(
        &self,
        path: &DerivationPath,
        coin_name: &str,
        script_type: InputScriptType,
        show_display: bool,
    ) -> Result<String, VendorError>;

    /// Returns a signature for every input, `None` for the inputs the device didn't sign
    fn sign_tx(&self, tx: &SignTx) -> Result<Vec<Option<ecdsa::Signature>>, VendorError>;

    fn reset_device(&self, label: &str, passphrase_protection: bool) -> Result<(), VendorError>;

    fn recovery_device(&self, label: &str, passphrase_protection: bool)
        -> Result<(), VendorError>;

    fn wipe_device(&self) -> Result<(), VendorError>;

    fn close(&self) -> Result<(), VendorError>;
}

/// Adapter for the Trezor One, and for KeepKey which shares most of the protocol
pub struct Trezor {
    client: Box<dyn TrezorApi>,
    device_type: DeviceType,
    network: NetworkKind,
    password: String,
}

impl std::fmt::Debug for Trezor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trezor")
            .field("device_type", &self.device_type)
            .field("network", &self.network)
            .finish()
    }
}

impl Trezor {
    pub fn new(client: Box<dyn TrezorApi>, network: NetworkKind, password: &str) -> Self {
        Self {
            client,
            device_type: DeviceType::TrezorOne,
            network,
            password: password.to_string(),
        }
    }

    pub fn keepkey(client: Box<dyn TrezorApi>, network: NetworkKind, password: &str) -> Self {
        Self {
            device_type: DeviceType::KeepKey,
            ..Self::new(client, network, password)
        }
    }

    fn coin_name(&self) -> &'static str {
        match self.network {
            NetworkKind::Main => "Bitcoin",
            NetworkKind::Test => "Testnet",
        }
    }

    fn address_network(&self) -> Network {
        match self.network {
            NetworkKind::Main => Network::Bitcoin,
            NetworkKind::Test => Network::Testnet,
        }
    }

    fn is_keepkey(&self) -> bool {
        self.device_type == DeviceType::KeepKey
    }

    /// Convert the PSBT to the firmware format, also returns the inputs our keys sign
    fn sign_tx_request(
        &self,
        psbt: &Psbt,
    ) -> Result<(SignTx, Vec<(usize, PublicKey)>), VendorError> {
        let master_fp = self.fingerprint()?;
        let tx = &psbt.unsigned_tx;

        let mut inputs = vec![];
        let mut prev_txs = BTreeMap::new();
        let mut ours = vec![];
        for (i, (txin, input)) in tx.input.iter().zip(psbt.inputs.iter()).enumerate() {
            let segwit = classify_input(i, tx, input)
                .map_err(VendorError::invalid_psbt)?
                .is_segwit();
            let spent = match (&input.witness_utxo, &input.non_witness_utxo) {
                (Some(utxo), _) => utxo,
                (None, Some(prev_tx)) => prev_tx
                    .output
                    .get(txin.previous_output.vout as usize)
                    .ok_or_else(|| {
                        VendorError::InvalidPsbt(format!("input #{i} spends a missing output"))
                    })?,
                (None, None) => {
                    return Err(VendorError::InvalidPsbt(format!("input #{i} has no utxo")))
                }
            };
            let script_type = match (segwit, spent.script_pubkey.is_p2sh()) {
                (false, _) => InputScriptType::SpendAddress,
                (true, true) => InputScriptType::SpendP2shWitness,
                (true, false) => InputScriptType::SpendWitness,
            };
            let amount = spent.value;
            if let Some(prev_tx) = &input.non_witness_utxo {
                prev_txs.insert(prev_tx.compute_txid(), prev_tx.clone());
            }

            let mut keys = input.bip32_derivation.iter();
            let (pk, (fp, path)) = match (keys.next(), keys.next()) {
                (Some(key), None) => key,
                (None, _) => {
                    return Err(VendorError::InvalidPsbt(
                        "All inputs must have a key for this device".into(),
                    ))
                }
                (Some(_), Some(_)) => {
                    return Err(VendorError::Device("Cannot sign multisig yet".into()))
                }
            };
            let address_n = (*fp == master_fp).then(|| path.clone());
            if address_n.is_some() {
                ours.push((i, PublicKey::new(*pk)));
            }

            inputs.push(TxInput {
                prev_hash: txin.previous_output.txid,
                prev_index: txin.previous_output.vout,
                sequence: txin.sequence,
                script_type,
                address_n,
                amount,
            });
        }

        let mut outputs = vec![];
        for (i, txout) in tx.output.iter().enumerate() {
            let spk = &txout.script_pubkey;
            let script_type = if spk.is_p2sh() {
                OutputScriptType::PayToScriptHash
            } else if spk.is_witness_program() {
                OutputScriptType::PayToWitness
            } else {
                OutputScriptType::PayToAddress
            };
            if self.is_keepkey() && script_type == OutputScriptType::PayToWitness {
                return Err(VendorError::Device(format!(
                    "output #{i} is segwit, KeepKey only pays to p2pkh and p2sh outputs"
                )));
            }
            let address = Address::from_script(spk, self.address_network()).map_err(|_| {
                VendorError::InvalidPsbt(format!("output #{i} has no address representation"))
            })?;
            outputs.push(TxOutput {
                address: address.to_string(),
                amount: txout.value,
                script_type,
            });
        }

        let request = SignTx {
            coin_name: self.coin_name(),
            version: tx.version.0,
            lock_time: tx.lock_time.to_consensus_u32(),
            inputs,
            outputs,
            prev_txs,
        };
        Ok((request, ours))
    }
}

impl HardwareWallet for Trezor {
    type Error = VendorError;

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Self::Error> {
        let xpub = self.client.get_public_node(path, self.coin_name())?;
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
        let (request, ours) = self.sign_tx_request(psbt)?;
        tracing::info!("Waiting for the user to confirm the transaction on the device");
        let signatures = self.client.sign_tx(&request)?;
        if signatures.len() != psbt.inputs.len() {
            return Err(VendorError::Device(format!(
                "device returned {} signatures for {} inputs",
                signatures.len(),
                psbt.inputs.len()
            )));
        }

        let mut count = 0;
        for (i, public_key) in ours {
            if let Some(sig) = signatures[i] {
                psbt.inputs[i]
                    .partial_sigs
                    .insert(public_key, Signature::sighash_all(sig));
                count += 1;
            }
        }
        Ok(count)
    }

    fn display_address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
    ) -> Result<String, Self::Error> {
        if self.is_keepkey() {
            return Err(VendorError::Unavailable("displaying addresses"));
        }
        let script_type = address_type.into();
        self.client
            .get_address(path, self.coin_name(), script_type, true)
    }

    fn setup(&self, label: &str, passphrase: &str) -> Result<(), Self::Error> {
        if self.client.features()?.initialized {
            return Err(VendorError::AlreadyInitialized);
        }
        self.client.reset_device(label, !passphrase.is_empty())
    }

    fn wipe(&self) -> Result<(), Self::Error> {
        self.client.wipe_device()
    }

    fn restore(&self, label: &str) -> Result<(), Self::Error> {
        if self.client.features()?.initialized {
            return Err(VendorError::AlreadyInitialized);
        }
        self.client.recovery_device(label, !self.password.is_empty())
    }

    fn backup(&self) -> Result<String, Self::Error> {
        Err(VendorError::Unavailable("backups"))
    }

    fn close(&self) -> Result<(), Self::Error> {
        self.client.close()
    }
}
