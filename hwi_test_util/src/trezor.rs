use std::sync::{Arc, Mutex};

use hwi_common::bitcoin::bip32::{DerivationPath, Xpub};
use hwi_common::bitcoin::hashes::{sha256, Hash, HashEngine};
use hwi_common::bitcoin::secp256k1::ecdsa;
use hwi_common::bitcoin::{Network, NetworkKind};
use hwi_common::AddressType;
use hwi_signer::{Features, InputScriptType, SignTx, TrezorApi, VendorError};

use crate::{Stats, TestSeed};

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    label: Option<String>,
    passphrase_protection: bool,
    last_sign_tx: Option<SignTx>,
}

/// A Trezor One, or a KeepKey, holding a software seed.
///
/// Clones share the device state, keep one to inspect the device after handing it to an adapter.
#[derive(Clone)]
pub struct SimulatedTrezor {
    seed: TestSeed,
    vendor: &'static str,
    stats: Arc<Stats>,
    state: Arc<Mutex<State>>,
}

impl SimulatedTrezor {
    pub fn new(seed: TestSeed, stats: Arc<Stats>) -> Self {
        Self {
            seed,
            vendor: "trezor.io",
            stats,
            state: Arc::new(Mutex::new(State {
                initialized: true,
                label: Some("simulated".into()),
                ..Default::default()
            })),
        }
    }

    pub fn keepkey(seed: TestSeed, stats: Arc<Stats>) -> Self {
        Self {
            vendor: "keepkey.com",
            ..Self::new(seed, stats)
        }
    }

    /// A device without seed, as it comes out of the box
    pub fn uninitialized(self) -> Self {
        *self.state.lock().expect("state") = State::default();
        self
    }

    /// The last transaction received for signing
    pub fn last_sign_tx(&self) -> Option<SignTx> {
        self.state.lock().expect("state").last_sign_tx.clone()
    }

    pub fn passphrase_protection(&self) -> bool {
        self.state.lock().expect("state").passphrase_protection
    }

    fn require_initialized(&self) -> Result<(), VendorError> {
        if self.state.lock().expect("state").initialized {
            Ok(())
        } else {
            Err(VendorError::NotInitialized)
        }
    }
}

fn coin_network(coin_name: &str) -> Result<Network, VendorError> {
    match coin_name {
        "Bitcoin" => Ok(Network::Bitcoin),
        "Testnet" => Ok(Network::Testnet),
        c => Err(VendorError::Device(format!("Unknown coin {c}"))),
    }
}

impl TrezorApi for SimulatedTrezor {
    fn features(&self) -> Result<Features, VendorError> {
        self.stats.call();
        let state = self.state.lock().expect("state");
        Ok(Features {
            vendor: self.vendor.to_string(),
            initialized: state.initialized,
            label: state.label.clone(),
        })
    }

    fn get_public_node(&self, path: &DerivationPath, coin_name: &str) -> Result<Xpub, VendorError> {
        self.stats.call();
        self.require_initialized()?;
        coin_network(coin_name)?;
        Ok(self.seed.xpub(path, NetworkKind::Main))
    }

    fn get_address(
        &self,
        path: &DerivationPath,
        coin_name: &str,
        script_type: InputScriptType,
        _show_display: bool,
    ) -> Result<String, VendorError> {
        self.stats.call();
        self.require_initialized()?;
        let address_type = match script_type {
            InputScriptType::SpendAddress => AddressType::Legacy,
            InputScriptType::SpendP2shWitness => AddressType::ShWpkh,
            InputScriptType::SpendWitness => AddressType::Wpkh,
        };
        let network = coin_network(coin_name)?;
        Ok(self.seed.address(path, address_type, network))
    }

    fn sign_tx(&self, tx: &SignTx) -> Result<Vec<Option<ecdsa::Signature>>, VendorError> {
        self.stats.call();
        self.require_initialized()?;
        let signatures = tx
            .inputs
            .iter()
            .map(|input| {
                input.address_n.as_ref().map(|path| {
                    let mut engine = sha256::Hash::engine();
                    engine.input(input.prev_hash.as_byte_array());
                    engine.input(&input.prev_index.to_le_bytes());
                    let hash = sha256::Hash::from_engine(engine);
                    self.seed.sign_hash(path, hash.to_byte_array())
                })
            })
            .collect();
        self.state.lock().expect("state").last_sign_tx = Some(tx.clone());
        Ok(signatures)
    }

    fn reset_device(&self, label: &str, passphrase_protection: bool) -> Result<(), VendorError> {
        self.stats.call();
        let mut state = self.state.lock().expect("state");
        if state.initialized {
            return Err(VendorError::AlreadyInitialized);
        }
        state.initialized = true;
        state.label = Some(label.to_string());
        state.passphrase_protection = passphrase_protection;
        Ok(())
    }

    fn recovery_device(
        &self,
        label: &str,
        passphrase_protection: bool,
    ) -> Result<(), VendorError> {
        self.reset_device(label, passphrase_protection)
    }

    fn wipe_device(&self) -> Result<(), VendorError> {
        self.stats.call();
        *self.state.lock().expect("state") = State::default();
        Ok(())
    }

    fn close(&self) -> Result<(), VendorError> {
        self.stats.close();
        Ok(())
    }
}
