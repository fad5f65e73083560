use std::sync::{Arc, Mutex};

use hwi_common::bitcoin::bip32::{DerivationPath, Xpub};
use hwi_common::bitcoin::secp256k1::ecdsa;
use hwi_common::bitcoin::NetworkKind;
use hwi_signer::{BitBoxApi, SignRequest, VendorError, MAX_HASHES_PER_REQUEST};

use crate::{Stats, TestSeed};

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    name: Option<String>,
    backups: Vec<String>,
    signed: Vec<SignRequest>,
}

/// A Digital BitBox holding a software seed, it signs exactly the hashes it receives.
///
/// Clones share the device state.
#[derive(Clone)]
pub struct SimulatedBitBox {
    seed: TestSeed,
    stats: Arc<Stats>,
    state: Arc<Mutex<State>>,
}

impl SimulatedBitBox {
    pub fn new(seed: TestSeed, stats: Arc<Stats>) -> Self {
        Self {
            seed,
            stats,
            state: Arc::new(Mutex::new(State {
                initialized: true,
                ..Default::default()
            })),
        }
    }

    pub fn uninitialized(self) -> Self {
        *self.state.lock().expect("state") = State::default();
        self
    }

    /// Name of the backups written to the microSD card
    pub fn backups(&self) -> Vec<String> {
        self.state.lock().expect("state").backups.clone()
    }

    /// Every hash signed so far, with the derivation of the key
    pub fn signed(&self) -> Vec<SignRequest> {
        self.state.lock().expect("state").signed.clone()
    }
}

impl BitBoxApi for SimulatedBitBox {
    fn xpub(&self, path: &DerivationPath) -> Result<Xpub, VendorError> {
        self.stats.call();
        if !self.state.lock().expect("state").initialized {
            return Err(VendorError::NotInitialized);
        }
        Ok(self.seed.xpub(path, NetworkKind::Main))
    }

    fn sign(&self, requests: &[SignRequest]) -> Result<Vec<ecdsa::Signature>, VendorError> {
        self.stats.call();
        if requests.len() > MAX_HASHES_PER_REQUEST {
            return Err(VendorError::Device(format!(
                "cannot sign {} hashes at once",
                requests.len()
            )));
        }
        let signatures = requests
            .iter()
            .map(|(hash, path)| self.seed.sign_hash(path, *hash))
            .collect();
        self.state
            .lock()
            .expect("state")
            .signed
            .extend(requests.iter().cloned());
        Ok(signatures)
    }

    fn is_initialized(&self) -> Result<bool, VendorError> {
        self.stats.call();
        Ok(self.state.lock().expect("state").initialized)
    }

    fn create_wallet(&self, name: &str, backup_name: &str) -> Result<(), VendorError> {
        self.stats.call();
        let mut state = self.state.lock().expect("state");
        state.initialized = true;
        state.name = Some(name.to_string());
        state.backups.push(backup_name.to_string());
        Ok(())
    }

    fn reset(&self) -> Result<(), VendorError> {
        self.stats.call();
        *self.state.lock().expect("state") = State::default();
        Ok(())
    }

    fn backup(&self, backup_name: &str) -> Result<(), VendorError> {
        self.stats.call();
        let mut state = self.state.lock().expect("state");
        if !state.initialized {
            return Err(VendorError::NotInitialized);
        }
        state.backups.push(backup_name.to_string());
        Ok(())
    }

    fn close(&self) -> Result<(), VendorError> {
        self.stats.close();
        Ok(())
    }
}
