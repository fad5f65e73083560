use std::str::FromStr;
use std::sync::{Arc, Mutex};

use hwi_common::bitcoin::bip32::DerivationPath;
use hwi_common::bitcoin::ecdsa::Signature;
use hwi_common::bitcoin::hashes::{sha256, Hash};
use hwi_common::bitcoin::{Network, NetworkKind, PublicKey, Psbt};
use hwi_common::{keys_with_fingerprint, AddressType};
use hwi_signer::{AddressFormat, ColdcardApi, VendorError};

use crate::{Stats, TestSeed};

/// Bytes starting every 7z archive
pub const BACKUP_MAGIC: [u8; 6] = [b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c];

#[derive(Debug, Default)]
struct State {
    signed: Option<Vec<u8>>,
    backup: Option<Vec<u8>>,

    /// Polls answered with "not ready" before the result is returned
    pending_polls: u32,
}

/// A Coldcard holding a software seed, the user approves every request after one poll.
///
/// Clones share the device state.
#[derive(Clone)]
pub struct SimulatedColdcard {
    seed: TestSeed,
    network: Network,
    stats: Arc<Stats>,
    state: Arc<Mutex<State>>,
}

impl SimulatedColdcard {
    pub fn new(seed: TestSeed, network: Network, stats: Arc<Stats>) -> Self {
        Self {
            seed,
            network,
            stats,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn parse_path(path: &str) -> Result<DerivationPath, VendorError> {
        DerivationPath::from_str(path).map_err(|e| VendorError::Device(e.to_string()))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, VendorError> {
        let mut psbt =
            Psbt::deserialize(data).map_err(|e| VendorError::InvalidPsbt(e.to_string()))?;
        let fingerprint = self.seed.fingerprint();
        for (i, input) in psbt.inputs.iter_mut().enumerate() {
            for (pk, path) in keys_with_fingerprint(&input.bip32_derivation, fingerprint) {
                let mut preimage = pk.serialize().to_vec();
                preimage.extend((i as u32).to_le_bytes());
                let hash = sha256::Hash::hash(&preimage).to_byte_array();
                let sig = self.seed.sign_hash(&path, hash);
                input
                    .partial_sigs
                    .insert(PublicKey::new(pk), Signature::sighash_all(sig));
            }
        }
        Ok(psbt.serialize())
    }

    fn poll(&self, take: impl FnOnce(&mut State) -> Option<Vec<u8>>) -> Option<Vec<u8>> {
        let mut state = self.state.lock().expect("state");
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return None;
        }
        take(&mut state)
    }
}

impl ColdcardApi for SimulatedColdcard {
    fn get_xpub(&self, path: &str) -> Result<String, VendorError> {
        self.stats.call();
        let path = Self::parse_path(path)?;
        Ok(self.seed.xpub(&path, NetworkKind::Main).to_string())
    }

    fn sign_psbt(&self, psbt: &[u8]) -> Result<(), VendorError> {
        self.stats.call();
        let signed = self.sign(psbt)?;
        let mut state = self.state.lock().expect("state");
        state.signed = Some(signed);
        state.pending_polls = 1;
        Ok(())
    }

    fn get_signed_txn(&self) -> Result<Option<Vec<u8>>, VendorError> {
        self.stats.call();
        Ok(self.poll(|state| state.signed.take()))
    }

    fn show_address(&self, path: &str, format: AddressFormat) -> Result<String, VendorError> {
        self.stats.call();
        let path = Self::parse_path(path)?;
        let address_type = match format {
            AddressFormat::Classic => AddressType::Legacy,
            AddressFormat::P2wpkhP2sh => AddressType::ShWpkh,
            AddressFormat::P2wpkh => AddressType::Wpkh,
        };
        Ok(self.seed.address(&path, address_type, self.network))
    }

    fn start_backup(&self) -> Result<(), VendorError> {
        self.stats.call();
        let mut backup = BACKUP_MAGIC.to_vec();
        backup.extend(self.seed.fingerprint().to_bytes());
        let mut state = self.state.lock().expect("state");
        state.backup = Some(backup);
        state.pending_polls = 1;
        Ok(())
    }

    fn get_backup_file(&self) -> Result<Option<Vec<u8>>, VendorError> {
        self.stats.call();
        Ok(self.poll(|state| state.backup.take()))
    }

    fn close(&self) -> Result<(), VendorError> {
        self.stats.close();
        Ok(())
    }
}
