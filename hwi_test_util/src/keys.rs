use std::str::FromStr;

use hwi_common::bitcoin::bip32::{DerivationPath, Fingerprint, Xpriv, Xpub};
use hwi_common::bitcoin::secp256k1::{ecdsa, All, Message, PublicKey, Secp256k1, SecretKey};
use hwi_common::bitcoin::{Address, CompressedPublicKey, Network, NetworkKind};
use hwi_common::AddressType;

/// A software HD wallet playing the role of the seed stored in a device
#[derive(Debug, Clone)]
pub struct TestSeed {
    master: Xpriv,
    secp: Secp256k1<All>,
}

impl TestSeed {
    pub fn new(mnemonic: &str) -> Self {
        let mnemonic = bip39::Mnemonic::from_str(mnemonic).expect("test mnemonic");
        let seed = mnemonic.to_seed("");
        let master = Xpriv::new_master(NetworkKind::Test, &seed).expect("test seed");
        Self {
            master,
            secp: Secp256k1::new(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.master.fingerprint(&self.secp)
    }

    pub fn xpriv(&self, path: &DerivationPath) -> Xpriv {
        self.master.derive_priv(&self.secp, path).expect("derivation")
    }

    /// Xpub with the version bytes of the given network
    pub fn xpub(&self, path: &DerivationPath, network: NetworkKind) -> Xpub {
        let xpub = Xpub::from_priv(&self.secp, &self.xpriv(path));
        Xpub { network, ..xpub }
    }

    pub fn secret_key(&self, path: &DerivationPath) -> SecretKey {
        self.xpriv(path).private_key
    }

    pub fn public_key(&self, path: &DerivationPath) -> PublicKey {
        self.secret_key(path).public_key(&self.secp)
    }

    pub fn sign_hash(&self, path: &DerivationPath, hash: [u8; 32]) -> ecdsa::Signature {
        let message = Message::from_digest(hash);
        self.secp.sign_ecdsa(&message, &self.secret_key(path))
    }

    pub fn sign_recoverable(
        &self,
        path: &DerivationPath,
        hash: [u8; 32],
    ) -> ecdsa::RecoverableSignature {
        let message = Message::from_digest(hash);
        self.secp.sign_ecdsa_recoverable(&message, &self.secret_key(path))
    }

    pub fn verify(&self, path: &DerivationPath, hash: [u8; 32], sig: &ecdsa::Signature) -> bool {
        let message = Message::from_digest(hash);
        self.secp
            .verify_ecdsa(&message, sig, &self.public_key(path))
            .is_ok()
    }

    /// The address of the key at `path`
    pub fn address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
        network: Network,
    ) -> String {
        let pk = CompressedPublicKey(self.public_key(path));
        match address_type {
            AddressType::Legacy => Address::p2pkh(pk, network),
            AddressType::ShWpkh => Address::p2shwpkh(&pk, network),
            AddressType::Wpkh => Address::p2wpkh(&pk, network),
        }
        .to_string()
    }
}

impl Default for TestSeed {
    fn default() -> Self {
        Self::new(crate::TEST_MNEMONIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{TEST_MNEMONIC_FINGERPRINT, TEST_MNEMONIC_XPUB};

    #[test]
    fn test_seed() {
        let seed = TestSeed::default();
        assert_eq!(seed.fingerprint().to_string(), TEST_MNEMONIC_FINGERPRINT);
        assert_eq!(
            seed.xpub(&DerivationPath::master(), NetworkKind::Test).to_string(),
            TEST_MNEMONIC_XPUB
        );

        let path = DerivationPath::from_str("m/84h/1h/0h/0/0").unwrap();
        let sig = seed.sign_hash(&path, [7; 32]);
        assert!(seed.verify(&path, [7; 32], &sig));
        assert!(!seed.verify(&path, [8; 32], &sig));
    }
}
