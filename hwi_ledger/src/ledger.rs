use hwi_common::bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, Xpub};
use hwi_common::bitcoin::consensus::encode;
use hwi_common::bitcoin::hashes::{hash160, Hash};
use hwi_common::bitcoin::secp256k1::PublicKey;
use hwi_common::bitcoin::sign_message::MessageSignature;
use hwi_common::bitcoin::{
    ecdsa, CompressedPublicKey, NetworkKind, Psbt, Script, ScriptBuf, Transaction, TxOut,
};
use hwi_common::{
    assemble_xpub, classify_input, key_fingerprint, keys_with_fingerprint, AddressType, DeviceType,
    HardwareWallet,
};

use crate::apdu::BtchipCommandCode;
use crate::client::{BtchipClient, Transport};
use crate::command::{InputValue, UntrustedInput};
use crate::message::compact_signature;
use crate::Error;

const SIGHASH_ALL: u8 = 0x01;

/// A Ledger Nano S running the Bitcoin app
pub struct Ledger<T: Transport> {
    /// Ledger Bitcoin app client
    pub client: BtchipClient<T>,
    network: NetworkKind,
}

impl<T: Transport> std::fmt::Debug for Ledger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("network", &self.network)
            .finish()
    }
}

impl<T: Transport> Ledger<T> {
    pub fn new(transport: T, network: NetworkKind) -> Self {
        Self {
            client: BtchipClient::new(transport),
            network,
        }
    }

    pub fn network(&self) -> NetworkKind {
        self.network
    }

    fn master_fingerprint(&self) -> Result<Fingerprint, Error> {
        let master =
            self.client
                .get_wallet_public_key(&DerivationPath::master(), false, AddressType::Legacy)?;
        Ok(key_fingerprint(&master.public_key))
    }

    fn sign(&self, psbt: &mut Psbt) -> Result<u32, Error> {
        let master_fp = self.master_fingerprint()?;
        let tx = psbt.unsigned_tx.clone();
        let change_path = change_path(psbt, master_fp);

        let mut inputs = Vec::with_capacity(tx.input.len());
        for (i, (txin, input)) in tx.input.iter().zip(psbt.inputs.iter()).enumerate() {
            let invalid = |msg: &str| Error::InvalidPsbt(format!("input #{i} {msg}"));
            let vout = txin.previous_output.vout;
            let segwit = classify_input(i, &tx, input)
                .map_err(|e| match e {
                    hwi_common::Error::InvalidArgument(m) => Error::InvalidPsbt(m),
                    e => Error::InvalidPsbt(e.to_string()),
                })?
                .is_segwit();
            let spent = match (&input.witness_utxo, &input.non_witness_utxo) {
                (Some(txout), _) => txout.clone(),
                (None, Some(prev_tx)) => prev_tx
                    .output
                    .get(vout as usize)
                    .cloned()
                    .ok_or_else(|| invalid("spends a missing output"))?,
                (None, None) => return Err(invalid("is missing utxo information")),
            };

            let script_code = script_code(
                &spent.script_pubkey,
                segwit,
                input.redeem_script.as_deref(),
                input.witness_script.as_deref(),
            )
            .ok_or_else(|| invalid("has missing or unsupported scripts"))?;

            let attempts: Vec<_> = keys_with_fingerprint(&input.bip32_derivation, master_fp)
                .into_iter()
                .filter(|(pk, _)| {
                    let hash = hash160::Hash::hash(&pk.serialize());
                    contains(script_code.as_bytes(), hash.as_byte_array())
                        || contains(script_code.as_bytes(), &pk.serialize())
                })
                .collect();

            let mut value = encode::serialize(&txin.previous_output);
            value.extend(spent.value.to_sat().to_le_bytes());
            inputs.push(InputToSign {
                untrusted: UntrustedInput {
                    value: InputValue::Witness(value),
                    sequence: txin.sequence,
                },
                segwit,
                prev_tx: input.non_witness_utxo.clone(),
                vout,
                script_code,
                attempts,
            });
        }

        let has_segwit = inputs.iter().any(|i| i.segwit && !i.attempts.is_empty());
        let has_legacy = inputs.iter().any(|i| !i.segwit && !i.attempts.is_empty());
        if has_segwit && has_legacy {
            return Err(Error::NotSupported(
                "signing segwit and legacy inputs in the same transaction",
            ));
        }
        let version = tx.version.0;
        let lock_time = tx.lock_time.to_consensus_u32();
        let mut signatures = vec![];

        if has_segwit {
            let segwit_inputs: Vec<_> = inputs.iter().map(|i| i.untrusted.clone()).collect();
            self.client.start_untrusted_transaction(
                true,
                true,
                version,
                &segwit_inputs,
                0,
                Script::new(),
            )?;
            self.client
                .finalize_input_full(change_path.as_ref(), &tx.output)?;

            for (i, input) in inputs.iter().enumerate() {
                for (pk, path) in input.attempts.iter() {
                    self.client.start_untrusted_transaction(
                        false,
                        true,
                        version,
                        std::slice::from_ref(&input.untrusted),
                        0,
                        &input.script_code,
                    )?;
                    let sig = self.client.untrusted_hash_sign(path, lock_time, SIGHASH_ALL)?;
                    signatures.push((i, *pk, sig));
                }
            }
        } else if has_legacy {
            let mut trusted_inputs = Vec::with_capacity(inputs.len());
            for (i, input) in inputs.iter().enumerate() {
                let prev_tx = input.prev_tx.as_ref().ok_or_else(|| {
                    Error::InvalidPsbt(format!("input #{i} is missing its previous transaction"))
                })?;
                trusted_inputs.push(UntrustedInput {
                    value: InputValue::Trusted(self.client.get_trusted_input(prev_tx, input.vout)?),
                    sequence: input.untrusted.sequence,
                });
            }

            let mut first = true;
            for (i, input) in inputs.iter().enumerate() {
                for (pk, path) in input.attempts.iter() {
                    self.client.start_untrusted_transaction(
                        first,
                        false,
                        version,
                        &trusted_inputs,
                        i,
                        &input.script_code,
                    )?;
                    self.client
                        .finalize_input_full(change_path.as_ref(), &tx.output)?;
                    let sig = self.client.untrusted_hash_sign(path, lock_time, SIGHASH_ALL)?;
                    signatures.push((i, *pk, sig));
                    first = false;
                }
            }
        }

        let mut added = 0;
        for (i, pk, sig) in signatures {
            let sig = ecdsa::Signature::from_slice(&sig).map_err(|_| Error::UnexpectedResult {
                command: BtchipCommandCode::HashSign as u8,
                data: sig,
            })?;
            tracing::debug!("signed input #{i} with {pk}");
            psbt.inputs[i]
                .partial_sigs
                .insert(hwi_common::bitcoin::PublicKey::new(pk), sig);
            added += 1;
        }
        Ok(added)
    }
}

struct InputToSign {
    untrusted: UntrustedInput,

    /// Whether the spent script is segwit, whatever utxo fields the PSBT carries
    segwit: bool,

    /// Only used to build the trusted inputs of a legacy transaction
    prev_tx: Option<Transaction>,
    vout: u32,
    script_code: ScriptBuf,
    attempts: Vec<(PublicKey, DerivationPath)>,
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// The script committed to by the signature of an input spending `script_pubkey`
fn script_code(
    script_pubkey: &Script,
    segwit: bool,
    redeem_script: Option<&Script>,
    witness_script: Option<&Script>,
) -> Option<ScriptBuf> {
    if segwit {
        let program = if script_pubkey.is_p2sh() {
            redeem_script?
        } else {
            script_pubkey
        };
        if program.is_p2wsh() {
            witness_script.map(Script::to_owned)
        } else if program.is_p2wpkh() {
            let mut code = vec![0x76, 0xa9, 0x14];
            code.extend(&program.as_bytes()[2..]);
            code.extend([0x88, 0xac]);
            Some(ScriptBuf::from_bytes(code))
        } else {
            None
        }
    } else if script_pubkey.is_p2sh() {
        redeem_script.map(Script::to_owned)
    } else {
        Some(script_pubkey.to_owned())
    }
}

/// Find an output paying to a key of this wallet on the internal chain (`…/1/k`)
fn change_path(psbt: &Psbt, master_fp: Fingerprint) -> Option<DerivationPath> {
    let mut change = None;
    for (txout, output) in psbt.unsigned_tx.output.iter().zip(psbt.outputs.iter()) {
        for (pk, path) in keys_with_fingerprint(&output.bip32_derivation, master_fp) {
            let children: &[ChildNumber] = path.as_ref();
            let internal = children.len() >= 2
                && children[children.len() - 2] == ChildNumber::Normal { index: 1 };
            if internal && pays_to(txout, pk) {
                change = Some(path);
            }
        }
    }
    change
}

fn pays_to(txout: &TxOut, pk: PublicKey) -> bool {
    let pk = CompressedPublicKey(pk);
    let p2wpkh = ScriptBuf::new_p2wpkh(&pk.wpubkey_hash());
    let spk = &txout.script_pubkey;
    *spk == ScriptBuf::new_p2pkh(&pk.pubkey_hash()) || *spk == p2wpkh || *spk == p2wpkh.to_p2sh()
}

impl<T: Transport> HardwareWallet for Ledger<T> {
    type Error = Error;

    fn device_type(&self) -> DeviceType {
        DeviceType::LedgerNanoS
    }

    fn get_extended_pubkey(&self, path: &DerivationPath) -> Result<Xpub, Error> {
        let children: &[ChildNumber] = path.as_ref();
        let depth = u8::try_from(children.len())
            .map_err(|_| Error::InvalidArgument(format!("derivation path too long: {path}")))?;
        let key = self
            .client
            .get_wallet_public_key(path, false, AddressType::Legacy)?;

        let (parent, child) = match children.split_last() {
            Some((child, parent_path)) => {
                let parent = self.client.get_wallet_public_key(
                    &DerivationPath::from(parent_path.to_vec()),
                    false,
                    AddressType::Legacy,
                )?;
                (Some(parent.public_key), *child)
            }
            None => (None, ChildNumber::Normal { index: 0 }),
        };

        assemble_xpub(
            self.network,
            depth,
            parent.as_ref(),
            child,
            &key.chain_code,
            &key.public_key,
        )
        .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    fn sign_message(&self, message: &str, path: &DerivationPath) -> Result<MessageSignature, Error> {
        if message.len() > u16::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "message too long: {} bytes",
                message.len()
            )));
        }
        // show the signing address first
        self.client
            .get_wallet_public_key(path, true, AddressType::Legacy)?;
        let sig = self.client.sign_message(path, message.as_bytes())?;
        compact_signature(&sig)
    }

    fn sign_psbt(&self, psbt: &mut Psbt) -> Result<u32, Error> {
        self.sign(psbt)
    }

    fn display_address(
        &self,
        path: &DerivationPath,
        address_type: AddressType,
    ) -> Result<String, Error> {
        tracing::info!("Check the address on the Ledger screen");
        Ok(self
            .client
            .get_wallet_public_key(path, true, address_type)?
            .address)
    }

    fn setup(&self, _label: &str, _passphrase: &str) -> Result<(), Error> {
        Err(Error::NotSupported("setup"))
    }

    fn wipe(&self) -> Result<(), Error> {
        Err(Error::NotSupported("wiping"))
    }

    fn restore(&self, _label: &str) -> Result<(), Error> {
        Err(Error::NotSupported("restoring"))
    }

    fn backup(&self) -> Result<String, Error> {
        Err(Error::NotSupported("backup"))
    }

    fn close(&self) -> Result<(), Error> {
        self.client.close()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_script_code() {
        let wpkh = ScriptBuf::from_hex("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        let code = script_code(&wpkh, true, None, None).unwrap();
        assert_eq!(
            code.to_hex_string(),
            "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac"
        );

        // nested segwit needs the redeem script
        let sh = wpkh.to_p2sh();
        assert!(script_code(&sh, true, None, None).is_none());
        assert_eq!(script_code(&sh, true, Some(&wpkh), None).unwrap(), code);

        // legacy inputs sign the spent script
        let pkh = ScriptBuf::from_hex("76a914751e76e8199196d454941c45d1b3a323f1433bd688ac").unwrap();
        assert_eq!(script_code(&pkh, false, None, None).unwrap(), pkh);

        let ws = ScriptBuf::from_hex("51").unwrap();
        assert_eq!(
            script_code(&ws.to_p2wsh(), true, None, Some(&ws)).unwrap(),
            ws
        );
    }

    #[test]
    fn test_contains() {
        assert!(contains(&[1, 2, 3, 4], &[2, 3]));
        assert!(!contains(&[1, 2, 3, 4], &[3, 2]));
        assert!(!contains(&[1], &[1, 2]));
    }

    #[test]
    fn test_pays_to() {
        let pk = PublicKey::from_str(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let cpk = CompressedPublicKey(pk);
        let p2wpkh = ScriptBuf::new_p2wpkh(&cpk.wpubkey_hash());
        for script_pubkey in [
            ScriptBuf::new_p2pkh(&cpk.pubkey_hash()),
            p2wpkh.to_p2sh(),
            p2wpkh,
        ] {
            let txout = TxOut {
                value: hwi_common::bitcoin::Amount::from_sat(1),
                script_pubkey,
            };
            assert!(pays_to(&txout, pk));
        }
    }
}
