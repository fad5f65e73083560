//! Build PSBTs spending outputs of a [`TestSeed`]

use std::collections::BTreeMap;
use std::str::FromStr;

use hwi_common::bitcoin::absolute::LockTime;
use hwi_common::bitcoin::bip32::{DerivationPath, KeySource};
use hwi_common::bitcoin::hashes::Hash;
use hwi_common::bitcoin::opcodes::all::OP_CHECKMULTISIG;
use hwi_common::bitcoin::psbt::{Input, Output};
use hwi_common::bitcoin::script::Builder;
use hwi_common::bitcoin::secp256k1;
use hwi_common::bitcoin::transaction::Version;
use hwi_common::bitcoin::{
    Amount, CompressedPublicKey, OutPoint, PublicKey, Psbt, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, WPubkeyHash,
};

use crate::{TestSeed, OTHER_MNEMONIC};

pub const P2WPKH_PATH: &str = "m/84h/1h/0h/0/0";
pub const P2SH_P2WPKH_PATH: &str = "m/49h/1h/0h/0/0";
pub const P2PKH_PATH: &str = "m/44h/1h/0h/0/0";
pub const MULTISIG_PATH: &str = "m/48h/1h/0h/2h/0/0";
pub const CHANGE_PATH: &str = "m/84h/1h/0h/1/0";

/// Accumulates inputs and outputs of a transaction and their PSBT metadata
pub struct PsbtBuilder {
    seed: TestSeed,
    other: TestSeed,
    inputs: Vec<(TxIn, Input)>,
    outputs: Vec<(TxOut, Output)>,

    /// Segwit inputs also carry their previous transaction
    prev_txs: bool,
}

impl PsbtBuilder {
    pub fn new(seed: &TestSeed) -> Self {
        Self {
            seed: seed.clone(),
            other: TestSeed::new(OTHER_MNEMONIC),
            inputs: vec![],
            outputs: vec![],
            prev_txs: false,
        }
    }

    /// Attach the previous transaction to the segwit inputs added next, as current wallets do
    pub fn with_prev_txs(mut self) -> Self {
        self.prev_txs = true;
        self
    }

    fn key(&self, path: &str) -> (secp256k1::PublicKey, KeySource) {
        let path = DerivationPath::from_str(path).expect("test path");
        let public_key = self.seed.public_key(&path);
        (public_key, (self.seed.fingerprint(), path))
    }

    fn other_key(&self, path: &str) -> PublicKey {
        let path = DerivationPath::from_str(path).expect("test path");
        PublicKey::new(self.other.public_key(&path))
    }

    fn derivation(&self, path: &str) -> BTreeMap<secp256k1::PublicKey, KeySource> {
        let (public_key, source) = self.key(path);
        BTreeMap::from([(public_key, source)])
    }

    /// An outpoint no other input of the builder spends
    fn next_outpoint(&self) -> OutPoint {
        OutPoint {
            txid: Txid::from_byte_array([self.inputs.len() as u8 + 1; 32]),
            vout: 0,
        }
    }

    fn wpkh(&self, path: &str) -> ScriptBuf {
        let (public_key, _) = self.key(path);
        ScriptBuf::new_p2wpkh(&CompressedPublicKey(public_key).wpubkey_hash())
    }

    fn multisig(&self, path: &str) -> ScriptBuf {
        let (public_key, _) = self.key(path);
        Builder::new()
            .push_int(1)
            .push_key(&PublicKey::new(public_key))
            .push_key(&self.other_key(path))
            .push_int(2)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script()
    }

    /// A transaction whose only output is spent by the next input
    fn prev_tx(&self, script_pubkey: ScriptBuf, value: u64) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: self.next_outpoint(),
                ..Default::default()
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey,
            }],
        }
    }

    fn spend(mut self, previous_output: OutPoint, input: Input) -> Self {
        let txin = TxIn {
            previous_output,
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            ..Default::default()
        };
        self.inputs.push((txin, input));
        self
    }

    fn witness_input(self, script_pubkey: ScriptBuf, value: u64, input: Input) -> Self {
        let witness_utxo = Some(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script_pubkey.clone(),
        });
        if self.prev_txs {
            let prev_tx = self.prev_tx(script_pubkey, value);
            let outpoint = OutPoint::new(prev_tx.compute_txid(), 0);
            let input = Input {
                witness_utxo,
                non_witness_utxo: Some(prev_tx),
                ..input
            };
            self.spend(outpoint, input)
        } else {
            let outpoint = self.next_outpoint();
            self.spend(outpoint, Input { witness_utxo, ..input })
        }
    }

    /// Spend an output of a previous transaction included whole in the PSBT
    fn legacy_input(self, script_pubkey: ScriptBuf, value: u64, input: Input) -> Self {
        let prev_tx = self.prev_tx(script_pubkey, value);
        let outpoint = OutPoint::new(prev_tx.compute_txid(), 0);
        let input = Input {
            non_witness_utxo: Some(prev_tx),
            ..input
        };
        self.spend(outpoint, input)
    }

    pub fn p2wpkh_input(self, value: u64) -> Self {
        let input = Input {
            bip32_derivation: self.derivation(P2WPKH_PATH),
            ..Default::default()
        };
        let spk = self.wpkh(P2WPKH_PATH);
        self.witness_input(spk, value, input)
    }

    pub fn p2sh_p2wpkh_input(self, value: u64) -> Self {
        let redeem_script = self.wpkh(P2SH_P2WPKH_PATH);
        let input = Input {
            bip32_derivation: self.derivation(P2SH_P2WPKH_PATH),
            redeem_script: Some(redeem_script.clone()),
            ..Default::default()
        };
        self.witness_input(redeem_script.to_p2sh(), value, input)
    }

    pub fn p2pkh_input(self, value: u64) -> Self {
        let (public_key, _) = self.key(P2PKH_PATH);
        let spk = ScriptBuf::new_p2pkh(&CompressedPublicKey(public_key).pubkey_hash());
        let input = Input {
            bip32_derivation: self.derivation(P2PKH_PATH),
            ..Default::default()
        };
        self.legacy_input(spk, value, input)
    }

    /// A 1-of-2 multisig script directly in the spent output
    pub fn bare_multisig_input(self, value: u64) -> Self {
        let input = Input {
            bip32_derivation: self.derivation(MULTISIG_PATH),
            ..Default::default()
        };
        let spk = self.multisig(MULTISIG_PATH);
        self.legacy_input(spk, value, input)
    }

    pub fn p2sh_multisig_input(self, value: u64) -> Self {
        let redeem_script = self.multisig(MULTISIG_PATH);
        let input = Input {
            bip32_derivation: self.derivation(MULTISIG_PATH),
            redeem_script: Some(redeem_script.clone()),
            ..Default::default()
        };
        self.legacy_input(redeem_script.to_p2sh(), value, input)
    }

    pub fn p2wsh_multisig_input(self, value: u64) -> Self {
        let witness_script = self.multisig(MULTISIG_PATH);
        let input = Input {
            bip32_derivation: self.derivation(MULTISIG_PATH),
            witness_script: Some(witness_script.clone()),
            ..Default::default()
        };
        self.witness_input(witness_script.to_p2wsh(), value, input)
    }

    /// Pay to an address of another wallet
    pub fn external_output(mut self, value: u64) -> Self {
        let txout = TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0x11; 20])),
        };
        self.outputs.push((txout, Output::default()));
        self
    }

    /// Pay to the internal chain of the seed
    pub fn change_output(mut self, value: u64) -> Self {
        let txout = TxOut {
            value: Amount::from_sat(value),
            script_pubkey: self.wpkh(CHANGE_PATH),
        };
        let output = Output {
            bip32_derivation: self.derivation(CHANGE_PATH),
            ..Default::default()
        };
        self.outputs.push((txout, output));
        self
    }

    pub fn build(self) -> Psbt {
        let (txins, inputs): (Vec<_>, Vec<_>) = self.inputs.into_iter().unzip();
        let (txouts, outputs): (Vec<_>, Vec<_>) = self.outputs.into_iter().unzip();
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: txins,
            output: txouts,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).expect("unsigned tx");
        psbt.inputs = inputs;
        psbt.outputs = outputs;
        psbt
    }
}

/// One P2WPKH input paying to another wallet with change
pub fn p2wpkh(seed: &TestSeed) -> Psbt {
    PsbtBuilder::new(seed)
        .p2wpkh_input(100_000)
        .external_output(60_000)
        .change_output(39_000)
        .build()
}

/// One P2PKH input, the previous transaction is included
pub fn p2pkh(seed: &TestSeed) -> Psbt {
    PsbtBuilder::new(seed)
        .p2pkh_input(100_000)
        .external_output(99_000)
        .build()
}

/// A segwit and a legacy input in the same transaction
pub fn mixed(seed: &TestSeed) -> Psbt {
    PsbtBuilder::new(seed)
        .p2wpkh_input(50_000)
        .p2pkh_input(50_000)
        .external_output(99_000)
        .build()
}

/// Segwit inputs carrying both their witness utxo and their previous transaction
pub fn segwit_with_prev_txs(seed: &TestSeed) -> Psbt {
    PsbtBuilder::new(seed)
        .with_prev_txs()
        .p2wpkh_input(40_000)
        .p2sh_p2wpkh_input(30_000)
        .p2wpkh_input(30_000)
        .external_output(60_000)
        .change_output(39_000)
        .build()
}

/// A P2WPKH input and a bare multisig one
pub fn p2wpkh_and_bare_multisig(seed: &TestSeed) -> Psbt {
    PsbtBuilder::new(seed)
        .p2wpkh_input(50_000)
        .bare_multisig_input(50_000)
        .external_output(99_000)
        .build()
}

#[cfg(test)]
mod test {
    use super::*;
    use hwi_common::{classify_input, ScriptType};

    fn classify(psbt: &Psbt) -> Vec<ScriptType> {
        psbt.inputs
            .iter()
            .enumerate()
            .map(|(i, input)| classify_input(i, &psbt.unsigned_tx, input).unwrap())
            .collect()
    }

    #[test]
    fn test_fixtures_classification() {
        let seed = TestSeed::default();
        assert_eq!(classify(&p2wpkh(&seed)), vec![ScriptType::P2wpkh]);
        assert_eq!(classify(&p2pkh(&seed)), vec![ScriptType::P2pkh]);
        assert_eq!(
            classify(&mixed(&seed)),
            vec![ScriptType::P2wpkh, ScriptType::P2pkh]
        );
        assert_eq!(
            classify(&segwit_with_prev_txs(&seed)),
            vec![ScriptType::P2wpkh, ScriptType::P2shP2wpkh, ScriptType::P2wpkh]
        );
        assert!(segwit_with_prev_txs(&seed)
            .inputs
            .iter()
            .all(|i| i.witness_utxo.is_some() && i.non_witness_utxo.is_some()));
        assert_eq!(
            classify(&p2wpkh_and_bare_multisig(&seed)),
            vec![ScriptType::P2wpkh, ScriptType::BareMultisig]
        );

        let psbt = PsbtBuilder::new(&seed)
            .p2sh_p2wpkh_input(1_000)
            .p2sh_multisig_input(1_000)
            .p2wsh_multisig_input(1_000)
            .external_output(2_000)
            .build();
        assert_eq!(
            classify(&psbt),
            vec![
                ScriptType::P2shP2wpkh,
                ScriptType::P2shMultisig,
                ScriptType::P2wshMultisig
            ]
        );
    }
}
