use std::collections::BTreeMap;
use std::fmt;

use bitcoin::bip32::{DerivationPath, Fingerprint, KeySource};
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::psbt::Input;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Script, Transaction};

use crate::Error;

/// The kind of script an input is spending, as far as signing support is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptType {
    P2pkh,
    P2shP2wpkh,
    P2wpkh,
    P2shMultisig,
    P2shP2wshMultisig,
    P2wshMultisig,
    BareMultisig,
    ArbitraryScriptPubkey,
    ArbitraryRedeemScript,
    ArbitraryWitnessScript,
}

impl ScriptType {
    /// True if spending this script type requires a witness
    pub fn is_segwit(&self) -> bool {
        matches!(
            self,
            ScriptType::P2shP2wpkh
                | ScriptType::P2wpkh
                | ScriptType::P2shP2wshMultisig
                | ScriptType::P2wshMultisig
                | ScriptType::ArbitraryWitnessScript
        )
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2shP2wpkh => "p2sh-p2wpkh",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2shMultisig => "p2sh multisig",
            ScriptType::P2shP2wshMultisig => "p2sh-p2wsh multisig",
            ScriptType::P2wshMultisig => "p2wsh multisig",
            ScriptType::BareMultisig => "bare multisig",
            ScriptType::ArbitraryScriptPubkey => "arbitrary scriptPubKey",
            ScriptType::ArbitraryRedeemScript => "arbitrary redeemScript",
            ScriptType::ArbitraryWitnessScript => "arbitrary witnessScript",
        };
        write!(f, "{s}")
    }
}

/// Classify the input `idx` of the given PSBT parts.
///
/// The spent output is taken from `witness_utxo` or from `non_witness_utxo`. Wrapped scripts need
/// their `redeem_script` and `witness_script` which must hash to the spent script.
pub fn classify_input(idx: usize, tx: &Transaction, input: &Input) -> Result<ScriptType, Error> {
    let invalid = |msg: &str| Error::InvalidArgument(format!("input #{idx} {msg}"));
    let txin = tx.input.get(idx).ok_or_else(|| invalid("does not exist"))?;

    let script_pubkey = match (&input.witness_utxo, &input.non_witness_utxo) {
        (Some(txout), _) => txout.script_pubkey.as_script(),
        (None, Some(prev_tx)) => {
            if prev_tx.compute_txid() != txin.previous_output.txid {
                return Err(invalid("has a non_witness_utxo not matching its outpoint"));
            }
            let vout = txin.previous_output.vout as usize;
            prev_tx
                .output
                .get(vout)
                .ok_or_else(|| invalid("spends a missing output of its non_witness_utxo"))?
                .script_pubkey
                .as_script()
        }
        (None, None) => return Err(invalid("is missing utxo information")),
    };

    let witness_script = |expected: &Script| -> Result<ScriptType, Error> {
        let ws = input
            .witness_script
            .as_ref()
            .ok_or_else(|| invalid("is missing the witness script"))?;
        if ws.to_p2wsh().as_script() != expected {
            return Err(invalid("has a witness script not matching the spent script"));
        }
        Ok(if is_multisig(ws) {
            ScriptType::P2wshMultisig
        } else {
            ScriptType::ArbitraryWitnessScript
        })
    };

    Ok(if script_pubkey.is_p2pkh() {
        ScriptType::P2pkh
    } else if script_pubkey.is_p2wpkh() {
        ScriptType::P2wpkh
    } else if script_pubkey.is_p2wsh() {
        witness_script(script_pubkey)?
    } else if script_pubkey.is_p2sh() {
        let rs = input
            .redeem_script
            .as_ref()
            .ok_or_else(|| invalid("is missing the redeem script"))?;
        if rs.to_p2sh().as_script() != script_pubkey {
            return Err(invalid("has a redeem script not matching the spent script"));
        }
        if rs.is_p2wpkh() {
            ScriptType::P2shP2wpkh
        } else if rs.is_p2wsh() {
            match witness_script(rs)? {
                ScriptType::P2wshMultisig => ScriptType::P2shP2wshMultisig,
                t => t,
            }
        } else if is_multisig(rs) {
            ScriptType::P2shMultisig
        } else {
            ScriptType::ArbitraryRedeemScript
        }
    } else if is_multisig(script_pubkey) {
        ScriptType::BareMultisig
    } else {
        ScriptType::ArbitraryScriptPubkey
    })
}

fn pushnum(instruction: &Instruction) -> Option<usize> {
    match instruction {
        Instruction::Op(op) => match op.to_u8() {
            n @ 0x51..=0x60 => Some((n - 0x50) as usize),
            _ => None,
        },
        _ => None,
    }
}

/// Whether the script is a standard `m <keys> n OP_CHECKMULTISIG`
pub fn is_multisig(script: &Script) -> bool {
    let instructions: Vec<_> = match script.instructions().collect::<Result<_, _>>() {
        Ok(i) => i,
        Err(_) => return false,
    };
    if instructions.len() < 4 {
        return false;
    }
    let n_keys = instructions.len() - 3;
    let m = pushnum(&instructions[0]);
    let n = pushnum(&instructions[n_keys + 1]);
    let keys_ok = instructions[1..=n_keys].iter().all(|i| match i {
        Instruction::PushBytes(b) => b.len() == 33 || b.len() == 65,
        _ => false,
    });
    let last_ok = matches!(instructions[n_keys + 2], Instruction::Op(op) if op == OP_CHECKMULTISIG);
    match (m, n) {
        (Some(m), Some(n)) => keys_ok && last_ok && n == n_keys && m <= n,
        _ => false,
    }
}

/// The keys of a `bip32_derivation` map which belong to the wallet with the given master fingerprint
pub fn keys_with_fingerprint(
    bip32_derivation: &BTreeMap<PublicKey, KeySource>,
    fingerprint: Fingerprint,
) -> Vec<(PublicKey, DerivationPath)> {
    bip32_derivation
        .iter()
        .filter(|(_, (fp, _))| *fp == fingerprint)
        .map(|(pk, (_, path))| (*pk, path.clone()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{
        Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, TxIn, TxOut, Txid, WPubkeyHash, Witness,
    };
    use std::str::FromStr;

    const MULTI: &str = "522102ebc62c20f1e09e169a88745f60f6dac878c92db5c7ed78c6703d2d0426a01f942102c2d59d677122bc292048833003fd5cb19d27d32896b1d0feec654c291f7ede9e52ae";

    fn spending_tx() -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::all_zeros(), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![],
        }
    }

    fn witness_input(script_pubkey: ScriptBuf) -> Input {
        Input {
            witness_utxo: Some(TxOut {
                value: Amount::from_sat(10_000),
                script_pubkey,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_multisig() {
        let multi = ScriptBuf::from_hex(MULTI).unwrap();
        assert!(is_multisig(&multi));

        let pkh = PubkeyHash::from_str("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert!(!is_multisig(&ScriptBuf::new_p2pkh(&pkh)));
        assert!(!is_multisig(&ScriptBuf::new()));

        // 3 of 2
        let bad = MULTI.replacen("52", "53", 1);
        assert!(!is_multisig(&ScriptBuf::from_hex(&bad).unwrap()));
    }

    #[test]
    fn test_classify() {
        let tx = spending_tx();
        let multi = ScriptBuf::from_hex(MULTI).unwrap();
        let wpkh = WPubkeyHash::from_str("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let p2wpkh = ScriptBuf::new_p2wpkh(&wpkh);

        let input = witness_input(p2wpkh.clone());
        assert_eq!(classify_input(0, &tx, &input).unwrap(), ScriptType::P2wpkh);

        let mut input = witness_input(p2wpkh.to_p2sh());
        input.redeem_script = Some(p2wpkh.clone());
        assert_eq!(
            classify_input(0, &tx, &input).unwrap(),
            ScriptType::P2shP2wpkh
        );

        let mut input = witness_input(multi.to_p2wsh());
        input.witness_script = Some(multi.clone());
        assert_eq!(
            classify_input(0, &tx, &input).unwrap(),
            ScriptType::P2wshMultisig
        );

        let mut input = witness_input(multi.to_p2wsh().to_p2sh());
        input.redeem_script = Some(multi.to_p2wsh());
        input.witness_script = Some(multi.clone());
        assert_eq!(
            classify_input(0, &tx, &input).unwrap(),
            ScriptType::P2shP2wshMultisig
        );

        let mut input = witness_input(multi.to_p2sh());
        input.redeem_script = Some(multi.clone());
        assert_eq!(
            classify_input(0, &tx, &input).unwrap(),
            ScriptType::P2shMultisig
        );

        let input = witness_input(multi.clone());
        assert_eq!(
            classify_input(0, &tx, &input).unwrap(),
            ScriptType::BareMultisig
        );

        let input = witness_input(ScriptBuf::new_op_return([1u8, 2, 3]));
        assert_eq!(
            classify_input(0, &tx, &input).unwrap(),
            ScriptType::ArbitraryScriptPubkey
        );
        assert!(!ScriptType::ArbitraryScriptPubkey.is_segwit());
        assert!(ScriptType::P2shP2wpkh.is_segwit());
    }

    #[test]
    fn test_classify_malformed() {
        let tx = spending_tx();
        let multi = ScriptBuf::from_hex(MULTI).unwrap();

        // missing utxo
        let err = classify_input(0, &tx, &Input::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // missing redeem script
        let input = witness_input(multi.to_p2sh());
        classify_input(0, &tx, &input).unwrap_err();

        // witness script not matching
        let mut input = witness_input(multi.to_p2wsh());
        input.witness_script = Some(ScriptBuf::new_op_return([0u8]));
        classify_input(0, &tx, &input).unwrap_err();

        // non existing input
        classify_input(1, &tx, &witness_input(multi)).unwrap_err();
    }
}
