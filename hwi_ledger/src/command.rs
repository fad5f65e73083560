//! APDU commands for the Ledger Bitcoin application.

use hwi_common::bitcoin::bip32::{ChildNumber, DerivationPath};
use hwi_common::bitcoin::consensus::encode::{self, VarInt};
use hwi_common::bitcoin::{Script, Sequence, Transaction, TxOut};
use hwi_common::AddressType;

use crate::apdu::{apdu, APDUCmdVec, BtchipCommandCode, MAX_DATA_LEN};

/// Bytes of a script sent in a single APDU, leaves room for the trailing sequence
const SCRIPT_BLOCK_LEN: usize = MAX_DATA_LEN - 4;

/// Bytes of the serialized outputs sent in a single APDU
const OUTPUTS_BLOCK_LEN: usize = 50;

/// Serialize a derivation path as the number of steps followed by big endian child numbers
pub fn path_data(path: &DerivationPath) -> Vec<u8> {
    let child_numbers: &[ChildNumber] = path.as_ref();
    child_numbers
        .iter()
        .fold(vec![child_numbers.len() as u8], |mut acc, &x| {
            acc.extend_from_slice(&u32::from(x).to_be_bytes());
            acc
        })
}

fn var_int(n: usize) -> Vec<u8> {
    encode::serialize(&VarInt(n as u64))
}

/// Split `script` in chunks to be sent one per APDU, the last one carries the `sequence`
fn script_chunks(script: &[u8], sequence: Sequence) -> Vec<Vec<u8>> {
    let sequence = sequence.to_consensus_u32().to_le_bytes();
    let mut chunks: Vec<Vec<u8>> = script.chunks(SCRIPT_BLOCK_LEN).map(<[u8]>::to_vec).collect();
    match chunks.last_mut() {
        Some(last) => last.extend(sequence),
        None => chunks.push(sequence.to_vec()),
    }
    chunks
}

/// Creates the APDU command to get the public key, the address and the chain code at the given
/// derivation path, optionally showing the address on the device screen.
pub fn get_wallet_public_key(
    path: &DerivationPath,
    display: bool,
    address_type: AddressType,
) -> APDUCmdVec {
    let p2 = match address_type {
        AddressType::Legacy => 0x00,
        AddressType::ShWpkh => 0x01,
        AddressType::Wpkh => 0x02,
    };
    apdu(
        BtchipCommandCode::GetWalletPublicKey,
        display as u8,
        p2,
        path_data(path),
    )
}

/// Creates the APDU commands to send the message to sign.
///
/// The first one carries the path and the message length, the message is split over as many
/// commands as needed. Message length must fit in a u16.
pub fn sign_message_prepare(path: &DerivationPath, message: &[u8]) -> Vec<APDUCmdVec> {
    let mut first = path_data(path);
    first.extend((message.len() as u16).to_be_bytes());
    let first_len = (MAX_DATA_LEN - first.len()).min(message.len());
    let (head, rest) = message.split_at(first_len);
    first.extend(head);

    let mut cmds = vec![apdu(BtchipCommandCode::SignMessage, 0x00, 0x01, first)];
    cmds.extend(
        rest.chunks(MAX_DATA_LEN)
            .map(|c| apdu(BtchipCommandCode::SignMessage, 0x00, 0x80, c.to_vec())),
    );
    cmds
}

/// Creates the APDU command to sign the message previously sent, with an empty user PIN
pub fn sign_message_sign() -> APDUCmdVec {
    apdu(BtchipCommandCode::SignMessage, 0x80, 0x00, vec![0x00])
}

/// Creates the APDU commands streaming the previous transaction `tx` to obtain a trusted input
/// for its output `index`. The answer to the last command is the trusted input.
pub fn get_trusted_input(tx: &Transaction, index: u32) -> Vec<APDUCmdVec> {
    let next = |data: Vec<u8>| apdu(BtchipCommandCode::GetTrustedInput, 0x80, 0x00, data);

    let mut data = index.to_be_bytes().to_vec();
    data.extend(tx.version.0.to_le_bytes());
    data.extend(var_int(tx.input.len()));
    let mut cmds = vec![apdu(BtchipCommandCode::GetTrustedInput, 0x00, 0x00, data)];

    for input in &tx.input {
        let mut data = encode::serialize(&input.previous_output);
        data.extend(var_int(input.script_sig.len()));
        cmds.push(next(data));
        cmds.extend(
            script_chunks(input.script_sig.as_bytes(), input.sequence)
                .into_iter()
                .map(next),
        );
    }

    cmds.push(next(var_int(tx.output.len())));
    for output in &tx.output {
        let mut data = output.value.to_sat().to_le_bytes().to_vec();
        data.extend(var_int(output.script_pubkey.len()));
        cmds.push(next(data));
        cmds.extend(
            output
                .script_pubkey
                .as_bytes()
                .chunks(MAX_DATA_LEN)
                .map(|c| next(c.to_vec())),
        );
    }

    cmds.push(next(tx.lock_time.to_consensus_u32().to_le_bytes().to_vec()));
    cmds
}

/// How an input is identified when hashing the transaction
#[derive(Debug, Clone)]
pub enum InputValue {
    /// A trusted input, as returned by [`get_trusted_input`]
    Trusted(Vec<u8>),

    /// The serialized outpoint followed by the little endian amount
    Witness(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct UntrustedInput {
    pub value: InputValue,
    pub sequence: Sequence,
}

/// Creates the APDU commands streaming the inputs of the transaction being signed.
///
/// Only the input at `input_index` carries `script`, the others have an empty script.
pub fn hash_input_start(
    new_transaction: bool,
    segwit: bool,
    version: i32,
    inputs: &[UntrustedInput],
    input_index: usize,
    script: &Script,
) -> Vec<APDUCmdVec> {
    let next = |data: Vec<u8>| apdu(BtchipCommandCode::HashInputStart, 0x80, 0x00, data);
    let p2 = match (new_transaction, segwit) {
        (true, true) => 0x02,
        (true, false) => 0x00,
        (false, _) => 0x80,
    };

    let mut data = version.to_le_bytes().to_vec();
    data.extend(var_int(inputs.len()));
    let mut cmds = vec![apdu(BtchipCommandCode::HashInputStart, 0x00, p2, data)];

    for (i, input) in inputs.iter().enumerate() {
        let mut data = match &input.value {
            InputValue::Trusted(v) => {
                let mut d = vec![0x01, v.len() as u8];
                d.extend(v);
                d
            }
            InputValue::Witness(v) => {
                let mut d = vec![0x02];
                d.extend(v);
                d
            }
        };
        let script: &[u8] = if i == input_index {
            script.as_bytes()
        } else {
            &[]
        };
        data.extend(var_int(script.len()));
        if script.is_empty() {
            data.extend(input.sequence.to_consensus_u32().to_le_bytes());
            cmds.push(next(data));
        } else {
            cmds.push(next(data));
            cmds.extend(script_chunks(script, input.sequence).into_iter().map(next));
        }
    }
    cmds
}

/// Creates the APDU commands sending the change path and the outputs of the transaction
pub fn hash_input_finalize_full(
    change_path: Option<&DerivationPath>,
    outputs: &[TxOut],
) -> Vec<APDUCmdVec> {
    let path = change_path.map(path_data).unwrap_or_else(|| vec![0x00]);
    let mut cmds = vec![apdu(
        BtchipCommandCode::HashInputFinalizeFull,
        0xFF,
        0x00,
        path,
    )];

    let mut data = var_int(outputs.len());
    for output in outputs {
        data.extend(encode::serialize(output));
    }
    let count = data.chunks(OUTPUTS_BLOCK_LEN).count();
    cmds.extend(
        data.chunks(OUTPUTS_BLOCK_LEN)
            .enumerate()
            .map(|(i, chunk)| {
                let p1 = if i + 1 == count { 0x80 } else { 0x00 };
                apdu(
                    BtchipCommandCode::HashInputFinalizeFull,
                    p1,
                    0x00,
                    chunk.to_vec(),
                )
            }),
    );
    cmds
}

/// Creates the APDU command to sign the hashed transaction with the key at `path`
pub fn untrusted_hash_sign(path: &DerivationPath, lock_time: u32, sighash_type: u8) -> APDUCmdVec {
    let mut data = path_data(path);
    data.push(0x00); // empty user PIN
    data.extend(lock_time.to_be_bytes());
    data.push(sighash_type);
    apdu(BtchipCommandCode::HashSign, 0x00, 0x00, data)
}
