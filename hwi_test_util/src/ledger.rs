use std::sync::{Arc, Mutex};

use hwi_common::bitcoin::bip32::{ChildNumber, DerivationPath};
use hwi_common::bitcoin::hashes::{sha256, sha256d, Hash};
use hwi_common::bitcoin::secp256k1::ecdsa;
use hwi_common::bitcoin::sign_message::signed_msg_hash;
use hwi_common::bitcoin::Network;
use hwi_common::AddressType;
use hwi_ledger::{
    APDUCmdVec, BtchipCommandCode, StatusWord, Transport, TransportError, CLA_BTCHIP,
};

use crate::{Stats, TestSeed};

#[derive(Debug, Default)]
struct State {
    message_path: Option<DerivationPath>,
    message: Vec<u8>,

    /// Data streamed since the last signature, what the signature commits to
    transcript: Vec<u8>,
    closed: bool,
}

/// The Ledger Bitcoin app answering APDUs with a software key.
///
/// Clones share the device state.
#[derive(Clone)]
pub struct SimulatedLedger {
    seed: TestSeed,
    network: Network,
    stats: Arc<Stats>,
    reject: bool,
    state: Arc<Mutex<State>>,
}

impl SimulatedLedger {
    pub fn new(seed: TestSeed, network: Network, stats: Arc<Stats>) -> Self {
        Self {
            seed,
            network,
            stats,
            reject: false,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A device whose user refuses every confirmation
    pub fn rejecting(self) -> Self {
        Self {
            reject: true,
            ..self
        }
    }

    fn wallet_public_key(&self, data: &[u8], p2: u8) -> Option<Vec<u8>> {
        let (path, _) = read_path(data)?;
        let address_type = match p2 {
            0x00 => AddressType::Legacy,
            0x01 => AddressType::ShWpkh,
            0x02 => AddressType::Wpkh,
            _ => return None,
        };
        let xpriv = self.seed.xpriv(&path);
        let public_key = self.seed.public_key(&path).serialize_uncompressed();
        let address = self.seed.address(&path, address_type, self.network);

        let mut reply = vec![public_key.len() as u8];
        reply.extend(public_key);
        reply.push(address.len() as u8);
        reply.extend(address.as_bytes());
        reply.extend(xpriv.chain_code.to_bytes());
        Some(reply)
    }

    /// DER signature with the parity of R in the first byte, as the device returns them
    fn device_signature(&self, sig: ecdsa::RecoverableSignature) -> Vec<u8> {
        let (recid, compact) = sig.serialize_compact();
        let mut der = ecdsa::Signature::from_compact(&compact)
            .expect("valid signature")
            .serialize_der()
            .to_vec();
        der[0] = 0x30 | (recid.to_i32() as u8 & 0x01);
        der
    }

    fn handle(&self, state: &mut State, cmd: &APDUCmdVec) -> Result<Vec<u8>, StatusWord> {
        let data = cmd.data.as_slice();
        let confirm = || if self.reject { Err(StatusWord::Deny) } else { Ok(()) };

        match cmd.ins {
            ins if ins == BtchipCommandCode::GetWalletPublicKey as u8 => {
                if cmd.p1 == 0x01 {
                    confirm()?;
                }
                self.wallet_public_key(data, cmd.p2).ok_or(StatusWord::IncorrectData)
            }
            ins if ins == BtchipCommandCode::SignMessage as u8 => match (cmd.p1, cmd.p2) {
                (0x00, 0x01) => {
                    let (path, rest) = read_path(data).ok_or(StatusWord::IncorrectData)?;
                    let rest = rest.get(2..).ok_or(StatusWord::WrongLength)?;
                    state.message_path = Some(path);
                    state.message = rest.to_vec();
                    Ok(vec![0x00, 0x00])
                }
                (0x00, 0x80) => {
                    state.message.extend(data);
                    Ok(vec![0x00, 0x00])
                }
                (0x80, _) => {
                    confirm()?;
                    let path = state.message_path.take().ok_or(StatusWord::IncorrectData)?;
                    let message = String::from_utf8(std::mem::take(&mut state.message))
                        .map_err(|_| StatusWord::IncorrectData)?;
                    let hash = signed_msg_hash(&message).to_byte_array();
                    Ok(self.device_signature(self.seed.sign_recoverable(&path, hash)))
                }
                _ => Err(StatusWord::WrongP1P2),
            },
            ins if ins == BtchipCommandCode::GetTrustedInput as u8 => {
                state.transcript.extend(data);
                let mut trusted = vec![0x32, 0x00];
                trusted.extend(sha256::Hash::hash(&state.transcript).to_byte_array());
                trusted.extend([0u8; 22]);
                Ok(trusted)
            }
            ins if ins == BtchipCommandCode::HashInputStart as u8 => {
                state.transcript.extend(data);
                Ok(vec![])
            }
            ins if ins == BtchipCommandCode::HashInputFinalizeFull as u8 => {
                state.transcript.extend(data);
                if cmd.p1 == 0x80 {
                    confirm()?;
                }
                Ok(vec![0x00, 0x00])
            }
            ins if ins == BtchipCommandCode::HashSign as u8 => {
                let (path, _) = read_path(data).ok_or(StatusWord::IncorrectData)?;
                let hash = sha256d::Hash::hash(&std::mem::take(&mut state.transcript));
                let sig = self.seed.sign_recoverable(&path, hash.to_byte_array());
                let mut reply = self.device_signature(sig);
                reply.push(0x01);
                Ok(reply)
            }
            _ => Err(StatusWord::InsNotSupported),
        }
    }
}

impl Transport for SimulatedLedger {
    fn exchange(&self, command: &APDUCmdVec) -> Result<(StatusWord, Vec<u8>), TransportError> {
        let mut state = self.state.lock().expect("state");
        if state.closed {
            return Err("transport closed".into());
        }
        self.stats.call();
        if command.cla != CLA_BTCHIP {
            return Ok((StatusWord::ClaNotSupported, vec![]));
        }
        Ok(match self.handle(&mut state, command) {
            Ok(reply) => (StatusWord::OK, reply),
            Err(status) => (status, vec![]),
        })
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("state");
        if !state.closed {
            state.closed = true;
            self.stats.close();
        }
        Ok(())
    }
}

fn read_path(data: &[u8]) -> Option<(DerivationPath, &[u8])> {
    let len = *data.first()? as usize;
    let bytes = data.get(1..1 + len * 4)?;
    let path: Vec<ChildNumber> = bytes
        .chunks(4)
        .map(|c| ChildNumber::from(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
        .collect();
    Some((DerivationPath::from(path), &data[1 + len * 4..]))
}
