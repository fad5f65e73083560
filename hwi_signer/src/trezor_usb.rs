use std::io::BufRead;
use std::str::FromStr;
use std::sync::Mutex;

use hwi_common::bitcoin::bip32::{DerivationPath, Xpub};
use hwi_common::bitcoin::hashes::Hash;
use hwi_common::bitcoin::secp256k1::ecdsa;
use hwi_common::bitcoin::{Transaction, Txid};
use trezor_client::protos::tx_ack::transaction_type::{TxInputType, TxOutputBinType, TxOutputType};
use trezor_client::protos::tx_ack::TransactionType;
use trezor_client::protos::tx_request::RequestType;
use trezor_client::transport::ProtoMessage;
use trezor_client::{protos, Trezor as TrezorDevice, TrezorMessage};

use crate::trezor::{Features, InputScriptType, OutputScriptType, SignTx, TrezorApi};
use crate::VendorError;

/// A Trezor reached over USB through `trezor-client`.
///
/// Devices are identified by the description `trezor-client` gives of them.
pub struct TrezorUsb {
    device: Mutex<Option<TrezorDevice>>,
    passphrase: String,
}

fn transport(e: trezor_client::Error) -> VendorError {
    VendorError::Transport(e.to_string())
}

impl TrezorUsb {
    /// The connected Trezor devices
    pub fn list() -> Vec<String> {
        trezor_client::find_devices(false)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Connect to the device at `path`, `passphrase` answers the passphrase prompts
    pub fn open(path: &str, passphrase: &str) -> Result<Self, VendorError> {
        let available = trezor_client::find_devices(false)
            .into_iter()
            .find(|d| d.to_string() == path)
            .ok_or_else(|| VendorError::Transport(format!("no Trezor at {path}")))?;
        let mut device = available.connect().map_err(transport)?;
        device.init_device(None).map_err(transport)?;
        Ok(Self {
            device: Mutex::new(Some(device)),
            passphrase: passphrase.to_string(),
        })
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(&mut TrezorDevice) -> Result<T, VendorError>,
    ) -> Result<T, VendorError> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| VendorError::Transport("unable to get lock".into()))?;
        let device = device
            .as_mut()
            .ok_or_else(|| VendorError::Transport("device closed".into()))?;
        f(device)
    }

    /// Send `message`, then answer the button and passphrase prompts until the device replies
    fn exchange<S: TrezorMessage>(
        &self,
        device: &mut TrezorDevice,
        message: S,
    ) -> Result<ProtoMessage, VendorError> {
        let mut reply = device.call_raw(message).map_err(transport)?;
        loop {
            let message_type = reply.message_type();
            let next = if message_type == protos::ButtonRequest::MESSAGE_TYPE {
                tracing::info!("Confirm the action on the Trezor");
                device.call_raw(protos::ButtonAck::new())
            } else if message_type == protos::PassphraseRequest::MESSAGE_TYPE {
                let mut ack = protos::PassphraseAck::new();
                ack.set_passphrase(self.passphrase.clone());
                device.call_raw(ack)
            } else if message_type == protos::PinMatrixRequest::MESSAGE_TYPE {
                return Err(VendorError::Device(
                    "The device is locked, unlock it with its PIN first".into(),
                ));
            } else if message_type == protos::Failure::MESSAGE_TYPE {
                let failure: protos::Failure = parse(reply)?;
                return Err(VendorError::Device(failure.message().to_string()));
            } else {
                return Ok(reply);
            };
            reply = next.map_err(transport)?;
        }
    }

    fn call<S: TrezorMessage, R: TrezorMessage>(&self, message: S) -> Result<R, VendorError> {
        self.with_device(|device| parse(self.exchange(device, message)?))
    }
}

fn parse<R: TrezorMessage>(reply: ProtoMessage) -> Result<R, VendorError> {
    if reply.message_type() != R::MESSAGE_TYPE {
        return Err(VendorError::Device(format!(
            "unexpected reply {:?}, expected {:?}",
            reply.message_type(),
            R::MESSAGE_TYPE
        )));
    }
    reply
        .into_message()
        .map_err(|e| VendorError::Device(e.to_string()))
}

fn address_n(path: &DerivationPath) -> Vec<u32> {
    path.into_iter().map(|c| u32::from(*c)).collect()
}

/// Hashes are sent in the byte order they are displayed
fn display_bytes(txid: &Txid) -> Vec<u8> {
    let mut bytes = txid.to_byte_array().to_vec();
    bytes.reverse();
    bytes
}

fn input_script_type(t: InputScriptType) -> protos::InputScriptType {
    match t {
        InputScriptType::SpendAddress => protos::InputScriptType::SPENDADDRESS,
        InputScriptType::SpendP2shWitness => protos::InputScriptType::SPENDP2SHWITNESS,
        InputScriptType::SpendWitness => protos::InputScriptType::SPENDWITNESS,
    }
}

fn output_script_type(t: OutputScriptType) -> protos::OutputScriptType {
    match t {
        OutputScriptType::PayToAddress => protos::OutputScriptType::PAYTOADDRESS,
        OutputScriptType::PayToScriptHash => protos::OutputScriptType::PAYTOSCRIPTHASH,
        OutputScriptType::PayToWitness => protos::OutputScriptType::PAYTOWITNESS,
    }
}

/// The part of the transaction, or of one of its previous transactions, the device asks for
fn tx_ack(request: &protos::TxRequest, tx: &SignTx) -> Result<protos::TxAck, VendorError> {
    let index = request.details.request_index() as usize;
    let missing = || VendorError::Device(format!("device asked for missing item #{index}"));

    let prev_tx: Option<&Transaction> = if request.details.has_tx_hash() {
        let mut hash = request.details.tx_hash().to_vec();
        hash.reverse();
        let txid = Txid::from_slice(&hash).map_err(|e| VendorError::Device(e.to_string()))?;
        let prev_tx = tx.prev_txs.get(&txid).ok_or_else(|| {
            VendorError::InvalidPsbt(format!("previous transaction {txid} is missing"))
        })?;
        Some(prev_tx)
    } else {
        None
    };

    let mut ack_tx = TransactionType::new();
    match (request.request_type(), prev_tx) {
        (RequestType::TXMETA, Some(prev)) => {
            ack_tx.set_version(prev.version.0 as u32);
            ack_tx.set_lock_time(prev.lock_time.to_consensus_u32());
            ack_tx.set_inputs_cnt(prev.input.len() as u32);
            ack_tx.set_outputs_cnt(prev.output.len() as u32);
        }
        (RequestType::TXINPUT, Some(prev)) => {
            let txin = prev.input.get(index).ok_or_else(missing)?;
            let mut input = TxInputType::new();
            input.set_prev_hash(display_bytes(&txin.previous_output.txid));
            input.set_prev_index(txin.previous_output.vout);
            input.set_script_sig(txin.script_sig.to_bytes());
            input.set_sequence(txin.sequence.to_consensus_u32());
            ack_tx.inputs.push(input);
        }
        (RequestType::TXOUTPUT, Some(prev)) => {
            let txout = prev.output.get(index).ok_or_else(missing)?;
            let mut output = TxOutputBinType::new();
            output.set_amount(txout.value.to_sat());
            output.set_script_pubkey(txout.script_pubkey.to_bytes());
            ack_tx.bin_outputs.push(output);
        }
        (RequestType::TXINPUT, None) => {
            let txin = tx.inputs.get(index).ok_or_else(missing)?;
            let mut input = TxInputType::new();
            if let Some(path) = &txin.address_n {
                input.address_n = address_n(path);
            }
            input.set_prev_hash(display_bytes(&txin.prev_hash));
            input.set_prev_index(txin.prev_index);
            input.set_sequence(txin.sequence.to_consensus_u32());
            input.set_script_type(input_script_type(txin.script_type));
            input.set_amount(txin.amount.to_sat());
            ack_tx.inputs.push(input);
        }
        (RequestType::TXOUTPUT, None) => {
            let txout = tx.outputs.get(index).ok_or_else(missing)?;
            let mut output = TxOutputType::new();
            output.set_address(txout.address.clone());
            output.set_amount(txout.amount.to_sat());
            output.set_script_type(output_script_type(txout.script_type));
            ack_tx.outputs.push(output);
        }
        (other, _) => {
            return Err(VendorError::Device(format!(
                "unsupported signing request {other:?}"
            )))
        }
    }

    let mut ack = protos::TxAck::new();
    ack.tx = Some(ack_tx).into();
    Ok(ack)
}

/// Read a recovery word typed by the user, the device shows which one it wants
fn prompt_word() -> Result<String, VendorError> {
    eprint!("Type the word requested on the Trezor screen: ");
    let mut word = String::new();
    std::io::stdin().lock().read_line(&mut word)?;
    Ok(word.trim().to_lowercase())
}

impl TrezorApi for TrezorUsb {
    fn features(&self) -> Result<Features, VendorError> {
        let features: protos::Features = self.call(protos::GetFeatures::new())?;
        Ok(Features {
            vendor: features.vendor().to_string(),
            initialized: features.initialized(),
            label: features.has_label().then(|| features.label().to_string()),
        })
    }

    fn get_public_node(&self, path: &DerivationPath, coin_name: &str) -> Result<Xpub, VendorError> {
        let mut request = protos::GetPublicKey::new();
        request.address_n = address_n(path);
        request.set_coin_name(coin_name.to_string());
        let node: protos::PublicKey = self.call(request)?;
        Xpub::from_str(node.xpub())
            .map_err(|e| VendorError::Device(format!("device returned an invalid xpub: {e}")))
    }

    fn get_address(
        &self,
        path: &DerivationPath,
        coin_name: &str,
        script_type: InputScriptType,
        show_display: bool,
    ) -> Result<String, VendorError> {
        let mut request = protos::GetAddress::new();
        request.address_n = address_n(path);
        request.set_coin_name(coin_name.to_string());
        request.set_script_type(input_script_type(script_type));
        request.set_show_display(show_display);
        let address: protos::Address = self.call(request)?;
        Ok(address.address().to_string())
    }

    fn sign_tx(&self, tx: &SignTx) -> Result<Vec<Option<ecdsa::Signature>>, VendorError> {
        let mut request = protos::SignTx::new();
        request.set_inputs_count(tx.inputs.len() as u32);
        request.set_outputs_count(tx.outputs.len() as u32);
        request.set_coin_name(tx.coin_name.to_string());
        request.set_version(tx.version as u32);
        request.set_lock_time(tx.lock_time);

        self.with_device(|device| {
            let mut signatures = vec![None; tx.inputs.len()];
            let mut reply = self.exchange(device, request)?;
            loop {
                let tx_request: protos::TxRequest = parse(reply)?;
                let serialized = &tx_request.serialized;
                if serialized.has_signature_index() {
                    let i = serialized.signature_index() as usize;
                    let sig = ecdsa::Signature::from_der(serialized.signature())
                        .map_err(|e| VendorError::Device(format!("invalid signature: {e}")))?;
                    let slot = signatures.get_mut(i).ok_or_else(|| {
                        VendorError::Device(format!("signature for missing input #{i}"))
                    })?;
                    *slot = Some(sig);
                }
                if tx_request.request_type() == RequestType::TXFINISHED {
                    break;
                }
                reply = self.exchange(device, tx_ack(&tx_request, tx)?)?;
            }
            Ok(signatures)
        })
    }

    fn reset_device(&self, label: &str, passphrase_protection: bool) -> Result<(), VendorError> {
        let mut request = protos::ResetDevice::new();
        request.set_strength(256);
        request.set_label(label.to_string());
        request.set_passphrase_protection(passphrase_protection);

        self.with_device(|device| {
            let _: protos::EntropyRequest = parse(self.exchange(device, request)?)?;
            let mut ack = protos::EntropyAck::new();
            ack.set_entropy(rand::random::<[u8; 32]>().to_vec());
            let _: protos::Success = parse(self.exchange(device, ack)?)?;
            Ok(())
        })
    }

    fn recovery_device(
        &self,
        label: &str,
        passphrase_protection: bool,
    ) -> Result<(), VendorError> {
        let mut request = protos::RecoveryDevice::new();
        request.set_word_count(24);
        request.set_label(label.to_string());
        request.set_passphrase_protection(passphrase_protection);
        request.set_enforce_wordlist(true);

        self.with_device(|device| {
            let mut reply = self.exchange(device, request)?;
            while reply.message_type() == protos::WordRequest::MESSAGE_TYPE {
                let mut ack = protos::WordAck::new();
                ack.set_word(prompt_word()?);
                reply = self.exchange(device, ack)?;
            }
            let _: protos::Success = parse(reply)?;
            Ok(())
        })
    }

    fn wipe_device(&self) -> Result<(), VendorError> {
        let _: protos::Success = self.call(protos::WipeDevice::new())?;
        Ok(())
    }

    fn close(&self) -> Result<(), VendorError> {
        self.device
            .lock()
            .map_err(|_| VendorError::Transport("unable to get lock".into()))?
            .take();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_bytes() {
        let txid =
            Txid::from_str("4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b")
                .unwrap();
        assert_eq!(
            hex_string(&display_bytes(&txid)),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    fn hex_string(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_script_types() {
        assert_eq!(
            input_script_type(InputScriptType::SpendP2shWitness),
            protos::InputScriptType::SPENDP2SHWITNESS
        );
        assert_eq!(
            output_script_type(OutputScriptType::PayToWitness),
            protos::OutputScriptType::PAYTOWITNESS
        );
    }
}
