use core::fmt::Debug;

use hwi_common::bitcoin::bip32::DerivationPath;
use hwi_common::bitcoin::secp256k1::PublicKey;
use hwi_common::bitcoin::{Script, Transaction, TxOut};
use hwi_common::AddressType;

use crate::apdu::{APDUCmdVec, StatusWord};
use crate::command::{self, UntrustedInput};
use crate::error::{Error, TransportError};

/// Public key data returned by the device for a derivation path
#[derive(Debug, Clone)]
pub struct WalletPublicKey {
    pub public_key: PublicKey,
    pub address: String,
    pub chain_code: [u8; 32],
}

/// BtchipClient calls and interprets commands of the Ledger Bitcoin app.
pub struct BtchipClient<T: Transport> {
    transport: T,
}

impl<T: Transport> Debug for BtchipClient<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BtchipClient").finish()
    }
}

impl<T: Transport> BtchipClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn make_request(&self, req: &APDUCmdVec) -> Result<Vec<u8>, Error> {
        tracing::debug!(
            "=> {:02x}{:02x}{:02x}{:02x} {}",
            req.cla,
            req.ins,
            req.p1,
            req.p2,
            hex::encode(&req.data)
        );
        let (sw, data) = self.transport.exchange(req).map_err(Error::Transport)?;
        tracing::debug!("<= {:?} {}", sw, hex::encode(&data));

        if sw != StatusWord::OK {
            Err(Error::Device {
                status: sw,
                command: req.ins,
            })
        } else {
            Ok(data)
        }
    }

    /// Send all the commands in order, returning the answer to the last one
    fn make_requests(&self, reqs: &[APDUCmdVec]) -> Result<Vec<u8>, Error> {
        let mut last = vec![];
        for req in reqs {
            last = self.make_request(req)?;
        }
        Ok(last)
    }

    /// Retrieve the public key, the address and the chain code at the given path
    pub fn get_wallet_public_key(
        &self,
        path: &DerivationPath,
        display: bool,
        address_type: AddressType,
    ) -> Result<WalletPublicKey, Error> {
        let cmd = command::get_wallet_public_key(path, display, address_type);
        let data = self.make_request(&cmd)?;
        let unexpected = || Error::UnexpectedResult {
            command: cmd.ins,
            data: data.clone(),
        };

        let pk_len = *data.first().ok_or_else(unexpected)? as usize;
        let pk = data.get(1..1 + pk_len).ok_or_else(unexpected)?;
        let public_key = PublicKey::from_slice(pk).map_err(|_| unexpected())?;

        let offset = 1 + pk_len;
        let addr_len = *data.get(offset).ok_or_else(unexpected)? as usize;
        let addr = data
            .get(offset + 1..offset + 1 + addr_len)
            .ok_or_else(unexpected)?;
        let address = String::from_utf8(addr.to_vec()).map_err(|_| unexpected())?;

        let offset = offset + 1 + addr_len;
        let chain_code: [u8; 32] = data
            .get(offset..offset + 32)
            .and_then(|c| c.try_into().ok())
            .ok_or_else(unexpected)?;

        Ok(WalletPublicKey {
            public_key,
            address,
            chain_code,
        })
    }

    /// Sign a message, returns the DER signature with the parity of R in the first byte
    pub fn sign_message(&self, path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>, Error> {
        self.make_requests(&command::sign_message_prepare(path, message))?;
        tracing::info!("Waiting for the user to confirm the message on the Ledger");
        self.make_request(&command::sign_message_sign())
    }

    /// Obtain a trusted input for the output `index` of `prev_tx`
    pub fn get_trusted_input(&self, prev_tx: &Transaction, index: u32) -> Result<Vec<u8>, Error> {
        self.make_requests(&command::get_trusted_input(prev_tx, index))
    }

    pub fn start_untrusted_transaction(
        &self,
        new_transaction: bool,
        segwit: bool,
        version: i32,
        inputs: &[UntrustedInput],
        input_index: usize,
        script: &Script,
    ) -> Result<(), Error> {
        self.make_requests(&command::hash_input_start(
            new_transaction,
            segwit,
            version,
            inputs,
            input_index,
            script,
        ))?;
        Ok(())
    }

    pub fn finalize_input_full(
        &self,
        change_path: Option<&DerivationPath>,
        outputs: &[TxOut],
    ) -> Result<(), Error> {
        tracing::info!("Waiting for the user to confirm the outputs on the Ledger");
        self.make_requests(&command::hash_input_finalize_full(change_path, outputs))?;
        Ok(())
    }

    /// Sign the hashed transaction, returns the DER signature followed by the sighash type
    pub fn untrusted_hash_sign(
        &self,
        path: &DerivationPath,
        lock_time: u32,
        sighash_type: u8,
    ) -> Result<Vec<u8>, Error> {
        let cmd = command::untrusted_hash_sign(path, lock_time, sighash_type);
        let mut data = self.make_request(&cmd)?;
        match data.first_mut() {
            // the first byte carries the parity of R instead of the DER sequence tag
            Some(first) => *first = 0x30,
            None => {
                return Err(Error::UnexpectedResult {
                    command: cmd.ins,
                    data,
                })
            }
        }
        Ok(data)
    }

    pub fn close(&self) -> Result<(), Error> {
        self.transport.close().map_err(Error::Transport)
    }
}

/// Communication layer between the bitcoin client and the Ledger device.
pub trait Transport {
    fn exchange(&self, command: &APDUCmdVec) -> Result<(StatusWord, Vec<u8>), TransportError>;

    /// Release the underlying channel, exchanges after closing fail
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&self, command: &APDUCmdVec) -> Result<(StatusWord, Vec<u8>), TransportError> {
        (**self).exchange(command)
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }
}
