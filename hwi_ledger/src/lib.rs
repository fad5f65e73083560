#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! Talk to a Ledger Nano S running the Bitcoin app.
//!
//! Commands are encoded as APDUs (see [`command`]) and exchanged through a [`Transport`]:
//! [`TransportTcp`] for the Speculos emulator and, with the `hid` feature, `TransportHID` for
//! physical devices. [`Ledger`] implements [`hwi_common::HardwareWallet`].

mod apdu;
mod client;
pub mod command;
mod error;
mod ledger;
mod message;
#[cfg(feature = "hid")]
mod transport_hid;
mod transport_tcp;

pub use apdu::{APDUCmdVec, BtchipCommandCode, StatusWord, CLA_BTCHIP};
pub use client::{BtchipClient, Transport, WalletPublicKey};
pub use error::{Error, TransportError};
pub use ledger::Ledger;
pub use message::compact_signature;
#[cfg(feature = "hid")]
pub use transport_hid::TransportHID;
pub use transport_tcp::TransportTcp;

#[cfg(feature = "hid")]
pub use ledger_transport_hid;

/// USB vendor id of Ledger devices
pub const LEDGER_VENDOR_ID: u16 = 0x2c97;

/// USB product id of the Ledger Nano S
pub const LEDGER_DEVICE_ID: u16 = 0x0001;

/// A Ledger behind a boxed transport, so that devices behind different transports share a type
pub type AnyLedger = Ledger<Box<dyn Transport>>;

impl AnyLedger {
    /// Connect to a Speculos emulator listening at `addr`
    pub fn emulator(addr: &str, network: hwi_common::bitcoin::NetworkKind) -> Result<Self, Error> {
        let transport = TransportTcp::new(addr).map_err(Error::Transport)?;
        Ok(Ledger::new(Box::new(transport), network))
    }
}
