//! Contains the adapters of the supported hardware wallets, an [`AnyDevice`] that can be any of
//! them and the [`DeviceHandle`] checking every request against the device capabilities.
//!
//! Adapters implement [`hwi_common::HardwareWallet`]. The Ledger speaks APDUs through
//! [`hwi_ledger`], the other vendors are driven through a client trait ([`TrezorApi`],
//! [`ColdcardApi`], [`BitBoxApi`]) modeling the vendor protocol. With the `hid` feature the
//! Trezor and Coldcard clients talk to real devices over USB.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

mod any;
mod bitbox;
mod coldcard;
#[cfg(feature = "hid")]
mod coldcard_usb;
mod error;
mod handle;
mod trezor;
#[cfg(feature = "hid")]
mod trezor_usb;

pub use any::AnyDevice;
pub use bitbox::{BitBoxApi, DigitalBitBox, SignRequest, MAX_HASHES_PER_REQUEST};
pub use coldcard::{AddressFormat, Coldcard, ColdcardApi};
#[cfg(feature = "hid")]
pub use coldcard_usb::ColdcardUsb;
pub use error::VendorError;
pub use handle::DeviceHandle;
pub use trezor::{
    Features, InputScriptType, OutputScriptType, SignTx, Trezor, TrezorApi, TxInput, TxOutput,
};
#[cfg(feature = "hid")]
pub use trezor_usb::TrezorUsb;

pub use hwi_common;
pub use hwi_ledger;
