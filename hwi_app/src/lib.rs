#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! Find hardware wallets and run commands on them.
//!
//! A [`Backend`] lists and opens devices, the [`Enumerator`] probes every vendor through it and
//! the [`Dispatcher`] runs a [`Request`] on the selected device inside a [`Session`], returning a
//! [`Response`] ready to be printed as JSON.

mod backend;
mod config;
mod dispatcher;
mod enumerator;
mod hid;
mod response;
mod session;

pub use backend::Backend;
pub use config::Config;
pub use dispatcher::{Command, Dispatcher, Request, State, Target};
pub use enumerator::{Enumerator, Probed};
pub use hid::{HidBackend, EMULATOR_PATH_PREFIX, USB_IDS};
pub use response::{ErrorResponse, Response, ResponseKind, UNKNOWN_ERROR_CODE};
pub use session::Session;

pub use hwi_common::{Error, ErrorKind};
pub use hwi_signer;
