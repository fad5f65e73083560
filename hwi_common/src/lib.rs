#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! A crate containing common code used in multiple other crate in the workspace, such as:
//!
//!  * [`DeviceType`] and [`DeviceDescriptor`]: what the enumerator reports for every connected
//!    hardware wallet
//!  * [`Capabilities`]: the per-device support matrix, checked before any device I/O
//!  * [`ScriptType`]: classification of PSBT inputs, needed to check signing support
//!  * [`HardwareWallet`] trait: contains the methods to be implemented by a device adapter such
//!    as returning an xpub or signing a PSBT
//!
//!  To avoid circular dependencies this crate must not depend on other crate of the workspace

mod capability;
mod device;
mod error;
mod path;
mod script;
mod wallet;
mod xpub;

pub use crate::capability::{Capabilities, Capability, Support};
pub use crate::device::{DeviceDescriptor, DeviceType, InvalidDeviceType};
pub use crate::error::{Error, ErrorKind};
pub use crate::path::{parse_path, path_to_string};
pub use crate::script::{classify_input, is_multisig, keys_with_fingerprint, ScriptType};
pub use crate::wallet::{AddressType, HardwareWallet};
pub use crate::xpub::{assemble_xpub, key_fingerprint, with_network};

pub use bitcoin;
