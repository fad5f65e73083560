use std::fmt;

use crate::{DeviceType, Error, ScriptType};

/// Whether a device supports a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    Yes,

    /// Includes the features that do not apply to the device ("N/A")
    No,

    /// Support status has not been established for the device ("??")
    Unknown,
}

/// A single row of the support matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    GetXpub,
    SignMessage,
    DisplayAddress,
    Setup,
    Wipe,
    Restore,
    Backup,

    /// Signing transactions spending inputs of the given type
    SignInput(ScriptType),

    /// Signing a transaction mixing segwit and non-segwit inputs
    MixedSegwitInputs,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::GetXpub => write!(f, "xpub retrieval"),
            Capability::SignMessage => write!(f, "message signing"),
            Capability::DisplayAddress => write!(f, "displaying addresses"),
            Capability::Setup => write!(f, "device setup"),
            Capability::Wipe => write!(f, "device wipe"),
            Capability::Restore => write!(f, "device recovery"),
            Capability::Backup => write!(f, "device backup"),
            Capability::SignInput(t) => write!(f, "signing {t} inputs"),
            Capability::MixedSegwitInputs => write!(f, "signing mixed segwit and non-segwit inputs"),
        }
    }
}

use Capability::*;
use ScriptType::*;
use Support::{No, Unknown, Yes};

const SINGLESIG_INPUTS: [(Capability, Support); 3] = [
    (SignInput(P2pkh), Yes),
    (SignInput(P2shP2wpkh), Yes),
    (SignInput(P2wpkh), Yes),
];

const LEDGER: &[(Capability, Support)] = &[
    (GetXpub, Yes),
    (SignMessage, Yes),
    (DisplayAddress, Yes),
    (Setup, No),
    (Wipe, No),
    (Restore, No),
    (Backup, No),
    SINGLESIG_INPUTS[0],
    SINGLESIG_INPUTS[1],
    SINGLESIG_INPUTS[2],
    (SignInput(P2shMultisig), Yes),
    (SignInput(P2shP2wshMultisig), Yes),
    (SignInput(P2wshMultisig), Yes),
    (SignInput(BareMultisig), Yes),
    (SignInput(ArbitraryScriptPubkey), Yes),
    (SignInput(ArbitraryRedeemScript), Yes),
    (SignInput(ArbitraryWitnessScript), Yes),
    (MixedSegwitInputs, No),
];

const TREZOR: &[(Capability, Support)] = &[
    (GetXpub, Yes),
    (SignMessage, No),
    (DisplayAddress, Yes),
    (Setup, Yes),
    (Wipe, Yes),
    (Restore, Yes),
    (Backup, No),
    SINGLESIG_INPUTS[0],
    SINGLESIG_INPUTS[1],
    SINGLESIG_INPUTS[2],
    (SignInput(P2shMultisig), No),
    (SignInput(P2shP2wshMultisig), No),
    (SignInput(P2wshMultisig), No),
    (SignInput(BareMultisig), No),
    (SignInput(ArbitraryScriptPubkey), No),
    (SignInput(ArbitraryRedeemScript), No),
    (SignInput(ArbitraryWitnessScript), No),
    (MixedSegwitInputs, Yes),
];

const DIGITAL_BITBOX: &[(Capability, Support)] = &[
    (GetXpub, Yes),
    (SignMessage, No),
    (DisplayAddress, No),
    (Setup, Yes),
    (Wipe, Yes),
    (Restore, No),
    (Backup, Yes),
    SINGLESIG_INPUTS[0],
    SINGLESIG_INPUTS[1],
    SINGLESIG_INPUTS[2],
    (SignInput(P2shMultisig), Yes),
    (SignInput(P2shP2wshMultisig), Yes),
    (SignInput(P2wshMultisig), Yes),
    (SignInput(BareMultisig), No),
    (SignInput(ArbitraryScriptPubkey), Yes),
    (SignInput(ArbitraryRedeemScript), Yes),
    (SignInput(ArbitraryWitnessScript), Yes),
    (MixedSegwitInputs, Yes),
];

const KEEPKEY: &[(Capability, Support)] = &[
    (GetXpub, Yes),
    (SignMessage, No),
    (DisplayAddress, No),
    (Setup, Yes),
    (Wipe, Yes),
    (Restore, Yes),
    (Backup, No),
    SINGLESIG_INPUTS[0],
    SINGLESIG_INPUTS[1],
    SINGLESIG_INPUTS[2],
    (SignInput(P2shMultisig), No),
    (SignInput(P2shP2wshMultisig), No),
    (SignInput(P2wshMultisig), No),
    (SignInput(BareMultisig), No),
    (SignInput(ArbitraryScriptPubkey), No),
    (SignInput(ArbitraryRedeemScript), No),
    (SignInput(ArbitraryWitnessScript), No),
    (MixedSegwitInputs, Yes),
];

const COLDCARD: &[(Capability, Support)] = &[
    (GetXpub, Yes),
    (SignMessage, No),
    (DisplayAddress, Yes),
    (Setup, No),
    (Wipe, No),
    (Restore, No),
    (Backup, Yes),
    SINGLESIG_INPUTS[0],
    SINGLESIG_INPUTS[1],
    SINGLESIG_INPUTS[2],
    (SignInput(P2shMultisig), Unknown),
    (SignInput(P2shP2wshMultisig), Unknown),
    (SignInput(P2wshMultisig), Unknown),
    (SignInput(BareMultisig), Unknown),
    (SignInput(ArbitraryScriptPubkey), Unknown),
    (SignInput(ArbitraryRedeemScript), Unknown),
    (SignInput(ArbitraryWitnessScript), Unknown),
    (MixedSegwitInputs, Yes),
];

/// The capability set of a device type.
///
/// Backed by static tables, rows missing from a table are treated as [`Support::No`].
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    device_type: DeviceType,
    table: &'static [(Capability, Support)],
}

impl Capabilities {
    pub fn of(device_type: DeviceType) -> Self {
        let table = match device_type {
            DeviceType::LedgerNanoS => LEDGER,
            DeviceType::TrezorOne => TREZOR,
            DeviceType::DigitalBitBox => DIGITAL_BITBOX,
            DeviceType::KeepKey => KEEPKEY,
            DeviceType::Coldcard => COLDCARD,
        };
        Self { device_type, table }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn support(&self, capability: Capability) -> Support {
        self.table
            .iter()
            .find(|(c, _)| *c == capability)
            .map(|(_, s)| *s)
            .unwrap_or(Support::No)
    }

    /// Fails with [`Error::Unsupported`] unless the capability is supported.
    ///
    /// Capabilities with [`Support::Unknown`] pass only if `allow_untested` is set.
    pub fn check(&self, capability: Capability, allow_untested: bool) -> Result<(), Error> {
        match self.support(capability) {
            Support::Yes => Ok(()),
            Support::Unknown if allow_untested => {
                tracing::warn!(
                    "{} is untested on {}, proceeding anyway",
                    capability,
                    self.device_type
                );
                Ok(())
            }
            Support::Unknown => Err(Error::Unsupported {
                device_type: self.device_type,
                capability,
                untested: true,
            }),
            Support::No => Err(Error::Unsupported {
                device_type: self.device_type,
                capability,
                untested: false,
            }),
        }
    }

    /// All the rows of the matrix for this device type
    pub fn iter(&self) -> impl Iterator<Item = &(Capability, Support)> {
        self.table.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn xpub_supported_everywhere() {
        for device_type in DeviceType::ALL {
            let caps = Capabilities::of(device_type);
            assert_eq!(caps.support(GetXpub), Yes);
            caps.check(GetXpub, false).unwrap();
        }
    }

    #[test]
    fn sign_message_only_ledger() {
        let supporting: Vec<_> = DeviceType::ALL
            .into_iter()
            .filter(|d| Capabilities::of(*d).support(SignMessage) == Yes)
            .collect();
        assert_eq!(supporting, vec![DeviceType::LedgerNanoS]);
    }

    #[test]
    fn coldcard_multisig_is_unknown() {
        let caps = Capabilities::of(DeviceType::Coldcard);
        let cap = SignInput(P2wshMultisig);
        assert_eq!(caps.support(cap), Unknown);
        let err = caps.check(cap, false).unwrap_err();
        assert!(matches!(err, Error::Unsupported { untested: true, .. }));
        caps.check(cap, true).unwrap();
    }

    #[test]
    fn every_table_is_complete() {
        for device_type in DeviceType::ALL {
            let caps = Capabilities::of(device_type);
            assert_eq!(caps.iter().count(), 18, "{device_type}");
        }
    }

    #[test]
    fn no_is_never_allowed() {
        let caps = Capabilities::of(DeviceType::TrezorOne);
        let err = caps.check(SignInput(BareMultisig), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "trezor does not support signing bare multisig inputs"
        );
    }
}
