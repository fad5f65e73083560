use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::Fingerprint;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The families of hardware wallets this interface knows how to talk to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum DeviceType {
    /// Ledger Nano S running the Bitcoin app
    #[serde(rename = "ledger")]
    LedgerNanoS,

    /// Trezor One
    #[serde(rename = "trezor")]
    TrezorOne,

    /// Digital BitBox (the first generation BitBox)
    #[serde(rename = "digitalbitbox")]
    DigitalBitBox,

    /// KeepKey
    #[serde(rename = "keepkey")]
    KeepKey,

    /// Coinkite Coldcard
    #[serde(rename = "coldcard")]
    Coldcard,
}

impl DeviceType {
    /// Every supported device type, in probing order
    pub const ALL: [DeviceType; 5] = [
        DeviceType::LedgerNanoS,
        DeviceType::TrezorOne,
        DeviceType::DigitalBitBox,
        DeviceType::KeepKey,
        DeviceType::Coldcard,
    ];

    /// The name used on the command line and in the JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::LedgerNanoS => "ledger",
            DeviceType::TrezorOne => "trezor",
            DeviceType::DigitalBitBox => "digitalbitbox",
            DeviceType::KeepKey => "keepkey",
            DeviceType::Coldcard => "coldcard",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error type returned by DeviceType::from_str
#[derive(Error, Debug)]
#[error("Invalid device type '{0}' supported types are: 'ledger', 'trezor', 'digitalbitbox', 'keepkey', 'coldcard'")]
pub struct InvalidDeviceType(String);

impl FromStr for DeviceType {
    type Err = InvalidDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "ledger" => DeviceType::LedgerNanoS,
            "trezor" => DeviceType::TrezorOne,
            "digitalbitbox" => DeviceType::DigitalBitBox,
            "keepkey" => DeviceType::KeepKey,
            "coldcard" => DeviceType::Coldcard,
            v => return Err(InvalidDeviceType(v.to_string())),
        })
    }
}

/// A connected device as seen by the enumerator.
///
/// Descriptors are snapshots: they are never updated, enumerating again produces new ones.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct DeviceDescriptor {
    /// The device family
    #[serde(rename = "type")]
    pub device_type: DeviceType,

    /// Opaque transport path, as returned by the HID layer or the emulator address
    pub path: String,

    /// Master key fingerprint, available if the device was opened during enumeration
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "fingerprint_hex"
    )]
    #[schemars(with = "Option<String>")]
    pub fingerprint: Option<Fingerprint>,

    /// Why the fingerprint could not be read, if it was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(device_type: DeviceType, path: impl Into<String>) -> Self {
        Self {
            device_type,
            path: path.into(),
            fingerprint: None,
            error: None,
        }
    }

    /// True if this descriptor is the one selected by the given type and path
    pub fn matches(&self, device_type: DeviceType, path: &str) -> bool {
        self.device_type == device_type && self.path == path
    }
}

mod fingerprint_hex {
    use std::str::FromStr;

    use bitcoin::bip32::Fingerprint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fp: &Option<Fingerprint>, s: S) -> Result<S::Ok, S::Error> {
        match fp {
            Some(fp) => s.serialize_str(&fp.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Fingerprint>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        s.map(|s| Fingerprint::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_device_type() {
        for el in ["ledger", "trezor", "digitalbitbox", "keepkey", "coldcard"] {
            let device_type = DeviceType::from_str(el).unwrap();
            assert_eq!(el, device_type.to_string());
        }
        assert_eq!(
            DeviceType::from_str("Trezor").unwrap(),
            DeviceType::TrezorOne
        );
        DeviceType::from_str("jade").unwrap_err();
    }

    #[test]
    fn descriptor_json() {
        let mut d = DeviceDescriptor::new(DeviceType::Coldcard, "0001:0005:00");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"type": "coldcard", "path": "0001:0005:00"})
        );

        d.fingerprint = Some(Fingerprint::from([0x0f, 0x05, 0x69, 0x43]));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v.get("fingerprint").unwrap(), "0f056943");

        let back: DeviceDescriptor = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
        assert!(back.matches(DeviceType::Coldcard, "0001:0005:00"));
        assert!(!back.matches(DeviceType::TrezorOne, "0001:0005:00"));
    }
}
