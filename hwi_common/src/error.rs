use std::fmt;

use crate::{Capability, DeviceType};

/// The uniform error taxonomy, every failure of a command ends up as one of these variants
#[allow(missing_docs)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No device found for {0}")]
    DeviceNotFound(String),

    #[error("{count} devices match {target}, disambiguate with the device path or fingerprint")]
    AmbiguousDevice { target: String, count: usize },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{device_type} does not support {capability}{}", untested_hint(.untested))]
    Unsupported {
        device_type: DeviceType,
        capability: Capability,
        untested: bool,
    },

    #[error("{device_type} error: {message}")]
    Vendor {
        device_type: DeviceType,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn untested_hint(untested: &bool) -> &'static str {
    if *untested {
        " (untested, use --allow-untested to try anyway)"
    } else {
        ""
    }
}

/// The kind of an [`Error`] without its details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceNotFound,
    AmbiguousDevice,
    Connection,
    Unsupported,
    Vendor,
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::DeviceNotFound => "DeviceNotFound",
            ErrorKind::AmbiguousDevice => "AmbiguousDevice",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Vendor => "VendorError",
            ErrorKind::InvalidArgument => "InvalidArgument",
        };
        write!(f, "{s}")
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            Error::AmbiguousDevice { .. } => ErrorKind::AmbiguousDevice,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::Vendor { .. } => ErrorKind::Vendor,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Return error codes, no different kinds should return the same value
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::DeviceNotFound => -1,
            ErrorKind::AmbiguousDevice => -2,
            ErrorKind::Connection => -3,
            ErrorKind::Unsupported => -4,
            ErrorKind::Vendor => -5,
            ErrorKind::InvalidArgument => -6,
        }
    }

    pub fn vendor(device_type: DeviceType, message: impl fmt::Display) -> Self {
        Error::Vendor {
            device_type,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ScriptType;

    #[test]
    fn unsupported_message() {
        let e = Error::Unsupported {
            device_type: DeviceType::KeepKey,
            capability: Capability::SignMessage,
            untested: false,
        };
        assert_eq!(e.to_string(), "keepkey does not support message signing");
        assert_eq!(e.kind(), ErrorKind::Unsupported);

        let e = Error::Unsupported {
            device_type: DeviceType::Coldcard,
            capability: Capability::SignInput(ScriptType::P2shMultisig),
            untested: true,
        };
        assert!(e.to_string().contains("--allow-untested"));
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            Error::DeviceNotFound("x".into()),
            Error::AmbiguousDevice {
                target: "x".into(),
                count: 2,
            },
            Error::Connection("x".into()),
            Error::Unsupported {
                device_type: DeviceType::TrezorOne,
                capability: Capability::Backup,
                untested: false,
            },
            Error::vendor(DeviceType::TrezorOne, "x"),
            Error::InvalidArgument("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(Error::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
