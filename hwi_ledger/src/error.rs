use hwi_common::DeviceType;

use crate::apdu::StatusWord;

/// Errors of the transports, boxed so that transports can be used as trait objects
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Device returned {status:?} for command 0x{command:02x}")]
    Device { command: u8, status: StatusWord },

    #[error("Unexpected result for command 0x{command:02x}: {}", hex::encode(.data))]
    UnexpectedResult { command: u8, data: Vec<u8> },

    #[error("Invalid PSBT: {0}")]
    InvalidPsbt(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The Ledger Nano S does not support {0} via software")]
    NotSupported(&'static str),
}

impl From<Error> for hwi_common::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Transport(e) => hwi_common::Error::Connection(e.to_string()),
            Error::InvalidPsbt(m) | Error::InvalidArgument(m) => {
                hwi_common::Error::InvalidArgument(m)
            }
            Error::Device {
                status: StatusWord::Deny,
                ..
            } => hwi_common::Error::vendor(DeviceType::LedgerNanoS, "Action rejected by the user"),
            Error::Device {
                status: StatusWord::SecurityStatusNotSatisfied,
                ..
            } => hwi_common::Error::vendor(DeviceType::LedgerNanoS, "Device is locked"),
            Error::Device {
                status: StatusWord::ClaNotSupported,
                ..
            } => hwi_common::Error::vendor(
                DeviceType::LedgerNanoS,
                "The Bitcoin app is not open on the device",
            ),
            e => hwi_common::Error::vendor(DeviceType::LedgerNanoS, e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hwi_common::ErrorKind;

    #[test]
    fn test_into_common() {
        let e: hwi_common::Error = Error::Transport("broken pipe".into()).into();
        assert_eq!(e.kind(), ErrorKind::Connection);

        let e: hwi_common::Error = Error::Device {
            command: 0x4e,
            status: StatusWord::Deny,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Vendor);
        assert_eq!(e.to_string(), "ledger error: Action rejected by the user");

        let e: hwi_common::Error = Error::InvalidPsbt("missing utxo".into()).into();
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    }
}
