use hwi_common::DeviceType;

/// Errors returned by the vendor clients and the adapters built on them
#[derive(thiserror::Error, Debug)]
pub enum VendorError {
    /// The device, or the vendor library talking to it, reported a failure
    #[error("{0}")]
    Device(String),

    /// The channel to the device failed
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid PSBT: {0}")]
    InvalidPsbt(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device is already initialized. Use wipe first and try again")]
    AlreadyInitialized,

    #[error("Device is not initialized")]
    NotInitialized,

    #[error("The device does not support {0} via software")]
    Unavailable(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VendorError {
    /// An input that can't be classified makes the whole PSBT invalid
    pub(crate) fn invalid_psbt(e: hwi_common::Error) -> Self {
        match e {
            hwi_common::Error::InvalidArgument(m) => VendorError::InvalidPsbt(m),
            e => VendorError::InvalidPsbt(e.to_string()),
        }
    }

    /// Convert into the uniform error of a command on a device of the given type
    pub fn into_common(self, device_type: DeviceType) -> hwi_common::Error {
        match self {
            VendorError::Transport(m) => hwi_common::Error::Connection(m),
            VendorError::InvalidPsbt(m) | VendorError::InvalidArgument(m) => {
                hwi_common::Error::InvalidArgument(m)
            }
            e => hwi_common::Error::vendor(device_type, e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hwi_common::ErrorKind;

    #[test]
    fn test_into_common() {
        let e = VendorError::AlreadyInitialized.into_common(DeviceType::TrezorOne);
        assert_eq!(e.kind(), ErrorKind::Vendor);
        assert_eq!(
            e.to_string(),
            "trezor error: Device is already initialized. Use wipe first and try again"
        );

        let e = VendorError::Transport("unplugged".into()).into_common(DeviceType::KeepKey);
        assert_eq!(e.kind(), ErrorKind::Connection);

        let e = VendorError::InvalidPsbt("no keys".into()).into_common(DeviceType::Coldcard);
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    }
}
