use std::convert::TryFrom;
use std::sync::Mutex;

use ledger_transport_hid::hidapi::HidApi;
use ledger_transport_hid::TransportNativeHID;

use crate::apdu::{APDUCmdVec, StatusWord};
use crate::client::Transport;
use crate::error::TransportError;

/// Transport with the Ledger device over USB HID.
pub struct TransportHID(Mutex<Option<TransportNativeHID>>);

impl TransportHID {
    pub fn new(t: TransportNativeHID) -> Self {
        Self(Mutex::new(Some(t)))
    }

    /// Open the device at the given HID `path`, as listed by the enumeration
    pub fn open_path(api: &HidApi, path: &str) -> Result<Self, TransportError> {
        let info = TransportNativeHID::list_ledgers(api)
            .find(|d| d.path().to_string_lossy() == path)
            .ok_or_else(|| format!("no Ledger at path {path}"))?;
        Ok(Self::new(TransportNativeHID::open_device(api, info)?))
    }
}

impl Transport for TransportHID {
    fn exchange(&self, cmd: &APDUCmdVec) -> Result<(StatusWord, Vec<u8>), TransportError> {
        let transport = self.0.lock().map_err(|_| "unable to get lock")?;
        let transport = transport.as_ref().ok_or("transport closed")?;
        transport
            .exchange(cmd)
            .map(|answer| {
                (
                    StatusWord::try_from(answer.retcode()).unwrap_or(StatusWord::Unknown),
                    answer.data().to_vec(),
                )
            })
            .map_err(|e| e.into())
    }

    fn close(&self) -> Result<(), TransportError> {
        // dropping the device handle releases the interface
        self.0.lock().map_err(|_| "unable to get lock")?.take();
        Ok(())
    }
}
