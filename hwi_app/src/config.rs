use std::path::PathBuf;

use hwi_common::bitcoin::NetworkKind;

/// Options shared by every command, usually coming from the command line
#[derive(Clone, Debug)]
pub struct Config {
    pub network: NetworkKind,

    /// Password or passphrase for the devices requiring one, empty if not given
    pub password: String,

    /// Allow operations whose support on the device is not established
    pub allow_untested: bool,

    /// Address of a Ledger Speculos emulator to list along the physical devices
    pub ledger_emulator: Option<String>,

    /// Where the backup files downloaded from devices are written
    pub backup_dir: PathBuf,

    /// Open every device found while enumerating to read its fingerprint
    pub fingerprints: bool,
}

impl Config {
    pub fn default_mainnet() -> Self {
        Self {
            network: NetworkKind::Main,
            password: String::new(),
            allow_untested: false,
            ledger_emulator: None,
            backup_dir: PathBuf::from("."),
            fingerprints: true,
        }
    }

    pub fn default_testnet() -> Self {
        Self {
            network: NetworkKind::Test,
            ..Self::default_mainnet()
        }
    }

    /// True if Bitcoin mainnet
    pub fn is_mainnet(&self) -> bool {
        matches!(self.network, NetworkKind::Main)
    }
}
