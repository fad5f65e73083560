use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use hwi_app::ResponseKind;
use hwi_common::bitcoin::bip32::Fingerprint;
use hwi_common::DeviceType;

/// Command line interface to Bitcoin hardware wallets.
///
/// Supports Ledger Nano S, Trezor One, Digital BitBox, KeepKey and Coldcard. Results are printed
/// on stdout as JSON, errors on stderr as `{"error": ..., "code": ...}`.
#[derive(Parser, Debug)]
#[command(name = "hwi", author, version, about, long_about = None)]
pub struct Cli {
    /// Type of the device to use, one of: ledger, trezor, digitalbitbox, keepkey, coldcard
    #[arg(short = 't', long, requires = "device_path")]
    pub device_type: Option<DeviceType>,

    /// Path of the device to use, as returned by `enumerate`
    #[arg(short = 'd', long, requires = "device_type")]
    pub device_path: Option<String>,

    /// Use the device with this master key fingerprint
    #[arg(short = 'f', long, conflicts_with_all = ["device_type", "device_path"])]
    pub fingerprint: Option<Fingerprint>,

    /// Device password or passphrase, if the device needs one
    #[arg(short = 'p', long, default_value = "", hide_default_value = true)]
    pub password: String,

    /// Use testnet instead of mainnet
    #[arg(long)]
    pub testnet: bool,

    /// Allow operations whose support on the device has not been established
    #[arg(long)]
    pub allow_untested: bool,

    /// Address of a Ledger emulator (Speculos APDU port) to use along the physical devices
    #[arg(long, env = "HWI_LEDGER_EMULATOR")]
    pub ledger_emulator: Option<String>,

    /// Directory where backup files are written
    #[arg(long, env = "HWI_BACKUP_DIR", default_value = ".")]
    pub backup_dir: PathBuf,

    /// The sub command
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// List the connected hardware wallets
    Enumerate,

    /// Get the extended public key at the given derivation path
    #[command(name = "getxpub")]
    GetXpub {
        /// For example m/84h/0h/0h
        path: String,
    },

    /// Sign a message with the key at the given derivation path
    #[command(name = "signmessage")]
    SignMessage { message: String, path: String },

    /// Sign a PSBT, the result has the signatures added
    #[command(name = "signtx")]
    SignTx {
        /// Base64 encoded PSBT
        psbt: String,
    },

    /// Show the address of the key at the given derivation path on the device screen
    #[command(name = "displayaddress")]
    DisplayAddress {
        path: String,

        /// Nested segwit address (P2SH-P2WPKH)
        #[arg(long, conflicts_with = "wpkh")]
        sh_wpkh: bool,

        /// Native segwit address (P2WPKH)
        #[arg(long)]
        wpkh: bool,
    },

    /// Create a new seed on the device, with the password as passphrase if given
    Setup {
        #[arg(long, default_value = "")]
        label: String,
    },

    /// Erase the device
    Wipe,

    /// Restore the device from a mnemonic entered on the device
    Restore {
        #[arg(long, default_value = "")]
        label: String,
    },

    /// Backup the device seed
    Backup,

    /// Returns the JSON schema of the result printed by a command.
    ///
    /// For example `schema getxpub` describes the fields printed by `getxpub`
    Schema { command: SchemaCommand },

    #[clap(hide = true)]
    GenerateCompletion { shell: Shell },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SchemaCommand {
    Enumerate,
    #[value(name = "getxpub")]
    GetXpub,
    #[value(name = "signmessage")]
    SignMessage,
    #[value(name = "signtx")]
    SignTx,
    #[value(name = "displayaddress")]
    DisplayAddress,
    Setup,
    Wipe,
    Restore,
    Backup,
}

impl From<SchemaCommand> for ResponseKind {
    fn from(value: SchemaCommand) -> Self {
        match value {
            SchemaCommand::Enumerate => ResponseKind::Enumerate,
            SchemaCommand::GetXpub => ResponseKind::GetXpub,
            SchemaCommand::SignMessage => ResponseKind::SignMessage,
            SchemaCommand::SignTx => ResponseKind::SignTx,
            SchemaCommand::DisplayAddress => ResponseKind::DisplayAddress,
            SchemaCommand::Setup => ResponseKind::Setup,
            SchemaCommand::Wipe => ResponseKind::Wipe,
            SchemaCommand::Restore => ResponseKind::Restore,
            SchemaCommand::Backup => ResponseKind::Backup,
        }
    }
}
