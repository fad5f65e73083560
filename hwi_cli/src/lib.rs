#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! The `hwi` command line interface.
//!
//! [`inner_main`] runs the parsed [`Cli`] against the physical devices and returns the JSON value
//! to print, [`inner_main_with`] does the same through any [`Backend`].

use std::str::FromStr;

use clap::CommandFactory;
use hwi_app::{
    Backend, Command, Config, Dispatcher, Error, HidBackend, Request, ResponseKind, Target,
};
use hwi_common::bitcoin::Psbt;
use hwi_common::{parse_path, AddressType};
use serde_json::Value;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

use crate::args::CliCommand;
pub use args::{Cli, SchemaCommand};

mod args;

pub fn inner_main(args: Cli) -> anyhow::Result<Value> {
    let (appender, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(appender)
        .finish();
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(_) => tracing::info!("logging initialized"),
        Err(_) => tracing::debug!("logging already initialized"),
    }

    let backend = HidBackend::new(config(&args));
    inner_main_with(args, &backend)
}

/// The options shared by every command
pub fn config(args: &Cli) -> Config {
    let mut config = if args.testnet {
        Config::default_testnet()
    } else {
        Config::default_mainnet()
    };
    config.password.clone_from(&args.password);
    config.allow_untested = args.allow_untested;
    config.ledger_emulator.clone_from(&args.ledger_emulator);
    config.backup_dir.clone_from(&args.backup_dir);
    config
}

fn target(args: &Cli) -> Result<Target, Error> {
    match (args.fingerprint, args.device_type, &args.device_path) {
        (Some(fingerprint), _, _) => Ok(Target::Fingerprint(fingerprint)),
        (None, Some(device_type), Some(path)) => Ok(Target::Device {
            device_type,
            path: path.clone(),
        }),
        _ => Err(Error::InvalidArgument(
            "You must specify a device type and path (-t and -d) or a fingerprint (-f)".into(),
        )),
    }
}

fn parse_psbt(s: &str) -> Result<Psbt, Error> {
    Psbt::from_str(s.trim()).map_err(|e| Error::InvalidArgument(format!("invalid psbt: {e}")))
}

pub fn inner_main_with<B: Backend + ?Sized>(args: Cli, backend: &B) -> anyhow::Result<Value> {
    let config = config(&args);
    tracing::info!(
        "CLI initialized, network: {:?}, command: {:?}",
        config.network,
        args.command
    );
    let target = target(&args);

    let command = match args.command {
        CliCommand::Enumerate => {
            let devices = Dispatcher::new(backend, &config).enumerate();
            return Ok(serde_json::to_value(devices)?);
        }
        CliCommand::Schema { command } => return Ok(ResponseKind::from(command).schema()?),
        CliCommand::GenerateCompletion { shell } => {
            let mut result = vec![];
            clap_complete::generate(shell, &mut Cli::command(), "hwi", &mut result);
            return Ok(Value::String(String::from_utf8(result)?));
        }
        CliCommand::GetXpub { path } => Command::GetXpub {
            path: parse_path(&path)?,
        },
        CliCommand::SignMessage { message, path } => Command::SignMessage {
            message,
            path: parse_path(&path)?,
        },
        CliCommand::SignTx { psbt } => Command::SignTx {
            psbt: parse_psbt(&psbt)?,
        },
        CliCommand::DisplayAddress {
            path,
            sh_wpkh,
            wpkh,
        } => Command::DisplayAddress {
            path: parse_path(&path)?,
            address_type: match (sh_wpkh, wpkh) {
                (true, _) => AddressType::ShWpkh,
                (false, true) => AddressType::Wpkh,
                (false, false) => AddressType::Legacy,
            },
        },
        CliCommand::Setup { label } => Command::Setup { label },
        CliCommand::Wipe => Command::Wipe,
        CliCommand::Restore { label } => Command::Restore { label },
        CliCommand::Backup => Command::Backup,
    };

    let request = Request {
        target: target?,
        command,
    };
    let response = Dispatcher::new(backend, &config).dispatch(request)?;
    Ok(serde_json::to_value(response)?)
}
