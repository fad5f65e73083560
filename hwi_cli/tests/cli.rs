use clap::Parser;
use serde_json::Value;

use hwi_app::{Error, ErrorKind};
use hwi_cli::{config, inner_main_with, Cli};
use hwi_common::bitcoin::bip32::DerivationPath;
use hwi_common::bitcoin::{NetworkKind, Psbt};
use hwi_common::DeviceType;
use hwi_test_util::{
    psbt, SimulatedBackend, TestSeed, OTHER_MNEMONIC, TEST_MNEMONIC_FINGERPRINT,
};

fn backend() -> SimulatedBackend {
    SimulatedBackend::new(NetworkKind::Test)
        .with_device(DeviceType::LedgerNanoS, "tcp:127.0.0.1:9999")
        .with_device(DeviceType::TrezorOne, "0001:0005:00")
        .with_device(DeviceType::KeepKey, "0001:0006:00")
        .with_device(DeviceType::Coldcard, "0001:0007:00")
}

fn parse(command: &str) -> Cli {
    let shell_words = shellwords::split(command).unwrap();
    Cli::try_parse_from(shell_words).unwrap()
}

#[track_caller]
fn sh_result(backend: &SimulatedBackend, command: &str) -> anyhow::Result<Value> {
    inner_main_with(parse(command), backend)
}

#[track_caller]
fn sh(backend: &SimulatedBackend, command: &str) -> Value {
    sh_result(backend, command).unwrap()
}

#[track_caller]
fn sh_err(backend: &SimulatedBackend, command: &str) -> Error {
    sh_result(backend, command)
        .unwrap_err()
        .downcast::<Error>()
        .unwrap()
}

#[test]
fn test_enumerate() {
    hwi_test_util::init_logging();
    let backend = backend();
    let r = sh(&backend, "hwi --testnet enumerate");
    let devices = r.as_array().unwrap();
    assert_eq!(devices.len(), 4);
    assert_eq!(devices[0]["type"], "ledger");
    assert_eq!(devices[0]["path"], "tcp:127.0.0.1:9999");
    assert_eq!(devices[1]["type"], "trezor");
    assert_eq!(devices[2]["type"], "keepkey");
    assert_eq!(devices[3]["type"], "coldcard");
    for device in devices {
        assert_eq!(device["fingerprint"], TEST_MNEMONIC_FINGERPRINT);
    }
    assert_eq!(r, sh(&backend, "hwi --testnet enumerate"));
}

#[test]
fn test_getxpub() {
    let backend = backend();
    let seed = TestSeed::default();
    let expected = seed
        .xpub(&"m/44h/1h/0h".parse::<DerivationPath>().unwrap(), NetworkKind::Test)
        .to_string();

    let r = sh(&backend, "hwi --testnet -t trezor -d 0001:0005:00 getxpub m/44h/1h/0h");
    assert_eq!(r, serde_json::json!({ "xpub": expected }));

    // apostrophes and H mark hardened steps too
    let r = sh(&backend, "hwi --testnet -t ledger -d tcp:127.0.0.1:9999 getxpub \"m/44'/1'/0'\"");
    assert_eq!(r["xpub"], expected);

    // every device of `backend` has the same fingerprint
    let err = sh_err(
        &backend,
        &format!("hwi --testnet -f {TEST_MNEMONIC_FINGERPRINT} getxpub m/44h/1h/0h"),
    );
    assert_eq!(err.kind(), ErrorKind::AmbiguousDevice);

    let backend = SimulatedBackend::new(NetworkKind::Test)
        .with_seeded_device(DeviceType::LedgerNanoS, "tcp:1", TestSeed::new(OTHER_MNEMONIC))
        .with_device(DeviceType::TrezorOne, "0001:0005:00");
    let r = sh(
        &backend,
        &format!("hwi --testnet -f {TEST_MNEMONIC_FINGERPRINT} getxpub m/44H/1H/0H"),
    );
    assert_eq!(r["xpub"], expected);
}

#[test]
fn test_mainnet_xpub() {
    let backend = SimulatedBackend::new(NetworkKind::Main)
        .with_device(DeviceType::TrezorOne, "0001:0005:00");
    let r = sh(&backend, "hwi -t trezor -d 0001:0005:00 getxpub m/44h/0h/0h");
    assert!(r["xpub"].as_str().unwrap().starts_with("xpub"));
}

#[test]
fn test_signmessage() {
    let backend = backend();
    let r = sh(
        &backend,
        "hwi --testnet -t ledger -d tcp:127.0.0.1:9999 signmessage \"Hello world!\" m/44h/1h/0h/0/0",
    );
    assert_eq!(r["signature"].as_str().unwrap().len(), 88);

    let err = sh_err(
        &backend,
        "hwi --testnet -t keepkey -d 0001:0006:00 signmessage hello m/44h/1h/0h/0/0",
    );
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(backend.stats("0001:0006:00").calls(), 0);
}

#[test]
fn test_signtx() {
    let backend = backend();
    let unsigned = psbt::p2wpkh(&TestSeed::default());
    let r = sh(
        &backend,
        &format!("hwi --testnet -t trezor -d 0001:0005:00 signtx {unsigned}"),
    );
    let signed: Psbt = r["psbt"].as_str().unwrap().parse().unwrap();
    assert_eq!(signed.inputs[0].partial_sigs.len(), 1);

    let unsupported = psbt::p2wpkh_and_bare_multisig(&TestSeed::default());
    let err = sh_err(
        &backend,
        &format!("hwi --testnet -t trezor -d 0001:0005:00 signtx {unsupported}"),
    );
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    let err = sh_err(&backend, "hwi --testnet -t trezor -d 0001:0005:00 signtx notapsbt");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_displayaddress() {
    let backend = backend();
    let base = "hwi --testnet -t coldcard -d 0001:0007:00 displayaddress m/84h/1h/0h/0/0";
    let r = sh(&backend, &format!("{base} --wpkh"));
    assert!(r["address"].as_str().unwrap().starts_with("tb1q"));
    let r = sh(&backend, &format!("{base} --sh-wpkh"));
    assert!(r["address"].as_str().unwrap().starts_with('2'));
    let r = sh(&backend, base);
    let address = r["address"].as_str().unwrap();
    assert!(address.starts_with('m') || address.starts_with('n'));

    assert!(Cli::try_parse_from(shellwords::split(&format!("{base} --wpkh --sh-wpkh")).unwrap())
        .is_err());
}

#[test]
fn test_backup() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend().with_backup_dir(dir.path().to_path_buf());
    let r = sh(&backend, "hwi --testnet -t coldcard -d 0001:0007:00 backup");
    assert_eq!(r["success"], true);
    assert!(r["message"].as_str().unwrap().ends_with(".7z"));
}

#[test]
fn test_setup_unsupported() {
    let backend = backend();
    let err = sh_err(&backend, "hwi -t ledger -d tcp:127.0.0.1:9999 setup --label mine");
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(err.code(), -4);

    let err = sh_err(&backend, "hwi -t trezor -d 0001:0005:00 setup");
    assert_eq!(err.kind(), ErrorKind::Vendor);
}

#[test]
fn test_wrong_target() {
    let backend = backend();
    let err = sh_err(&backend, "hwi -t trezor -d 0009:0009:00 wipe");
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    assert_eq!(backend.total_opened(), 0);

    let err = sh_err(&backend, "hwi wipe");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = sh_err(&backend, "hwi -t trezor -d 0001:0005:00 getxpub m/notapath");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(backend.total_opened(), 0);
}

#[test]
fn test_parse() {
    let cli = parse("hwi -t trezor -d 0001:0005:00 -p secret --testnet --allow-untested --backup-dir /tmp/backups wipe");
    assert_eq!(cli.device_type, Some(DeviceType::TrezorOne));
    let config = config(&cli);
    assert_eq!(config.network, NetworkKind::Test);
    assert_eq!(config.password, "secret");
    assert!(config.allow_untested);
    assert_eq!(config.backup_dir, std::path::PathBuf::from("/tmp/backups"));

    let config = hwi_cli::config(&parse("hwi enumerate"));
    assert_eq!(config.network, NetworkKind::Main);
    assert!(!config.allow_untested);

    // type and path go together, fingerprint excludes both
    for invalid in [
        "hwi -t trezor wipe",
        "hwi -d 0001:0005:00 wipe",
        "hwi -t trezor -d 0001:0005:00 -f 73c5da0a wipe",
        "hwi -t jade -d 0001:0005:00 wipe",
        "hwi -f nothex wipe",
        "hwi getxpub",
        "hwi schema notacommand",
    ] {
        let words = shellwords::split(invalid).unwrap();
        assert!(Cli::try_parse_from(words).is_err(), "{invalid}");
    }
}

#[test]
fn test_schema() {
    let backend = backend();
    let r = sh(&backend, "hwi schema getxpub");
    assert!(r["properties"]["xpub"].is_object());
    let r = sh(&backend, "hwi schema enumerate");
    assert_eq!(r["type"], "array");
    let r = sh(&backend, "hwi schema signtx");
    assert!(r["properties"]["psbt"].is_object());
    assert_eq!(backend.total_opened(), 0);
}

#[test]
fn test_generate_completion() {
    let backend = backend();
    let r = sh(&backend, "hwi generate-completion bash");
    assert!(r.as_str().unwrap().contains("getxpub"));
}
