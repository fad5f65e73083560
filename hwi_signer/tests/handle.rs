use std::str::FromStr;
use std::sync::Arc;

use hwi_common::bitcoin::bip32::DerivationPath;
use hwi_common::bitcoin::{Network, NetworkKind};
use hwi_common::{
    AddressType, Capability, DeviceType, Error, ErrorKind, HardwareWallet, ScriptType,
};
use hwi_ledger::{Ledger, Transport};
use hwi_signer::{AnyDevice, Coldcard, DeviceHandle, DigitalBitBox, Trezor};
use hwi_test_util::psbt::{self, PsbtBuilder};
use hwi_test_util::{
    SimulatedBitBox, SimulatedColdcard, SimulatedLedger, SimulatedTrezor, Stats, TestSeed,
};

fn ledger(stats: Arc<Stats>) -> AnyDevice {
    let sim = SimulatedLedger::new(TestSeed::default(), Network::Testnet, stats);
    let transport: Box<dyn Transport> = Box::new(sim);
    AnyDevice::Ledger(Ledger::new(transport, NetworkKind::Test))
}

fn trezor(stats: Arc<Stats>) -> AnyDevice {
    let sim = SimulatedTrezor::new(TestSeed::default(), stats);
    AnyDevice::Trezor(Trezor::new(Box::new(sim), NetworkKind::Test, ""))
}

fn keepkey(stats: Arc<Stats>) -> AnyDevice {
    let sim = SimulatedTrezor::keepkey(TestSeed::default(), stats);
    AnyDevice::KeepKey(Trezor::keepkey(Box::new(sim), NetworkKind::Test, ""))
}

fn bitbox(stats: Arc<Stats>) -> AnyDevice {
    let sim = SimulatedBitBox::new(TestSeed::default(), stats);
    AnyDevice::DigitalBitBox(DigitalBitBox::new(Box::new(sim), NetworkKind::Test))
}

fn coldcard(stats: Arc<Stats>) -> AnyDevice {
    let sim = SimulatedColdcard::new(TestSeed::default(), Network::Testnet, stats);
    AnyDevice::Coldcard(Coldcard::new(
        Box::new(sim),
        NetworkKind::Test,
        std::env::temp_dir(),
    ))
}

fn path(s: &str) -> DerivationPath {
    DerivationPath::from_str(s).unwrap()
}

#[test]
fn test_xpub_on_every_device() {
    let seed = TestSeed::default();
    let p = path("m/84h/1h/0h");
    for make in [ledger, trezor, keepkey, bitbox, coldcard] {
        let stats = Arc::new(Stats::default());
        let handle = DeviceHandle::new(make(stats.clone()), false);
        let xpub = handle.get_extended_pubkey(&p).unwrap();
        assert_eq!(xpub, seed.xpub(&p, NetworkKind::Test), "{}", handle.device_type());
        assert_eq!(handle.fingerprint().unwrap(), seed.fingerprint());
        assert!(stats.calls() > 0);
    }
}

#[test]
fn test_unsupported_message_signing_does_no_io() {
    for make in [trezor, keepkey, bitbox, coldcard] {
        let stats = Arc::new(Stats::default());
        let handle = DeviceHandle::new(make(stats.clone()), true);
        let err = handle
            .sign_message("hello", &path("m/44h/1h/0h/0/0"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(matches!(
            err,
            Error::Unsupported {
                capability: Capability::SignMessage,
                untested: false,
                ..
            }
        ));
        assert_eq!(stats.calls(), 0);
    }
}

#[test]
fn test_keepkey_display_address_unsupported() {
    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(keepkey(stats.clone()), false);
    let err = handle
        .display_address(&path(psbt::P2WPKH_PATH), AddressType::Wpkh)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(stats.calls(), 0);
}

#[test]
fn test_trezor_rejects_bare_multisig_before_signing() {
    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(trezor(stats.clone()), false);
    let mut psbt = psbt::p2wpkh_and_bare_multisig(&TestSeed::default());

    let err = handle.sign_psbt(&mut psbt).unwrap_err();
    assert!(matches!(
        err,
        Error::Unsupported {
            device_type: DeviceType::TrezorOne,
            capability: Capability::SignInput(ScriptType::BareMultisig),
            ..
        }
    ));
    assert!(psbt.inputs.iter().all(|i| i.partial_sigs.is_empty()));
    assert_eq!(stats.calls(), 0);
}

#[test]
fn test_ledger_rejects_mixed_inputs() {
    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(ledger(stats.clone()), false);
    let mut psbt = psbt::mixed(&TestSeed::default());

    let err = handle.sign_psbt(&mut psbt).unwrap_err();
    assert!(matches!(
        err,
        Error::Unsupported {
            capability: Capability::MixedSegwitInputs,
            ..
        }
    ));
    assert_eq!(stats.calls(), 0);

    // trezor signs the same transaction
    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(trezor(stats), false);
    assert_eq!(handle.sign_psbt(&mut psbt).unwrap(), 2);
}

#[test]
fn test_untested_needs_allow_untested() {
    let seed = TestSeed::default();
    let make_psbt = || {
        PsbtBuilder::new(&seed)
            .p2wsh_multisig_input(50_000)
            .external_output(49_000)
            .build()
    };

    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(coldcard(stats.clone()), false);
    let mut psbt = make_psbt();
    let err = handle.sign_psbt(&mut psbt).unwrap_err();
    assert!(matches!(
        err,
        Error::Unsupported {
            capability: Capability::SignInput(ScriptType::P2wshMultisig),
            untested: true,
            ..
        }
    ));
    assert!(err.to_string().contains("--allow-untested"));
    assert_eq!(stats.calls(), 0);

    let handle = DeviceHandle::new(coldcard(stats.clone()), true);
    let mut psbt = make_psbt();
    assert_eq!(handle.sign_psbt(&mut psbt).unwrap(), 1);
}

#[test]
fn test_check_psbt_classifies_inputs() {
    let handle = DeviceHandle::new(ledger(Arc::new(Stats::default())), false);
    let seed = TestSeed::default();
    let psbt = PsbtBuilder::new(&seed)
        .p2wpkh_input(1_000)
        .p2sh_p2wpkh_input(1_000)
        .p2wsh_multisig_input(1_000)
        .external_output(2_000)
        .build();
    assert_eq!(
        handle.check_psbt(&psbt).unwrap(),
        vec![
            ScriptType::P2wpkh,
            ScriptType::P2shP2wpkh,
            ScriptType::P2wshMultisig
        ]
    );
}

#[test]
fn test_invalid_psbt() {
    let handle = DeviceHandle::new(ledger(Arc::new(Stats::default())), false);
    let mut psbt = psbt::p2wpkh(&TestSeed::default());
    psbt.inputs[0].witness_utxo = None;
    let err = handle.sign_psbt(&mut psbt).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_vendor_error_converted() {
    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(trezor(stats), false);
    let err = handle.setup("label", "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Vendor);
    assert!(err.to_string().contains("already initialized"), "{err}");
}

#[test]
fn test_close_is_not_checked() {
    let stats = Arc::new(Stats::default());
    let handle = DeviceHandle::new(keepkey(stats.clone()), false);
    handle.close().unwrap();
    assert_eq!(stats.closed(), 1);
}
