use std::str::FromStr;
use std::sync::Arc;

use hwi_common::bitcoin::bip32::DerivationPath;
use hwi_common::bitcoin::{Network, NetworkKind, PublicKey};
use hwi_common::{AddressType, HardwareWallet};
use hwi_signer::{InputScriptType, OutputScriptType, Trezor, VendorError};
use hwi_test_util::{psbt, SimulatedTrezor, Stats, TestSeed, OTHER_MNEMONIC};

fn trezor() -> (Trezor, SimulatedTrezor, Arc<Stats>) {
    let stats = Arc::new(Stats::default());
    let sim = SimulatedTrezor::new(TestSeed::default(), stats.clone());
    let trezor = Trezor::new(Box::new(sim.clone()), NetworkKind::Test, "");
    (trezor, sim, stats)
}

#[test]
fn test_xpub() {
    let (trezor, _, _) = trezor();
    let path = DerivationPath::from_str("m/84h/1h/0h").unwrap();
    let xpub = trezor.get_extended_pubkey(&path).unwrap();
    assert_eq!(xpub, TestSeed::default().xpub(&path, NetworkKind::Test));
}

#[test]
fn test_display_address() {
    let (trezor, _, _) = trezor();
    let path = DerivationPath::from_str(psbt::P2SH_P2WPKH_PATH).unwrap();
    let address = trezor.display_address(&path, AddressType::ShWpkh).unwrap();
    let expected = TestSeed::default().address(&path, AddressType::ShWpkh, Network::Testnet);
    assert_eq!(address, expected);
}

#[test]
fn test_sign() {
    let (trezor, sim, _) = trezor();
    let seed = TestSeed::default();
    let mut psbt = psbt::p2wpkh(&seed);

    assert_eq!(trezor.sign_psbt(&mut psbt).unwrap(), 1);
    assert_eq!(psbt.inputs[0].partial_sigs.len(), 1);

    let request = sim.last_sign_tx().unwrap();
    assert_eq!(request.coin_name, "Testnet");
    assert_eq!(request.inputs.len(), 1);
    assert_eq!(request.inputs[0].script_type, InputScriptType::SpendWitness);
    assert_eq!(
        request.inputs[0].address_n,
        Some(DerivationPath::from_str(psbt::P2WPKH_PATH).unwrap())
    );
    assert_eq!(request.outputs.len(), 2);
    assert!(request
        .outputs
        .iter()
        .all(|o| o.script_type == OutputScriptType::PayToWitness && o.address.starts_with("tb1")));
    assert!(request.prev_txs.is_empty());
}

#[test]
fn test_sign_legacy_sends_prev_tx() {
    let (trezor, sim, _) = trezor();
    let mut psbt = psbt::p2pkh(&TestSeed::default());

    assert_eq!(trezor.sign_psbt(&mut psbt).unwrap(), 1);
    let request = sim.last_sign_tx().unwrap();
    assert_eq!(request.inputs[0].script_type, InputScriptType::SpendAddress);
    assert_eq!(request.prev_txs.len(), 1);
}

#[test]
fn test_sign_segwit_with_prev_txs() {
    let (trezor, sim, _) = trezor();
    let mut psbt = psbt::segwit_with_prev_txs(&TestSeed::default());

    assert_eq!(trezor.sign_psbt(&mut psbt).unwrap(), 3);
    let request = sim.last_sign_tx().unwrap();
    let script_types: Vec<_> = request.inputs.iter().map(|i| i.script_type).collect();
    assert_eq!(
        script_types,
        vec![
            InputScriptType::SpendWitness,
            InputScriptType::SpendP2shWitness,
            InputScriptType::SpendWitness
        ]
    );
    assert_eq!(request.inputs[0].amount.to_sat(), 40_000);
    assert_eq!(request.prev_txs.len(), 3);
}

#[test]
fn test_foreign_input_not_signed() {
    let (trezor, sim, _) = trezor();
    let mut psbt = psbt::p2wpkh(&TestSeed::new(OTHER_MNEMONIC));

    assert_eq!(trezor.sign_psbt(&mut psbt).unwrap(), 0);
    assert!(psbt.inputs[0].partial_sigs.is_empty());
    assert_eq!(sim.last_sign_tx().unwrap().inputs[0].address_n, None);
}

#[test]
fn test_multiple_keys_rejected() {
    let (trezor, sim, _) = trezor();
    let seed = TestSeed::default();
    let other = TestSeed::new(OTHER_MNEMONIC);
    let mut psbt = psbt::p2wpkh(&seed);
    let path = DerivationPath::from_str(psbt::P2WPKH_PATH).unwrap();
    psbt.inputs[0]
        .bip32_derivation
        .insert(other.public_key(&path), (other.fingerprint(), path));

    let err = trezor.sign_psbt(&mut psbt).unwrap_err();
    assert!(matches!(err, VendorError::Device(ref m) if m == "Cannot sign multisig yet"));
    assert!(sim.last_sign_tx().is_none());
}

#[test]
fn test_input_without_key_rejected() {
    let (trezor, _, _) = trezor();
    let mut psbt = psbt::p2wpkh(&TestSeed::default());
    psbt.inputs[0].bip32_derivation.clear();

    let err = trezor.sign_psbt(&mut psbt).unwrap_err();
    assert!(matches!(err, VendorError::InvalidPsbt(_)));
}

#[test]
fn test_setup_wipe_restore() {
    let stats = Arc::new(Stats::default());
    let sim = SimulatedTrezor::new(TestSeed::default(), stats).uninitialized();
    let trezor = Trezor::new(Box::new(sim.clone()), NetworkKind::Test, "secret");

    trezor.setup("my trezor", "secret").unwrap();
    assert!(sim.passphrase_protection());

    let err = trezor.setup("again", "").unwrap_err();
    assert!(matches!(err, VendorError::AlreadyInitialized));
    assert!(matches!(
        trezor.restore("again").unwrap_err(),
        VendorError::AlreadyInitialized
    ));

    trezor.wipe().unwrap();
    trezor.restore("restored").unwrap();
    assert!(sim.passphrase_protection());
}

#[test]
fn test_keepkey() {
    let stats = Arc::new(Stats::default());
    let sim = SimulatedTrezor::keepkey(TestSeed::default(), stats.clone());
    let keepkey = Trezor::keepkey(Box::new(sim.clone()), NetworkKind::Test, "");
    assert_eq!(keepkey.device_type(), hwi_common::DeviceType::KeepKey);

    let path = DerivationPath::from_str(psbt::P2WPKH_PATH).unwrap();
    let err = keepkey.display_address(&path, AddressType::Wpkh).unwrap_err();
    assert!(matches!(err, VendorError::Unavailable(_)));

    // KeepKey firmwares cannot pay to segwit outputs
    let mut psbt = psbt::p2wpkh(&TestSeed::default());
    let err = keepkey.sign_psbt(&mut psbt).unwrap_err();
    assert!(matches!(err, VendorError::Device(_)));
    assert!(sim.last_sign_tx().is_none());
}

#[test]
fn test_close() {
    let (trezor, _, stats) = trezor();
    trezor.close().unwrap();
    assert_eq!(stats.closed(), 1);
}

#[test]
fn test_signature_key() {
    let (trezor, _, _) = trezor();
    let seed = TestSeed::default();
    let mut psbt = psbt::p2wpkh(&seed);
    trezor.sign_psbt(&mut psbt).unwrap();

    let path = DerivationPath::from_str(psbt::P2WPKH_PATH).unwrap();
    let key = PublicKey::new(seed.public_key(&path));
    assert!(psbt.inputs[0].partial_sigs.contains_key(&key));
}
