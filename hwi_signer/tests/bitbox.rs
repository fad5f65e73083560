use std::str::FromStr;
use std::sync::Arc;

use hwi_common::bitcoin::bip32::DerivationPath;
use hwi_common::bitcoin::hashes::Hash;
use hwi_common::bitcoin::sighash::{EcdsaSighashType, SighashCache};
use hwi_common::bitcoin::{NetworkKind, PublicKey};
use hwi_common::HardwareWallet;
use hwi_signer::{DigitalBitBox, VendorError, MAX_HASHES_PER_REQUEST};
use hwi_test_util::psbt::{self, PsbtBuilder};
use hwi_test_util::{SimulatedBitBox, Stats, TestSeed};

fn bitbox() -> (DigitalBitBox, SimulatedBitBox, Arc<Stats>) {
    let stats = Arc::new(Stats::default());
    let sim = SimulatedBitBox::new(TestSeed::default(), stats.clone());
    let bitbox = DigitalBitBox::new(Box::new(sim.clone()), NetworkKind::Test);
    (bitbox, sim, stats)
}

#[test]
fn test_xpub() {
    let (bitbox, _, _) = bitbox();
    let path = DerivationPath::from_str("m/49h/1h/0h").unwrap();
    let xpub = bitbox.get_extended_pubkey(&path).unwrap();
    assert_eq!(xpub, TestSeed::default().xpub(&path, NetworkKind::Test));
}

#[test]
fn test_sign_p2wpkh_verifies() {
    let (bitbox, sim, _) = bitbox();
    let seed = TestSeed::default();
    let mut psbt = psbt::p2wpkh(&seed);

    assert_eq!(bitbox.sign_psbt(&mut psbt).unwrap(), 1);

    let path = DerivationPath::from_str(psbt::P2WPKH_PATH).unwrap();
    let utxo = psbt.inputs[0].witness_utxo.clone().unwrap();
    let sighash = SighashCache::new(&psbt.unsigned_tx)
        .p2wpkh_signature_hash(0, &utxo.script_pubkey, utxo.value, EcdsaSighashType::All)
        .unwrap()
        .to_byte_array();

    let key = PublicKey::new(seed.public_key(&path));
    let sig = psbt.inputs[0].partial_sigs[&key];
    assert_eq!(sig.sighash_type, EcdsaSighashType::All);
    assert!(seed.verify(&path, sighash, &sig.signature));
    assert_eq!(sim.signed(), vec![(sighash, path)]);
}

#[test]
fn test_sign_legacy_and_nested_verify() {
    let (bitbox, _, _) = bitbox();
    let seed = TestSeed::default();
    let mut psbt = PsbtBuilder::new(&seed)
        .p2pkh_input(10_000)
        .p2sh_p2wpkh_input(20_000)
        .external_output(29_000)
        .build();

    assert_eq!(bitbox.sign_psbt(&mut psbt).unwrap(), 2);

    let mut cache = SighashCache::new(&psbt.unsigned_tx);

    let path = DerivationPath::from_str(psbt::P2PKH_PATH).unwrap();
    let prev_tx = psbt.inputs[0].non_witness_utxo.as_ref().unwrap();
    let vout = psbt.unsigned_tx.input[0].previous_output.vout as usize;
    let spk = prev_tx.output[vout].script_pubkey.clone();
    let sighash = cache
        .legacy_signature_hash(0, &spk, EcdsaSighashType::All.to_u32())
        .unwrap()
        .to_byte_array();
    let sig = psbt.inputs[0].partial_sigs[&PublicKey::new(seed.public_key(&path))];
    assert!(seed.verify(&path, sighash, &sig.signature));

    let path = DerivationPath::from_str(psbt::P2SH_P2WPKH_PATH).unwrap();
    let redeem_script = psbt.inputs[1].redeem_script.clone().unwrap();
    let value = psbt.inputs[1].witness_utxo.as_ref().unwrap().value;
    let sighash = cache
        .p2wpkh_signature_hash(1, &redeem_script, value, EcdsaSighashType::All)
        .unwrap()
        .to_byte_array();
    let sig = psbt.inputs[1].partial_sigs[&PublicKey::new(seed.public_key(&path))];
    assert!(seed.verify(&path, sighash, &sig.signature));
}

#[test]
fn test_sign_in_batches() {
    let (bitbox, sim, stats) = bitbox();
    let seed = TestSeed::default();
    let mut builder = PsbtBuilder::new(&seed);
    for _ in 0..MAX_HASHES_PER_REQUEST + 2 {
        builder = builder.p2wpkh_input(1_000);
    }
    let mut psbt = builder.external_output(10_000).build();

    let calls_before = stats.calls();
    let signed = bitbox.sign_psbt(&mut psbt).unwrap() as usize;
    assert_eq!(signed, MAX_HASHES_PER_REQUEST + 2);
    assert_eq!(sim.signed().len(), signed);
    assert!(psbt.inputs.iter().all(|i| i.partial_sigs.len() == 1));
    // fingerprint lookup plus two signing requests
    assert_eq!(stats.calls() - calls_before, 3);
}

#[test]
fn test_setup_requires_password() {
    let stats = Arc::new(Stats::default());
    let sim = SimulatedBitBox::new(TestSeed::default(), stats.clone()).uninitialized();
    let bitbox = DigitalBitBox::new(Box::new(sim.clone()), NetworkKind::Test);

    let err = bitbox.setup("label", "").unwrap_err();
    assert!(matches!(err, VendorError::InvalidArgument(_)));
    assert_eq!(stats.calls(), 0);

    bitbox.setup("label", "password").unwrap();
    assert_eq!(sim.backups().len(), 1);
    assert!(matches!(
        bitbox.setup("label", "password").unwrap_err(),
        VendorError::AlreadyInitialized
    ));
}

#[test]
fn test_backup() {
    let (bitbox, sim, _) = bitbox();
    let message = bitbox.backup().unwrap();
    let backups = sim.backups();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].starts_with("backup-") && backups[0].ends_with(".pdf"));
    assert!(message.contains(&backups[0]));
}

#[test]
fn test_unavailable() {
    let (bitbox, _, stats) = bitbox();
    let path = DerivationPath::from_str("m/44h/1h/0h/0/0").unwrap();
    assert!(matches!(
        bitbox.sign_message("hi", &path).unwrap_err(),
        VendorError::Unavailable(_)
    ));
    assert!(bitbox.restore("label").is_err());
    assert_eq!(stats.calls(), 0);
}
