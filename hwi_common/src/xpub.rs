use bitcoin::bip32::{ChildNumber, Fingerprint, Xpub};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;
use bitcoin::NetworkKind;

use crate::Error;

const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
const TPUB_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

/// The first 4 bytes of the hash160 of the compressed key
pub fn key_fingerprint(public_key: &PublicKey) -> Fingerprint {
    let hash = hash160::Hash::hash(&public_key.serialize()).to_byte_array();
    Fingerprint::from([hash[0], hash[1], hash[2], hash[3]])
}

/// Build an xpub from the parts devices return separately.
///
/// `parent` is the public key of the parent node, `None` for the master node.
pub fn assemble_xpub(
    network: NetworkKind,
    depth: u8,
    parent: Option<&PublicKey>,
    child_number: ChildNumber,
    chain_code: &[u8; 32],
    public_key: &PublicKey,
) -> Result<Xpub, Error> {
    let parent_fingerprint = parent.map(key_fingerprint).unwrap_or_default();

    let mut data = Vec::with_capacity(78);
    data.extend(match network {
        NetworkKind::Main => XPUB_VERSION,
        NetworkKind::Test => TPUB_VERSION,
    });
    data.push(depth);
    data.extend(parent_fingerprint.to_bytes());
    data.extend(u32::from(child_number).to_be_bytes());
    data.extend(chain_code);
    data.extend(public_key.serialize());

    Xpub::decode(&data).map_err(|e| Error::InvalidArgument(format!("cannot build xpub: {e}")))
}

/// Same extended key with the version bytes of the given network
pub fn with_network(xpub: Xpub, network: NetworkKind) -> Xpub {
    Xpub { network, ..xpub }
}
