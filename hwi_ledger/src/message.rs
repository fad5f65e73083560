use hwi_common::bitcoin::sign_message::MessageSignature;

use crate::apdu::BtchipCommandCode;
use crate::Error;

/// Header of a compact signature made with a compressed key, recovery id is added to it
const COMPACT_HEADER_COMPRESSED: u8 = 27 + 4;

/// Convert the signature returned by the sign message command to the compact recoverable format.
///
/// The device returns a DER signature where the first byte, instead of the sequence tag, carries
/// the parity of R in its lowest bit.
pub fn compact_signature(sig: &[u8]) -> Result<MessageSignature, Error> {
    let unexpected = || Error::UnexpectedResult {
        command: BtchipCommandCode::SignMessage as u8,
        data: sig.to_vec(),
    };

    let r_len = *sig.get(3).ok_or_else(unexpected)? as usize;
    let r = sig.get(4..4 + r_len).ok_or_else(unexpected)?;
    let s_len = *sig.get(4 + r_len + 1).ok_or_else(unexpected)? as usize;
    let s_start = 4 + r_len + 2;
    let s = sig.get(s_start..s_start + s_len).ok_or_else(unexpected)?;

    let mut compact = vec![COMPACT_HEADER_COMPRESSED + (sig[0] & 0x01)];
    compact.extend(to_32_bytes(r).ok_or_else(unexpected)?);
    compact.extend(to_32_bytes(s).ok_or_else(unexpected)?);

    MessageSignature::from_slice(&compact).map_err(|_| unexpected())
}

/// Strip the DER sign padding and left pad to 32 bytes
fn to_32_bytes(n: &[u8]) -> Option<[u8; 32]> {
    let n = match n {
        [0x00, rest @ ..] if n.len() == 33 => rest,
        _ => n,
    };
    if n.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - n.len()..].copy_from_slice(n);
    Some(out)
}
