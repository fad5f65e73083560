use core::convert::TryFrom;

use ledger_apdu::APDUCommand;

pub type APDUCmdVec = APDUCommand<Vec<u8>>;

/// Class of the commands of the Ledger Bitcoin app (legacy "btchip" protocol)
pub const CLA_BTCHIP: u8 = 0xE0;

/// Maximum length of the data of a single APDU
pub const MAX_DATA_LEN: usize = 255;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BtchipCommandCode {
    GetWalletPublicKey = 0x40,
    GetTrustedInput = 0x42,
    HashInputStart = 0x44,
    HashSign = 0x48,
    HashInputFinalizeFull = 0x4A,
    SignMessage = 0x4E,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusWord {
    /// Wrong length of the data
    WrongLength = 0x6700,
    /// Device is locked, PIN required
    SecurityStatusNotSatisfied = 0x6982,
    /// Rejected by user
    Deny = 0x6985,
    /// Incorrect Data
    IncorrectData = 0x6A80,
    /// Wrong P1P2
    WrongP1P2 = 0x6B00,
    /// Ins not supported
    InsNotSupported = 0x6D00,
    /// Cla not supported, usually the Bitcoin app is not open
    ClaNotSupported = 0x6E00,
    /// Success
    OK = 0x9000,
    /// Unknown
    Unknown,
}

impl TryFrom<u16> for StatusWord {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x6700 => Ok(StatusWord::WrongLength),
            0x6982 => Ok(StatusWord::SecurityStatusNotSatisfied),
            0x6985 => Ok(StatusWord::Deny),
            0x6A80 => Ok(StatusWord::IncorrectData),
            0x6B00 => Ok(StatusWord::WrongP1P2),
            0x6D00 => Ok(StatusWord::InsNotSupported),
            0x6E00 => Ok(StatusWord::ClaNotSupported),
            0x9000 => Ok(StatusWord::OK),
            _ => Err(()),
        }
    }
}

pub fn apdu(ins: BtchipCommandCode, p1: u8, p2: u8, data: Vec<u8>) -> APDUCmdVec {
    APDUCmdVec {
        cla: CLA_BTCHIP,
        ins: ins as u8,
        p1,
        p2,
        data,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_word() {
        assert_eq!(StatusWord::try_from(0x9000), Ok(StatusWord::OK));
        assert_eq!(StatusWord::try_from(0x6985), Ok(StatusWord::Deny));
        assert!(StatusWord::try_from(0x1234).is_err());
    }

    #[test]
    fn test_apdu_serialize() {
        let cmd = apdu(BtchipCommandCode::SignMessage, 0x80, 0x00, vec![0x00]);
        assert_eq!(cmd.serialize(), vec![0xE0, 0x4E, 0x80, 0x00, 0x01, 0x00]);
    }
}
