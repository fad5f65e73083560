use std::fmt::Write;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath};

use crate::Error;

/// Parse a derivation path given by the user.
///
/// Hardened steps can be marked with `'`, `h` or `H`, the leading `m/` is optional.
pub fn parse_path(s: &str) -> Result<DerivationPath, Error> {
    let s = s.trim().replace('H', "h");
    let s = if s == "m" || s.starts_with("m/") {
        s
    } else {
        format!("m/{}", s.trim_start_matches('/'))
    };
    DerivationPath::from_str(&s)
        .map_err(|e| Error::InvalidArgument(format!("derivation path \"{s}\": {e}")))
}

/// Format a derivation path using the given marker for hardened steps
pub fn path_to_string(path: &DerivationPath, hardened: char) -> String {
    let mut s = String::from("m");
    for child in path {
        let _ = match child {
            ChildNumber::Normal { index } => write!(s, "/{index}"),
            ChildNumber::Hardened { index } => write!(s, "/{index}{hardened}"),
        };
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_path() {
        let expected = DerivationPath::from_str("m/84'/1'/0'/0/7").unwrap();
        for s in [
            "m/84'/1'/0'/0/7",
            "m/84h/1h/0h/0/7",
            "m/84H/1H/0H/0/7",
            "84h/1h/0h/0/7",
            " m/84h/1'/0H/0/7 ",
        ] {
            assert_eq!(parse_path(s).unwrap(), expected, "{s}");
        }
        assert_eq!(parse_path("m").unwrap(), DerivationPath::master());

        for s in ["m/", "m/x", "m/84hh", "m//1", "m/4294967296"] {
            let err = parse_path(s).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{s}");
        }
    }

    #[test]
    fn test_path_to_string() {
        let path = parse_path("m/49h/0h/0h/1/3").unwrap();
        assert_eq!(path_to_string(&path, '\''), "m/49'/0'/0'/1/3");
        assert_eq!(path_to_string(&path, 'h'), "m/49h/0h/0h/1/3");
        assert_eq!(path_to_string(&DerivationPath::master(), 'h'), "m");
    }
}
