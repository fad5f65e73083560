use hwi_common::DeviceDescriptor;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of a command sent to a device, printed as a JSON object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Response {
    Xpub {
        /// Extended public key, in the version of the selected network
        xpub: String,
    },

    Signature {
        /// Compact recoverable signature, base64 encoded
        signature: String,
    },

    Psbt {
        /// The PSBT with the signatures added, base64 encoded
        psbt: String,
    },

    Address {
        address: String,
    },

    Success {
        success: bool,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Response {
    pub fn success() -> Self {
        Response::Success {
            success: true,
            message: None,
        }
    }
}

/// Code of the failures not covered by [`hwi_common::ErrorKind`]
pub const UNKNOWN_ERROR_CODE: i32 = -13;

/// Printed on stderr when a command fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: i32,
}

impl ErrorResponse {
    pub fn unknown(error: impl std::fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            code: UNKNOWN_ERROR_CODE,
        }
    }
}

impl From<&hwi_common::Error> for ErrorResponse {
    fn from(e: &hwi_common::Error) -> Self {
        Self {
            error: e.to_string(),
            code: e.code(),
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct XpubResponse {
    xpub: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct SignatureResponse {
    signature: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct PsbtResponse {
    psbt: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct AddressResponse {
    address: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct SuccessResponse {
    success: bool,
    message: Option<String>,
}

/// The commands, as far as the shape of their response is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Enumerate,
    GetXpub,
    SignMessage,
    SignTx,
    DisplayAddress,
    Setup,
    Wipe,
    Restore,
    Backup,
}

impl ResponseKind {
    /// The JSON schema of the response printed by the command
    pub fn schema(&self) -> Result<Value, serde_json::Error> {
        let schema = match self {
            ResponseKind::Enumerate => schema_for!(Vec<DeviceDescriptor>),
            ResponseKind::GetXpub => schema_for!(XpubResponse),
            ResponseKind::SignMessage => schema_for!(SignatureResponse),
            ResponseKind::SignTx => schema_for!(PsbtResponse),
            ResponseKind::DisplayAddress => schema_for!(AddressResponse),
            ResponseKind::Setup
            | ResponseKind::Wipe
            | ResponseKind::Restore
            | ResponseKind::Backup => schema_for!(SuccessResponse),
        };
        serde_json::to_value(schema)
    }
}
