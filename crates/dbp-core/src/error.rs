use dbp_dict::{AvpDataType, DictError};
use thiserror::Error;

/// Errors produced by the AVP and message codecs.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("not enough data to decode AVP header: {0} bytes")]
    ShortHeader(usize),

    #[error("truncated: declared {declared} bytes, have {available}")]
    Truncated { declared: usize, available: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unsupported Diameter version {0}")]
    BadVersion(u8),

    #[error(transparent)]
    Dict(#[from] DictError),

    #[error("invalid {data_type} value: {reason}")]
    InvalidAvpValue {
        data_type: AvpDataType,
        reason: String,
    },
}

impl CodecError {
    /// Map to the Diameter Result-Code an answer would carry.
    pub fn to_result_code(&self) -> u32 {
        match self {
            Self::ShortHeader(_) | Self::Truncated { .. } | Self::Malformed(_) => {
                crate::constants::result_code::INVALID_MESSAGE_LENGTH
            }
            Self::BadVersion(_) => crate::constants::result_code::UNSUPPORTED_VERSION,
            Self::Dict(DictError::UnknownAvp { .. }) => {
                crate::constants::result_code::AVP_UNSUPPORTED
            }
            Self::Dict(DictError::UnknownCommand { .. }) => {
                crate::constants::result_code::COMMAND_UNSUPPORTED
            }
            Self::InvalidAvpValue { .. } => crate::constants::result_code::INVALID_AVP_VALUE,
        }
    }
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
