//! Protocol constants shared across the endpoint.

/// Diameter protocol version.
pub const VERSION: u8 = 1;

/// Default Diameter port (RFC 6733 section 2.1).
pub const DEFAULT_PORT: u16 = 3868;

/// Result-Code AVP values.
pub mod result_code {
    pub const SUCCESS: u32 = 2001;

    // Protocol errors (E bit).
    pub const COMMAND_UNSUPPORTED: u32 = 3001;
    pub const UNABLE_TO_DELIVER: u32 = 3002;
    pub const APPLICATION_UNSUPPORTED: u32 = 3007;
    pub const INVALID_HDR_BITS: u32 = 3008;
    pub const INVALID_AVP_BITS: u32 = 3009;

    // Permanent failures.
    pub const AVP_UNSUPPORTED: u32 = 5001;
    pub const INVALID_AVP_VALUE: u32 = 5004;
    pub const MISSING_AVP: u32 = 5005;
    pub const NO_COMMON_APPLICATION: u32 = 5010;
    pub const UNSUPPORTED_VERSION: u32 = 5011;
    pub const UNABLE_TO_COMPLY: u32 = 5012;
    pub const INVALID_MESSAGE_LENGTH: u32 = 5015;
    pub const NO_COMMON_SECURITY: u32 = 5017;
}

/// Inband-Security-Id AVP values.
pub mod inband_security {
    pub const NO_INBAND_SECURITY: u32 = 0;
    pub const TLS: u32 = 1;
}

/// Disconnect-Cause AVP values.
pub mod disconnect_cause {
    pub const REBOOTING: i32 = 0;
    pub const BUSY: i32 = 1;
    pub const DO_NOT_WANT_TO_TALK_TO_YOU: i32 = 2;
}
