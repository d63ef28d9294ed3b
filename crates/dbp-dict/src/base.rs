//! RFC 6733 base-protocol tables: AVP codes, command codes and the
//! definitions preloaded into [`Dictionary::base`](crate::Dictionary::base).

use crate::data_type::AvpDataType;

/// AVP codes of the base protocol.
pub mod avp_code {
    pub const USER_NAME: u32 = 1;
    pub const CLASS: u32 = 25;
    pub const ACCT_SESSION_ID: u32 = 44;
    pub const EVENT_TIMESTAMP: u32 = 55;
    pub const ACCT_INTERIM_INTERVAL: u32 = 85;
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const ACCT_APPLICATION_ID: u32 = 259;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const REDIRECT_HOST_USAGE: u32 = 261;
    pub const REDIRECT_MAX_CACHE_TIME: u32 = 262;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const SUPPORTED_VENDOR_ID: u32 = 265;
    pub const VENDOR_ID: u32 = 266;
    pub const FIRMWARE_REVISION: u32 = 267;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const SESSION_BINDING: u32 = 270;
    pub const SESSION_SERVER_FAILOVER: u32 = 271;
    pub const MULTI_ROUND_TIME_OUT: u32 = 272;
    pub const DISCONNECT_CAUSE: u32 = 273;
    pub const AUTH_REQUEST_TYPE: u32 = 274;
    pub const AUTH_GRACE_PERIOD: u32 = 276;
    pub const AUTH_SESSION_STATE: u32 = 277;
    pub const ORIGIN_STATE_ID: u32 = 278;
    pub const FAILED_AVP: u32 = 279;
    pub const PROXY_HOST: u32 = 280;
    pub const ERROR_MESSAGE: u32 = 281;
    pub const ROUTE_RECORD: u32 = 282;
    pub const DESTINATION_REALM: u32 = 283;
    pub const PROXY_INFO: u32 = 284;
    pub const RE_AUTH_REQUEST_TYPE: u32 = 285;
    pub const ACCOUNTING_SUB_SESSION_ID: u32 = 287;
    pub const REDIRECT_HOST: u32 = 292;
    pub const DESTINATION_HOST: u32 = 293;
    pub const ERROR_REPORTING_HOST: u32 = 294;
    pub const TERMINATION_CAUSE: u32 = 295;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;
    pub const INBAND_SECURITY_ID: u32 = 299;
    pub const ACCOUNTING_RECORD_TYPE: u32 = 480;
    pub const ACCOUNTING_REALTIME_REQUIRED: u32 = 483;
    pub const ACCOUNTING_RECORD_NUMBER: u32 = 485;
}

/// Command codes of the base protocol.
pub mod cmd_code {
    pub const CAPABILITIES_EXCHANGE: u32 = 257;
    pub const RE_AUTH: u32 = 258;
    pub const ACCOUNTING: u32 = 271;
    pub const ABORT_SESSION: u32 = 274;
    pub const SESSION_TERMINATION: u32 = 275;
    pub const DEVICE_WATCHDOG: u32 = 280;
    pub const DISCONNECT_PEER: u32 = 282;
}

/// The base protocol application id.
pub const BASE_APP_ID: u32 = 0;

pub(crate) const BASE_AVPS: &[(u32, &str, AvpDataType)] = &[
    (avp_code::USER_NAME, "User-Name", AvpDataType::Utf8String),
    (avp_code::CLASS, "Class", AvpDataType::OctetString),
    (avp_code::ACCT_SESSION_ID, "Acct-Session-Id", AvpDataType::OctetString),
    (avp_code::EVENT_TIMESTAMP, "Event-Timestamp", AvpDataType::Time),
    (avp_code::ACCT_INTERIM_INTERVAL, "Acct-Interim-Interval", AvpDataType::Unsigned32),
    (avp_code::HOST_IP_ADDRESS, "Host-IP-Address", AvpDataType::Address),
    (avp_code::AUTH_APPLICATION_ID, "Auth-Application-Id", AvpDataType::Unsigned32),
    (avp_code::ACCT_APPLICATION_ID, "Acct-Application-Id", AvpDataType::Unsigned32),
    (
        avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
        "Vendor-Specific-Application-Id",
        AvpDataType::Grouped,
    ),
    (avp_code::REDIRECT_HOST_USAGE, "Redirect-Host-Usage", AvpDataType::Enumerated),
    (avp_code::REDIRECT_MAX_CACHE_TIME, "Redirect-Max-Cache-Time", AvpDataType::Unsigned32),
    (avp_code::SESSION_ID, "Session-Id", AvpDataType::Utf8String),
    (avp_code::ORIGIN_HOST, "Origin-Host", AvpDataType::DiameterIdentity),
    (avp_code::SUPPORTED_VENDOR_ID, "Supported-Vendor-Id", AvpDataType::Unsigned32),
    (avp_code::VENDOR_ID, "Vendor-Id", AvpDataType::Unsigned32),
    (avp_code::FIRMWARE_REVISION, "Firmware-Revision", AvpDataType::Unsigned32),
    (avp_code::RESULT_CODE, "Result-Code", AvpDataType::Unsigned32),
    (avp_code::PRODUCT_NAME, "Product-Name", AvpDataType::Utf8String),
    (avp_code::SESSION_BINDING, "Session-Binding", AvpDataType::Unsigned32),
    (avp_code::SESSION_SERVER_FAILOVER, "Session-Server-Failover", AvpDataType::Enumerated),
    (avp_code::MULTI_ROUND_TIME_OUT, "Multi-Round-Time-Out", AvpDataType::Unsigned32),
    (avp_code::DISCONNECT_CAUSE, "Disconnect-Cause", AvpDataType::Enumerated),
    (avp_code::AUTH_REQUEST_TYPE, "Auth-Request-Type", AvpDataType::Enumerated),
    (avp_code::AUTH_GRACE_PERIOD, "Auth-Grace-Period", AvpDataType::Unsigned32),
    (avp_code::AUTH_SESSION_STATE, "Auth-Session-State", AvpDataType::Enumerated),
    (avp_code::ORIGIN_STATE_ID, "Origin-State-Id", AvpDataType::Unsigned32),
    (avp_code::FAILED_AVP, "Failed-AVP", AvpDataType::Grouped),
    (avp_code::PROXY_HOST, "Proxy-Host", AvpDataType::DiameterIdentity),
    (avp_code::ERROR_MESSAGE, "Error-Message", AvpDataType::Utf8String),
    (avp_code::ROUTE_RECORD, "Route-Record", AvpDataType::DiameterIdentity),
    (avp_code::DESTINATION_REALM, "Destination-Realm", AvpDataType::DiameterIdentity),
    (avp_code::PROXY_INFO, "Proxy-Info", AvpDataType::Grouped),
    (avp_code::RE_AUTH_REQUEST_TYPE, "Re-Auth-Request-Type", AvpDataType::Enumerated),
    (avp_code::ACCOUNTING_SUB_SESSION_ID, "Accounting-Sub-Session-Id", AvpDataType::Unsigned64),
    (avp_code::REDIRECT_HOST, "Redirect-Host", AvpDataType::DiameterUri),
    (avp_code::DESTINATION_HOST, "Destination-Host", AvpDataType::DiameterIdentity),
    (avp_code::ERROR_REPORTING_HOST, "Error-Reporting-Host", AvpDataType::DiameterIdentity),
    (avp_code::TERMINATION_CAUSE, "Termination-Cause", AvpDataType::Enumerated),
    (avp_code::ORIGIN_REALM, "Origin-Realm", AvpDataType::DiameterIdentity),
    (avp_code::EXPERIMENTAL_RESULT, "Experimental-Result", AvpDataType::Grouped),
    (avp_code::EXPERIMENTAL_RESULT_CODE, "Experimental-Result-Code", AvpDataType::Unsigned32),
    (avp_code::INBAND_SECURITY_ID, "Inband-Security-Id", AvpDataType::Unsigned32),
    (avp_code::ACCOUNTING_RECORD_TYPE, "Accounting-Record-Type", AvpDataType::Enumerated),
    (
        avp_code::ACCOUNTING_REALTIME_REQUIRED,
        "Accounting-Realtime-Required",
        AvpDataType::Enumerated,
    ),
    (avp_code::ACCOUNTING_RECORD_NUMBER, "Accounting-Record-Number", AvpDataType::Unsigned32),
];

pub(crate) const BASE_COMMANDS: &[(u32, &str, &str)] = &[
    (cmd_code::CAPABILITIES_EXCHANGE, "Capabilities-Exchange", "CE"),
    (cmd_code::RE_AUTH, "Re-Auth", "RA"),
    (cmd_code::ACCOUNTING, "Accounting", "AC"),
    (cmd_code::ABORT_SESSION, "Abort-Session", "AS"),
    (cmd_code::SESSION_TERMINATION, "Session-Termination", "ST"),
    (cmd_code::DEVICE_WATCHDOG, "Device-Watchdog", "DW"),
    (cmd_code::DISCONNECT_PEER, "Disconnect-Peer", "DP"),
];
