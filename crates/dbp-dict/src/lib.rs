//! Diameter dictionary: declared AVP data types, the RFC 6733 base-protocol
//! tables and the application registry consumed by the handshake.

pub mod base;
pub mod data_type;
pub mod dictionary;

pub use base::{avp_code, cmd_code, BASE_APP_ID};
pub use data_type::{AppKind, AvpDataType};
pub use dictionary::{default, ApplicationDef, AvpDef, CommandDef, DictError, Dictionary};
