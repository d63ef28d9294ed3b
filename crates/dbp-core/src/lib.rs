//! Bit-exact codec for the Diameter base protocol: typed AVP payloads,
//! AVP framing with grouped recursion, and the 20-byte message header.
//!
//! Decoding is dictionary-driven: the type of every AVP payload comes from
//! the [`dbp_dict::Dictionary`] resolution of `(application, code, vendor)`.

pub mod avp;
pub mod constants;
pub mod datatype;
pub mod error;
pub mod message;

pub use avp::Avp;
pub use constants::{disconnect_cause, inband_security, result_code, DEFAULT_PORT, VERSION};
pub use datatype::AvpValue;
pub use error::{CodecError, Result};
pub use message::{Header, Message};
