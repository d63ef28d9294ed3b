//! AVP framing (RFC 6733 section 4.1).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           AVP Code                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V M P r r r r r|                  AVP Length                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Vendor-ID (if V set)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Data ...
//! +-+-+-+-+-+-+-+-+
//! ```

use std::fmt;

use bytes::{Bytes, BytesMut};
use dbp_dict::{AvpDataType, Dictionary};

use crate::datatype::AvpValue;
use crate::error::{CodecError, Result};

/// AVP flag bits. Undefined bits are preserved on parse, zero on construct.
pub mod flags {
    /// Vendor-specific bit.
    pub const V: u8 = 0x80;
    /// Mandatory bit.
    pub const M: u8 = 0x40;
    /// Protected bit (end-to-end security, historical).
    pub const P: u8 = 0x20;
}

/// AVP header size without the Vendor-ID field.
pub const HEADER_LEN: usize = 8;
/// AVP header size with the Vendor-ID field.
pub const HEADER_LEN_VENDOR: usize = 12;

/// A Diameter attribute-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Avp {
    pub code: u32,
    pub flags: u8,
    /// Header plus unpadded payload length, as carried on the wire.
    /// The on-wire footprint including padding is [`Avp::padded_len`].
    pub length: u32,
    pub vendor_id: u32,
    pub data: AvpValue,
}

impl Avp {
    /// Create an AVP. The V bit is set automatically when `vendor_id` is
    /// non-zero, and `length` is computed from the header and payload.
    pub fn new(code: u32, flags: u8, vendor_id: u32, data: AvpValue) -> Self {
        let mut avp = Self {
            code,
            flags,
            length: 0,
            vendor_id,
            data,
        };
        if vendor_id != 0 {
            avp.flags |= flags::V;
        }
        avp.length = (avp.header_len() + avp.data.len()) as u32;
        avp
    }

    /// Header length: 12 bytes with the V bit, 8 without.
    pub fn header_len(&self) -> usize {
        if self.flags & flags::V == flags::V {
            HEADER_LEN_VENDOR
        } else {
            HEADER_LEN
        }
    }

    /// Total on-wire size including trailing padding.
    pub fn padded_len(&self) -> usize {
        (self.length as usize + 3) / 4 * 4
    }

    pub fn is_mandatory(&self) -> bool {
        self.flags & flags::M == flags::M
    }

    /// Decode one AVP from the front of `data`, resolving its declared type
    /// through the dictionary under the given application id.
    pub fn decode(data: &[u8], application: u32, dict: &Dictionary) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::ShortHeader(data.len()));
        }
        let code = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let avp_flags = data[4];
        let length = u32::from_be_bytes([0, data[5], data[6], data[7]]) as usize;

        let header_len = if avp_flags & flags::V == flags::V {
            HEADER_LEN_VENDOR
        } else {
            HEADER_LEN
        };
        if length < header_len {
            return Err(CodecError::ShortHeader(length));
        }
        if data.len() < length {
            return Err(CodecError::Truncated {
                declared: length,
                available: data.len(),
            });
        }
        // Padding lives outside the declared length.
        let data = &data[..length];

        let vendor_id = if header_len == HEADER_LEN_VENDOR {
            u32::from_be_bytes([data[8], data[9], data[10], data[11]])
        } else {
            0
        };

        let def = dict.find_avp(application, code, vendor_id)?;
        let payload = &data[header_len..];
        let value = AvpValue::decode(def.data_type, payload, application, dict)?;

        Ok(Self {
            code,
            flags: avp_flags,
            length: length as u32,
            vendor_id,
            data: value,
        })
    }

    /// Decode the child AVPs of a grouped payload, in order.
    pub(crate) fn decode_grouped(
        payload: &[u8],
        application: u32,
        dict: &Dictionary,
    ) -> Result<Vec<Avp>> {
        let mut avps = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let avp = Avp::decode(&payload[offset..], application, dict)?;
            offset += avp.padded_len();
            avps.push(avp);
        }
        if offset > payload.len() {
            return Err(CodecError::Malformed(
                "grouped AVP padding overruns payload".to_string(),
            ));
        }
        Ok(avps)
    }

    /// Append the wire form of this AVP, padding included.
    ///
    /// The length field is recomputed from the header and payload; the
    /// recomputed value is authoritative over the stored one.
    pub fn put(&self, buf: &mut BytesMut) {
        let header_len = self.header_len();
        let length = (header_len + self.data.len()) as u32;

        buf.reserve(self.data.len() + header_len + self.data.padding());
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(&[
            self.flags,
            (length >> 16) as u8,
            (length >> 8) as u8,
            length as u8,
        ]);
        if header_len == HEADER_LEN_VENDOR {
            buf.extend_from_slice(&self.vendor_id.to_be_bytes());
        }
        self.data.put(buf);
        for _ in 0..self.data.padding() {
            buf.extend_from_slice(&[0]);
        }
    }

    /// Serialize to a standalone buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.put(&mut buf);
        buf.freeze()
    }

    /// The declared data type of the payload.
    pub fn data_type(&self) -> AvpDataType {
        self.data.data_type()
    }
}

impl fmt::Display for Avp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{code:{},flags:0x{:x},length:{},vendor:{},value:{}}}",
            self.code,
            self.flags,
            self.padded_len(),
            self.vendor_id,
            self.data,
        )
    }
}
