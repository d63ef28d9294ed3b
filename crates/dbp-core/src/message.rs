//! Diameter message header and message codec (RFC 6733 section 3).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |                 Message Length                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Command Flags |                  Command Code                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Application-ID                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Hop-by-Hop Identifier                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      End-to-End Identifier                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  AVPs ...
//! +-+-+-+-+-+-+-+-
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use dbp_dict::{avp_code, Dictionary};

use crate::avp::{self, Avp};
use crate::constants::VERSION;
use crate::datatype::AvpValue;
use crate::error::{CodecError, Result};

/// Command flag bits.
pub mod flags {
    /// Request bit.
    pub const REQUEST: u8 = 0x80;
    /// Proxiable bit.
    pub const PROXIABLE: u8 = 0x40;
    /// Error bit.
    pub const ERROR: u8 = 0x20;
    /// Potentially retransmitted bit.
    pub const RETRANSMIT: u8 = 0x10;
}

/// Diameter message header size.
pub const HEADER_LEN: usize = 20;

lazy_static::lazy_static! {
    // Hop-by-Hop ids are a monotonic per-process counter; End-to-End ids
    // start at (unix time low 16 | random high 16) and wrap (RFC 6733 s3).
    static ref HOP_BY_HOP: AtomicU32 = AtomicU32::new(rand::random());
    static ref END_TO_END: AtomicU32 = AtomicU32::new(end_to_end_seed());
}

fn end_to_end_seed() -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as u32;
    (now & 0xFFFF) | ((rand::random::<u16>() as u32) << 16)
}

/// Allocate the next Hop-by-Hop identifier.
pub fn next_hop_by_hop() -> u32 {
    HOP_BY_HOP.fetch_add(1, Ordering::Relaxed)
}

/// Allocate the next End-to-End identifier.
pub fn next_end_to_end() -> u32 {
    END_TO_END.fetch_add(1, Ordering::Relaxed)
}

/// The 20-byte Diameter message header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u8,
    /// Total message length including the padding of the last AVP.
    pub length: u32,
    pub flags: u8,
    pub code: u32,
    pub application_id: u32,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

impl Header {
    pub fn is_request(&self) -> bool {
        self.flags & flags::REQUEST == flags::REQUEST
    }

    pub fn is_error(&self) -> bool {
        self.flags & flags::ERROR == flags::ERROR
    }

    pub fn is_retransmit(&self) -> bool {
        self.flags & flags::RETRANSMIT == flags::RETRANSMIT
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::Malformed(format!(
                "message header too short: {} bytes",
                data.len()
            )));
        }
        let version = data[0];
        if version != VERSION {
            return Err(CodecError::BadVersion(version));
        }
        Ok(Self {
            version,
            length: u32::from_be_bytes([0, data[1], data[2], data[3]]),
            flags: data[4],
            code: u32::from_be_bytes([0, data[5], data[6], data[7]]),
            application_id: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            hop_by_hop_id: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            end_to_end_id: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
        })
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[
            self.version,
            (self.length >> 16) as u8,
            (self.length >> 8) as u8,
            self.length as u8,
            self.flags,
            (self.code >> 16) as u8,
            (self.code >> 8) as u8,
            self.code as u8,
        ]);
        buf.extend_from_slice(&self.application_id.to_be_bytes());
        buf.extend_from_slice(&self.hop_by_hop_id.to_be_bytes());
        buf.extend_from_slice(&self.end_to_end_id.to_be_bytes());
    }
}

/// A Diameter message: header plus an ordered AVP list.
///
/// AVP order is preserved by both decode and encode; applications may
/// depend on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub avps: Vec<Avp>,
}

impl Message {
    /// Create a bare message with the given command code and application.
    pub fn new(code: u32, application_id: u32) -> Self {
        Self {
            header: Header {
                version: VERSION,
                length: HEADER_LEN as u32,
                flags: 0,
                code,
                application_id,
                hop_by_hop_id: 0,
                end_to_end_id: 0,
            },
            avps: Vec::new(),
        }
    }

    /// Create a request with freshly allocated correlation identifiers.
    pub fn request(code: u32, application_id: u32) -> Self {
        let mut m = Self::new(code, application_id);
        m.header.flags = flags::REQUEST;
        m.header.hop_by_hop_id = next_hop_by_hop();
        m.header.end_to_end_id = next_end_to_end();
        m
    }

    /// Build the answer to this request: the request bit cleared, the
    /// proxiable bit copied, correlation identifiers copied, and a
    /// Result-Code AVP prepended. Error paths set the E bit separately.
    pub fn answer(&self, result_code: u32) -> Self {
        let mut m = Self::new(self.header.code, self.header.application_id);
        m.header.flags = self.header.flags & flags::PROXIABLE;
        m.header.hop_by_hop_id = self.header.hop_by_hop_id;
        m.header.end_to_end_id = self.header.end_to_end_id;
        m.add_avp(Avp::new(
            avp_code::RESULT_CODE,
            avp::flags::M,
            0,
            AvpValue::Unsigned32(result_code),
        ));
        m
    }

    /// Mark this message as a protocol-error answer.
    pub fn set_error(&mut self) {
        self.header.flags |= flags::ERROR;
    }

    /// Mark this message as potentially retransmitted. Correlation
    /// identifiers are left untouched so the peer can deduplicate.
    pub fn set_retransmit(&mut self) {
        self.header.flags |= flags::RETRANSMIT;
    }

    /// Append an AVP, keeping insertion order.
    pub fn add_avp(&mut self, avp: Avp) -> &mut Self {
        self.avps.push(avp);
        self
    }

    /// Construct and append an AVP.
    pub fn new_avp(&mut self, code: u32, avp_flags: u8, vendor_id: u32, data: AvpValue) -> &mut Self {
        self.add_avp(Avp::new(code, avp_flags, vendor_id, data))
    }

    /// First AVP with the given code.
    pub fn avp(&self, code: u32) -> Option<&Avp> {
        self.avps.iter().find(|a| a.code == code)
    }

    /// All AVPs with the given code, in message order.
    pub fn avps(&self, code: u32) -> impl Iterator<Item = &Avp> {
        self.avps.iter().filter(move |a| a.code == code)
    }

    /// Decode a complete message. The buffer must hold at least the
    /// declared length; AVPs must tile the body exactly.
    pub fn decode(data: &[u8], dict: &Dictionary) -> Result<Self> {
        let header = Header::decode(data)?;
        let length = header.length as usize;
        if length < HEADER_LEN {
            return Err(CodecError::Malformed(format!(
                "declared message length {length} below header size"
            )));
        }
        if data.len() < length {
            return Err(CodecError::Truncated {
                declared: length,
                available: data.len(),
            });
        }

        let mut avps = Vec::new();
        let mut offset = HEADER_LEN;
        while offset < length {
            if length - offset < crate::avp::HEADER_LEN {
                return Err(CodecError::Malformed(format!(
                    "{} trailing bytes after last AVP",
                    length - offset
                )));
            }
            let avp = Avp::decode(&data[offset..length], header.application_id, dict)?;
            offset += avp.padded_len();
            avps.push(avp);
        }
        if offset != length {
            return Err(CodecError::Malformed(format!(
                "AVPs overrun message body by {} bytes",
                offset - length
            )));
        }

        Ok(Self { header, avps })
    }

    /// Serialize, recomputing the header length from the AVP list.
    pub fn to_bytes(&self) -> Bytes {
        let body: usize = self.avps.iter().map(|a| a.padded_len()).sum();
        let mut header = self.header.clone();
        header.length = (HEADER_LEN + body) as u32;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body);
        header.put(&mut buf);
        for avp in &self.avps {
            avp.put(&mut buf);
        }
        buf.freeze()
    }

    /// Total serialized size.
    pub fn len(&self) -> usize {
        HEADER_LEN + self.avps.iter().map(|a| a.padded_len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.avps.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{code:{},app:{},flags:0x{:x},hbh:0x{:x},e2e:0x{:x},avps:[",
            self.header.code,
            self.header.application_id,
            self.header.flags,
            self.header.hop_by_hop_id,
            self.header.end_to_end_id,
        )?;
        for (i, avp) in self.avps.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{avp}")?;
        }
        write!(f, "]}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::result_code;
    use dbp_dict::cmd_code;

    fn dict() -> Dictionary {
        Dictionary::base()
    }

    fn sample_cer() -> Message {
        let mut m = Message::request(cmd_code::CAPABILITIES_EXCHANGE, 0);
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp::flags::M,
            0,
            AvpValue::DiameterIdentity("cli".into()),
        );
        m.new_avp(
            avp_code::ORIGIN_REALM,
            avp::flags::M,
            0,
            AvpValue::DiameterIdentity("test".into()),
        );
        m.new_avp(avp_code::VENDOR_ID, avp::flags::M, 0, AvpValue::Unsigned32(13));
        m
    }

    #[test]
    fn test_header_roundtrip() {
        let data = [
            1, 0, 0, 20, // version, length
            0x80, 0, 1, 1, // flags, command 257
            0, 0, 0, 0, // application
            0, 0, 0, 1, // hop-by-hop
            0, 0, 0, 2, // end-to-end
        ];
        let header = Header::decode(&data).unwrap();
        assert_eq!(header.code, 257);
        assert!(header.is_request());

        let mut buf = BytesMut::new();
        header.put(&mut buf);
        assert_eq!(&buf[..], &data);
    }

    #[test]
    fn test_bad_version() {
        let mut data = [0u8; 20];
        data[0] = 2;
        assert!(matches!(
            Header::decode(&data).unwrap_err(),
            CodecError::BadVersion(2)
        ));
    }

    #[test]
    fn test_roundtrip_preserves_avp_order() {
        let m = sample_cer();
        let bytes = m.to_bytes();
        let decoded = Message::decode(&bytes, &dict()).unwrap();
        let codes: Vec<u32> = decoded.avps.iter().map(|a| a.code).collect();
        assert_eq!(
            codes,
            vec![avp_code::ORIGIN_HOST, avp_code::ORIGIN_REALM, avp_code::VENDOR_ID]
        );
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_length_field_matches_buffer() {
        let m = sample_cer();
        let bytes = m.to_bytes();
        let declared = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(declared, bytes.len());
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn test_truncated_message() {
        let m = sample_cer();
        let bytes = m.to_bytes();
        let err = Message::decode(&bytes[..bytes.len() - 4], &dict()).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let m = sample_cer();
        let mut bytes = BytesMut::from(&m.to_bytes()[..]);
        // Declare 2 extra bytes the AVP walk cannot tile.
        let bogus = (bytes.len() + 2) as u32;
        bytes[1] = (bogus >> 16) as u8;
        bytes[2] = (bogus >> 8) as u8;
        bytes[3] = bogus as u8;
        bytes.extend_from_slice(&[0, 0]);
        let err = Message::decode(&bytes, &dict()).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_answer_copies_identifiers() {
        let req = sample_cer();
        let ans = req.answer(result_code::SUCCESS);
        assert_eq!(ans.header.hop_by_hop_id, req.header.hop_by_hop_id);
        assert_eq!(ans.header.end_to_end_id, req.header.end_to_end_id);
        assert!(!ans.header.is_request());
        assert_eq!(
            ans.avp(avp_code::RESULT_CODE).unwrap().data,
            AvpValue::Unsigned32(result_code::SUCCESS)
        );
    }

    #[test]
    fn test_retransmit_keeps_identifiers() {
        let mut req = sample_cer();
        let (hbh, e2e) = (req.header.hop_by_hop_id, req.header.end_to_end_id);
        req.set_retransmit();
        assert!(req.header.is_retransmit());
        assert_eq!(req.header.hop_by_hop_id, hbh);
        assert_eq!(req.header.end_to_end_id, e2e);
    }

    #[test]
    fn test_request_ids_are_distinct() {
        let a = Message::request(cmd_code::DEVICE_WATCHDOG, 0);
        let b = Message::request(cmd_code::DEVICE_WATCHDOG, 0);
        assert_ne!(a.header.hop_by_hop_id, b.header.hop_by_hop_id);
        assert_ne!(a.header.end_to_end_id, b.header.end_to_end_id);
    }
}
