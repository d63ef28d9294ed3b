//! Typed AVP payloads and their wire forms.
//!
//! Every value knows its unpadded length, the padding needed to reach a
//! 4-byte boundary, and how to serialize itself big-endian. Decoding is
//! driven by the data type the dictionary declares for the AVP.

use std::fmt;
use std::net::IpAddr;

use bytes::{BufMut, BytesMut};
use dbp_dict::{AvpDataType, Dictionary};

use crate::avp::Avp;
use crate::error::{CodecError, Result};

/// IANA address family numbers used by the Address type.
const FAMILY_IPV4: u16 = 1;
const FAMILY_IPV6: u16 = 2;

/// A decoded AVP payload, tagged by its declared data type.
#[derive(Debug, Clone, PartialEq)]
pub enum AvpValue {
    OctetString(Vec<u8>),
    Integer32(i32),
    Integer64(i64),
    Unsigned32(u32),
    Unsigned64(u64),
    Float32(f32),
    Float64(f64),
    Address(IpAddr),
    /// Seconds since 1900-01-01 UTC (NTP epoch).
    Time(u32),
    Utf8String(String),
    DiameterIdentity(String),
    DiameterUri(String),
    Enumerated(i32),
    IpFilterRule(String),
    QosFilterRule(String),
    Grouped(Vec<Avp>),
}

impl AvpValue {
    /// The declared data type this value corresponds to.
    pub fn data_type(&self) -> AvpDataType {
        match self {
            Self::OctetString(_) => AvpDataType::OctetString,
            Self::Integer32(_) => AvpDataType::Integer32,
            Self::Integer64(_) => AvpDataType::Integer64,
            Self::Unsigned32(_) => AvpDataType::Unsigned32,
            Self::Unsigned64(_) => AvpDataType::Unsigned64,
            Self::Float32(_) => AvpDataType::Float32,
            Self::Float64(_) => AvpDataType::Float64,
            Self::Address(_) => AvpDataType::Address,
            Self::Time(_) => AvpDataType::Time,
            Self::Utf8String(_) => AvpDataType::Utf8String,
            Self::DiameterIdentity(_) => AvpDataType::DiameterIdentity,
            Self::DiameterUri(_) => AvpDataType::DiameterUri,
            Self::Enumerated(_) => AvpDataType::Enumerated,
            Self::IpFilterRule(_) => AvpDataType::IpFilterRule,
            Self::QosFilterRule(_) => AvpDataType::QosFilterRule,
            Self::Grouped(_) => AvpDataType::Grouped,
        }
    }

    /// Serialized length in bytes, without padding.
    pub fn len(&self) -> usize {
        match self {
            Self::OctetString(b) => b.len(),
            Self::Integer32(_) | Self::Unsigned32(_) | Self::Float32(_) => 4,
            Self::Integer64(_) | Self::Unsigned64(_) | Self::Float64(_) => 8,
            Self::Address(IpAddr::V4(_)) => 2 + 4,
            Self::Address(IpAddr::V6(_)) => 2 + 16,
            Self::Time(_) => 4,
            Self::Utf8String(s) | Self::DiameterIdentity(s) | Self::DiameterUri(s) => s.len(),
            Self::Enumerated(_) => 4,
            Self::IpFilterRule(s) | Self::QosFilterRule(s) => s.len(),
            // Children carry their own padding inside the group.
            Self::Grouped(avps) => avps.iter().map(|a| a.padded_len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero bytes needed after the payload to reach a 4-byte boundary.
    pub fn padding(&self) -> usize {
        (4 - self.len() % 4) % 4
    }

    /// Append the wire form of this value, without padding.
    pub fn put(&self, buf: &mut BytesMut) {
        match self {
            Self::OctetString(b) => buf.put_slice(b),
            Self::Integer32(v) | Self::Enumerated(v) => buf.put_i32(*v),
            Self::Integer64(v) => buf.put_i64(*v),
            Self::Unsigned32(v) | Self::Time(v) => buf.put_u32(*v),
            Self::Unsigned64(v) => buf.put_u64(*v),
            Self::Float32(v) => buf.put_f32(*v),
            Self::Float64(v) => buf.put_f64(*v),
            Self::Address(IpAddr::V4(ip)) => {
                buf.put_u16(FAMILY_IPV4);
                buf.put_slice(&ip.octets());
            }
            Self::Address(IpAddr::V6(ip)) => {
                buf.put_u16(FAMILY_IPV6);
                buf.put_slice(&ip.octets());
            }
            Self::Utf8String(s)
            | Self::DiameterIdentity(s)
            | Self::DiameterUri(s)
            | Self::IpFilterRule(s)
            | Self::QosFilterRule(s) => buf.put_slice(s.as_bytes()),
            Self::Grouped(avps) => {
                for avp in avps {
                    avp.put(buf);
                }
            }
        }
    }

    /// Decode a payload according to its declared data type.
    ///
    /// Grouped payloads are decoded recursively with the same application
    /// id; an empty grouped payload yields an empty child list.
    pub fn decode(
        data_type: AvpDataType,
        payload: &[u8],
        application: u32,
        dict: &Dictionary,
    ) -> Result<Self> {
        let fixed = |n: usize| -> Result<()> {
            if payload.len() != n {
                return Err(CodecError::InvalidAvpValue {
                    data_type,
                    reason: format!("expected {} bytes, have {}", n, payload.len()),
                });
            }
            Ok(())
        };
        match data_type {
            AvpDataType::OctetString => Ok(Self::OctetString(payload.to_vec())),
            AvpDataType::Integer32 => {
                fixed(4)?;
                Ok(Self::Integer32(i32::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::Integer64 => {
                fixed(8)?;
                Ok(Self::Integer64(i64::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::Unsigned32 => {
                fixed(4)?;
                Ok(Self::Unsigned32(u32::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::Unsigned64 => {
                fixed(8)?;
                Ok(Self::Unsigned64(u64::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::Float32 => {
                fixed(4)?;
                Ok(Self::Float32(f32::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::Float64 => {
                fixed(8)?;
                Ok(Self::Float64(f64::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::Address => Self::decode_address(payload),
            AvpDataType::Time => {
                fixed(4)?;
                Ok(Self::Time(u32::from_be_bytes(payload.try_into().unwrap())))
            }
            AvpDataType::Utf8String => Ok(Self::Utf8String(Self::decode_utf8(
                data_type, payload,
            )?)),
            AvpDataType::DiameterIdentity => Ok(Self::DiameterIdentity(Self::decode_utf8(
                data_type, payload,
            )?)),
            AvpDataType::DiameterUri => Ok(Self::DiameterUri(Self::decode_utf8(
                data_type, payload,
            )?)),
            AvpDataType::Enumerated => {
                fixed(4)?;
                Ok(Self::Enumerated(i32::from_be_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            AvpDataType::IpFilterRule => Ok(Self::IpFilterRule(Self::decode_utf8(
                data_type, payload,
            )?)),
            AvpDataType::QosFilterRule => Ok(Self::QosFilterRule(Self::decode_utf8(
                data_type, payload,
            )?)),
            AvpDataType::Grouped => Ok(Self::Grouped(Avp::decode_grouped(
                payload,
                application,
                dict,
            )?)),
        }
    }

    fn decode_utf8(data_type: AvpDataType, payload: &[u8]) -> Result<String> {
        String::from_utf8(payload.to_vec()).map_err(|_| CodecError::InvalidAvpValue {
            data_type,
            reason: "invalid UTF-8".to_string(),
        })
    }

    fn decode_address(payload: &[u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(CodecError::InvalidAvpValue {
                data_type: AvpDataType::Address,
                reason: "missing address family".to_string(),
            });
        }
        let family = u16::from_be_bytes([payload[0], payload[1]]);
        let addr = &payload[2..];
        match family {
            FAMILY_IPV4 if addr.len() == 4 => {
                let octets: [u8; 4] = addr.try_into().unwrap();
                Ok(Self::Address(IpAddr::from(octets)))
            }
            FAMILY_IPV6 if addr.len() == 16 => {
                let octets: [u8; 16] = addr.try_into().unwrap();
                Ok(Self::Address(IpAddr::from(octets)))
            }
            _ => Err(CodecError::InvalidAvpValue {
                data_type: AvpDataType::Address,
                reason: format!("address family {} with {} bytes", family, addr.len()),
            }),
        }
    }
}

impl fmt::Display for AvpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OctetString(b) => write!(f, "0x{}", hex(b)),
            Self::Integer32(v) | Self::Enumerated(v) => write!(f, "{v}"),
            Self::Integer64(v) => write!(f, "{v}"),
            Self::Unsigned32(v) | Self::Time(v) => write!(f, "{v}"),
            Self::Unsigned64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Address(ip) => write!(f, "{ip}"),
            Self::Utf8String(s)
            | Self::DiameterIdentity(s)
            | Self::DiameterUri(s)
            | Self::IpFilterRule(s)
            | Self::QosFilterRule(s) => f.write_str(s),
            Self::Grouped(avps) => {
                write!(f, "[")?;
                for (i, avp) in avps.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{avp}")?;
                }
                write!(f, "]")
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
