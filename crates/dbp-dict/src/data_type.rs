use std::fmt;

/// Declared data type of an AVP, as recorded in the dictionary.
///
/// The wire forms are defined by RFC 6733 section 4.2 and 4.3. The codec in
/// `dbp-core` consults this to pick the decoder for an AVP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvpDataType {
    OctetString,
    Integer32,
    Integer64,
    Unsigned32,
    Unsigned64,
    Float32,
    Float64,
    Address,
    Time,
    Utf8String,
    DiameterIdentity,
    DiameterUri,
    Enumerated,
    IpFilterRule,
    QosFilterRule,
    Grouped,
}

impl AvpDataType {
    /// Dictionary name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OctetString => "OctetString",
            Self::Integer32 => "Integer32",
            Self::Integer64 => "Integer64",
            Self::Unsigned32 => "Unsigned32",
            Self::Unsigned64 => "Unsigned64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Address => "Address",
            Self::Time => "Time",
            Self::Utf8String => "UTF8String",
            Self::DiameterIdentity => "DiameterIdentity",
            Self::DiameterUri => "DiameterURI",
            Self::Enumerated => "Enumerated",
            Self::IpFilterRule => "IPFilterRule",
            Self::QosFilterRule => "QoSFilterRule",
            Self::Grouped => "Grouped",
        }
    }
}

impl fmt::Display for AvpDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a Diameter application, as declared in the dictionary.
///
/// The capabilities exchange validates that a peer advertising an
/// application id under Acct-Application-Id finds it registered as `Acct`
/// (and likewise for auth); a kind mismatch rejects the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKind {
    Auth,
    Acct,
}

impl AppKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Acct => "acct",
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(AvpDataType::Utf8String.name(), "UTF8String");
        assert_eq!(AvpDataType::DiameterIdentity.name(), "DiameterIdentity");
        assert_eq!(AvpDataType::Grouped.to_string(), "Grouped");
    }

    #[test]
    fn test_app_kind_display() {
        assert_eq!(AppKind::Auth.to_string(), "auth");
        assert_eq!(AppKind::Acct.to_string(), "acct");
    }
}
