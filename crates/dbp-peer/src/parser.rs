//! Capabilities-exchange validation (RFC 6733 section 5.3).
//!
//! The parser is symmetric: the server runs it over an incoming CER, the
//! client over the CEA. Validation checks the mandatory origin AVPs,
//! intersects the advertised applications with the local dictionary, and
//! rejects inband security the endpoint does not offer. When the failure
//! points at a specific AVP, `failed_avp` carries it so the server can echo
//! it inside an error answer's Failed-AVP.

use dbp_core::{inband_security, result_code, Avp, AvpValue, Message};
use dbp_dict::{avp_code, AppKind, Dictionary};

use crate::error::{PeerError, Result};

/// Which side of the exchange is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Parsing a CEA received from the server.
    Client,
    /// Parsing a CER received from a client.
    Server,
}

/// Parsed view of a CER or CEA.
#[derive(Debug, Default)]
pub struct CapabilitiesExchange {
    pub origin_host: Option<String>,
    pub origin_realm: Option<String>,
    pub vendor_id: Option<u32>,
    pub product_name: Option<String>,
    pub origin_state_id: Option<Avp>,
    pub acct_application_id: Vec<Avp>,
    pub auth_application_id: Vec<Avp>,
    pub vendor_specific_application_id: Vec<Avp>,
    pub inband_security_id: Option<Avp>,
    pub result_code: Option<u32>,
    /// The AVP that caused a rejection, when one is nameable.
    pub failed_avp: Option<Avp>,
    applications: Vec<u32>,
}

impl CapabilitiesExchange {
    /// Validate a CER/CEA. On failure the error names the reason and, when
    /// an AVP is to blame, `self.failed_avp` holds it.
    pub fn parse(
        &mut self,
        m: &Message,
        dict: &Dictionary,
        role: Role,
        tls_enabled: bool,
    ) -> Result<()> {
        self.collect(m);

        if role == Role::Client {
            match self.result_code {
                None => return Err(PeerError::MissingResultCode),
                Some(result_code::SUCCESS) => {}
                Some(code) => return Err(PeerError::FailedResultCode(code)),
            }
        }
        if self.origin_host.is_none() {
            return Err(PeerError::MissingOriginHost);
        }
        if self.origin_realm.is_none() {
            return Err(PeerError::MissingOriginRealm);
        }
        if let Some(isi) = &self.inband_security_id {
            if let AvpValue::Unsigned32(v) = isi.data {
                if v != inband_security::NO_INBAND_SECURITY && !tls_enabled {
                    self.failed_avp = Some(isi.clone());
                    return Err(PeerError::NoCommonSecurity);
                }
            }
        }

        self.applications = validate_applications(
            &self.acct_application_id,
            &self.auth_application_id,
            &self.vendor_specific_application_id,
            dict,
        )
        .map_err(|e| {
            self.failed_avp = e.failed_avp;
            e.error
        })?;

        Ok(())
    }

    /// Application ids both sides support, in advertised order. Empty
    /// before a successful [`parse`](Self::parse).
    pub fn applications(&self) -> &[u32] {
        &self.applications
    }

    pub fn origin_state_id_value(&self) -> Option<u32> {
        match self.origin_state_id.as_ref().map(|a| &a.data) {
            Some(AvpValue::Unsigned32(v)) => Some(*v),
            _ => None,
        }
    }

    fn collect(&mut self, m: &Message) {
        for avp in &m.avps {
            match avp.code {
                avp_code::ORIGIN_HOST => {
                    if let AvpValue::DiameterIdentity(s) = &avp.data {
                        self.origin_host = Some(s.clone());
                    }
                }
                avp_code::ORIGIN_REALM => {
                    if let AvpValue::DiameterIdentity(s) = &avp.data {
                        self.origin_realm = Some(s.clone());
                    }
                }
                avp_code::VENDOR_ID => {
                    if let AvpValue::Unsigned32(v) = avp.data {
                        self.vendor_id = Some(v);
                    }
                }
                avp_code::PRODUCT_NAME => {
                    if let AvpValue::Utf8String(s) = &avp.data {
                        self.product_name = Some(s.clone());
                    }
                }
                avp_code::ORIGIN_STATE_ID => self.origin_state_id = Some(avp.clone()),
                avp_code::ACCT_APPLICATION_ID => self.acct_application_id.push(avp.clone()),
                avp_code::AUTH_APPLICATION_ID => self.auth_application_id.push(avp.clone()),
                avp_code::VENDOR_SPECIFIC_APPLICATION_ID => {
                    self.vendor_specific_application_id.push(avp.clone())
                }
                avp_code::INBAND_SECURITY_ID => self.inband_security_id = Some(avp.clone()),
                avp_code::RESULT_CODE => {
                    if let AvpValue::Unsigned32(v) = avp.data {
                        self.result_code = Some(v);
                    }
                }
                _ => {}
            }
        }
    }
}

/// A rejected application advertisement: the error plus the AVP to echo in
/// Failed-AVP, when one is nameable.
pub struct FailedApplication {
    pub error: PeerError,
    pub failed_avp: Option<Avp>,
}

/// Check every advertised application id against the dictionary under the
/// matching kind. Returns the supported ids in advertised order.
///
/// Also used by the client before sending a CER, so a misconfigured
/// application list fails locally instead of on the wire.
pub fn validate_applications(
    acct: &[Avp],
    auth: &[Avp],
    vendor_specific: &[Avp],
    dict: &Dictionary,
) -> std::result::Result<Vec<u32>, FailedApplication> {
    let mut apps = Vec::new();

    for avp in acct {
        apps.push(check_one(avp, avp, AppKind::Acct, dict)?);
    }
    for avp in auth {
        apps.push(check_one(avp, avp, AppKind::Auth, dict)?);
    }
    for avp in vendor_specific {
        if let AvpValue::Grouped(children) = &avp.data {
            for child in children {
                match child.code {
                    avp_code::ACCT_APPLICATION_ID => {
                        apps.push(check_one(child, avp, AppKind::Acct, dict)?);
                    }
                    avp_code::AUTH_APPLICATION_ID => {
                        apps.push(check_one(child, avp, AppKind::Auth, dict)?);
                    }
                    _ => {}
                }
            }
        }
    }

    if apps.is_empty() {
        return Err(FailedApplication {
            error: PeerError::MissingApplication,
            failed_avp: None,
        });
    }
    Ok(apps)
}

fn check_one(
    id_avp: &Avp,
    reported: &Avp,
    kind: AppKind,
    dict: &Dictionary,
) -> std::result::Result<u32, FailedApplication> {
    let id = match id_avp.data {
        AvpValue::Unsigned32(v) => v,
        _ => 0,
    };
    match dict.app(id) {
        Some(app) if app.kind == kind => Ok(id),
        _ => Err(FailedApplication {
            error: PeerError::NoCommonApplication { id, kind },
            failed_avp: Some(reported.clone()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbp_core::avp::flags as avp_flags;
    use dbp_dict::{cmd_code, ApplicationDef};
    use std::sync::Arc;

    // Mirrors the acct/auth fixtures the handshake tests are written
    // against: 1001 is an accounting application, 1002 an auth one.
    fn dict() -> Arc<Dictionary> {
        let d = Dictionary::base();
        d.register_application(ApplicationDef {
            id: 1001,
            kind: AppKind::Acct,
            name: "Test-Acct".to_string(),
        });
        d.register_application(ApplicationDef {
            id: 1002,
            kind: AppKind::Auth,
            name: "Test-Auth".to_string(),
        });
        Arc::new(d)
    }

    fn new_cer() -> Message {
        Message::request(cmd_code::CAPABILITIES_EXCHANGE, 0)
    }

    fn with_origin(m: &mut Message) {
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity("foobar".into()),
        );
        m.new_avp(
            avp_code::ORIGIN_REALM,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity("test".into()),
        );
        m.new_avp(
            avp_code::ORIGIN_STATE_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1),
        );
    }

    fn parse(m: &Message) -> (CapabilitiesExchange, Result<()>) {
        let mut ce = CapabilitiesExchange::default();
        let res = ce.parse(m, &dict(), Role::Server, false);
        (ce, res)
    }

    #[test]
    fn test_missing_origin_host() {
        let m = new_cer();
        let (_, err) = parse(&m);
        assert!(matches!(err, Err(PeerError::MissingOriginHost)));
    }

    #[test]
    fn test_missing_origin_realm() {
        let mut m = new_cer();
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity("foobar".into()),
        );
        let (_, err) = parse(&m);
        assert!(matches!(err, Err(PeerError::MissingOriginRealm)));
    }

    #[test]
    fn test_missing_application() {
        let mut m = new_cer();
        with_origin(&mut m);
        let (_, err) = parse(&m);
        assert!(matches!(err, Err(PeerError::MissingApplication)));
    }

    #[test]
    fn test_no_common_application() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::ACCT_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(2),
        );
        let (ce, err) = parse(&m);
        match err {
            Err(PeerError::NoCommonApplication { id: 2, kind }) => {
                assert_eq!(kind, AppKind::Acct);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let msg = PeerError::NoCommonApplication {
            id: 2,
            kind: AppKind::Acct,
        }
        .to_string();
        assert!(msg.contains("acct application 2"));
        assert_eq!(
            ce.failed_avp.as_ref().map(|a| a.code),
            Some(avp_code::ACCT_APPLICATION_ID)
        );
    }

    #[test]
    fn test_no_common_security() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::INBAND_SECURITY_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(inband_security::TLS),
        );
        let (ce, err) = parse(&m);
        assert!(matches!(err, Err(PeerError::NoCommonSecurity)));
        assert_eq!(
            ce.failed_avp.as_ref().map(|a| a.code),
            Some(avp_code::INBAND_SECURITY_ID)
        );
    }

    #[test]
    fn test_inband_security_accepted_with_tls() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::INBAND_SECURITY_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(inband_security::TLS),
        );
        m.new_avp(
            avp_code::ACCT_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1001),
        );
        let mut ce = CapabilitiesExchange::default();
        ce.parse(&m, &dict(), Role::Server, true).unwrap();
        assert_eq!(ce.applications(), &[1001]);
    }

    #[test]
    fn test_acct_app_accepted() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::ACCT_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1001),
        );
        let (ce, res) = parse(&m);
        res.unwrap();
        assert_eq!(ce.applications(), &[1001]);
    }

    #[test]
    fn test_auth_app_accepted() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::AUTH_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1002),
        );
        let (ce, res) = parse(&m);
        res.unwrap();
        assert_eq!(ce.applications(), &[1002]);
    }

    #[test]
    fn test_acct_app_used_where_auth_required() {
        let mut m = new_cer();
        with_origin(&mut m);
        // 1002 is declared auth; advertising it as acct is a mismatch.
        m.new_avp(
            avp_code::ACCT_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1002),
        );
        let (_, err) = parse(&m);
        assert!(matches!(
            err,
            Err(PeerError::NoCommonApplication { id: 1002, .. })
        ));
    }

    #[test]
    fn test_auth_app_used_where_acct_required() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::AUTH_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1001),
        );
        let (_, err) = parse(&m);
        assert!(matches!(
            err,
            Err(PeerError::NoCommonApplication { id: 1001, .. })
        ));
    }

    #[test]
    fn test_unregistered_auth_app() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::AUTH_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1000),
        );
        let (_, err) = parse(&m);
        assert!(matches!(
            err,
            Err(PeerError::NoCommonApplication { id: 1000, .. })
        ));
    }

    #[test]
    fn test_vendor_specific_acct_app() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Grouped(vec![Avp::new(
                avp_code::ACCT_APPLICATION_ID,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(1001),
            )]),
        );
        let (ce, res) = parse(&m);
        res.unwrap();
        assert_eq!(ce.applications(), &[1001]);
    }

    #[test]
    fn test_vendor_specific_auth_app() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Grouped(vec![Avp::new(
                avp_code::AUTH_APPLICATION_ID,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(1002),
            )]),
        );
        let (ce, res) = parse(&m);
        res.unwrap();
        assert_eq!(ce.applications(), &[1002]);
    }

    #[test]
    fn test_failed_vendor_specific_app() {
        let mut m = new_cer();
        with_origin(&mut m);
        m.new_avp(
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Grouped(vec![Avp::new(
                avp_code::ACCT_APPLICATION_ID,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(1000),
            )]),
        );
        let (ce, err) = parse(&m);
        assert!(matches!(
            err,
            Err(PeerError::NoCommonApplication { id: 1000, .. })
        ));
        // The failed AVP is the whole vendor-specific group.
        assert_eq!(
            ce.failed_avp.as_ref().map(|a| a.code),
            Some(avp_code::VENDOR_SPECIFIC_APPLICATION_ID)
        );
    }

    #[test]
    fn test_cea_result_code_checked_first() {
        let mut m = Message::new(cmd_code::CAPABILITIES_EXCHANGE, 0);
        with_origin(&mut m);
        m.new_avp(
            avp_code::RESULT_CODE,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(result_code::NO_COMMON_APPLICATION),
        );
        let mut ce = CapabilitiesExchange::default();
        let err = ce.parse(&m, &dict(), Role::Client, false);
        assert!(matches!(
            err,
            Err(PeerError::FailedResultCode(result_code::NO_COMMON_APPLICATION))
        ));
    }

    #[test]
    fn test_cea_missing_result_code() {
        let mut m = Message::new(cmd_code::CAPABILITIES_EXCHANGE, 0);
        with_origin(&mut m);
        let mut ce = CapabilitiesExchange::default();
        let err = ce.parse(&m, &dict(), Role::Client, false);
        assert!(matches!(err, Err(PeerError::MissingResultCode)));
    }

    #[test]
    fn test_cea_success() {
        let mut m = Message::new(cmd_code::CAPABILITIES_EXCHANGE, 0);
        m.new_avp(
            avp_code::RESULT_CODE,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(result_code::SUCCESS),
        );
        with_origin(&mut m);
        m.new_avp(
            avp_code::VENDOR_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(13),
        );
        m.new_avp(
            avp_code::PRODUCT_NAME,
            0,
            0,
            AvpValue::Utf8String("dbp".into()),
        );
        m.new_avp(
            avp_code::ACCT_APPLICATION_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(1001),
        );
        let mut ce = CapabilitiesExchange::default();
        ce.parse(&m, &dict(), Role::Client, false).unwrap();
        assert_eq!(ce.origin_host.as_deref(), Some("foobar"));
        assert_eq!(ce.vendor_id, Some(13));
        assert_eq!(ce.applications(), &[1001]);
        assert_eq!(ce.origin_state_id_value(), Some(1));
    }
}
