//! Peer state machine.
//!
//! Installs the base-protocol handlers on a mux: the server-side CER
//! validation with success/error CEA, the watchdog answer, and the
//! disconnect exchange. A connection moves Closed -> Wait-CER-or-CEA ->
//! Open -> Closing -> Closed; "Open" is observable as the peer metadata
//! being attached to the connection.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use dbp_core::avp::flags as avp_flags;
use dbp_core::{result_code, Avp, AvpValue, Message};
use dbp_dict::{avp_code, cmd_code, Dictionary};

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::meta::PeerMeta;
use crate::mux::{ErrorReport, Handler, Mux};
use crate::parser::{CapabilitiesExchange, Role};

/// Local identity advertised during the capabilities exchange.
#[derive(Debug, Clone)]
pub struct Settings {
    pub origin_host: String,
    pub origin_realm: String,
    pub vendor_id: u32,
    pub product_name: String,
    pub origin_state_id: u32,
    pub firmware_revision: u32,
    /// Whether this endpoint offers TLS; gates Inband-Security-Id.
    pub tls_enabled: bool,
}

impl Settings {
    pub fn from_config(cfg: &dbp_config::EndpointConfig) -> Self {
        Self {
            origin_host: cfg.origin_host.clone(),
            origin_realm: cfg.origin_realm.clone(),
            vendor_id: cfg.vendor_id,
            product_name: cfg.product_name.clone(),
            origin_state_id: cfg.origin_state_id,
            firmware_revision: cfg.firmware_revision,
            tls_enabled: cfg.tls.enabled,
        }
    }
}

/// Drives the base-protocol lifecycle over a [`Mux`].
pub struct StateMachine {
    mux: Arc<Mux>,
    cfg: Settings,
    hs_tx: broadcast::Sender<Connection>,
}

impl StateMachine {
    /// Create a state machine and install the CER/DWR/DPR/DPA handlers.
    pub fn new(cfg: Settings, dict: Arc<Dictionary>) -> Arc<Self> {
        let (hs_tx, _) = broadcast::channel(8);
        let sm = Arc::new(Self {
            mux: Arc::new(Mux::new(dict)),
            cfg,
            hs_tx,
        });
        sm.install_handlers();
        sm
    }

    fn install_handlers(self: &Arc<Self>) {
        let sm = self.clone();
        self.mux.handle_func("CER", move |conn, m| {
            let sm = sm.clone();
            async move { sm.handle_cer(conn, m).await }
        });

        let sm = self.clone();
        self.mux.handle_func("DWR", move |conn, m| {
            let sm = sm.clone();
            async move { sm.handle_dwr(conn, m).await }
        });

        let sm = self.clone();
        self.mux.handle_func("DPR", move |conn, m| {
            let sm = sm.clone();
            async move { sm.handle_dpr(conn, m).await }
        });

        // A DPA acknowledges our own DPR; nothing left but to close.
        self.mux.handle_func("DPA", move |conn, _m| async move {
            conn.close();
        });

        let sm = self.clone();
        self.mux
            .set_default(crate::mux::handler_fn(move |conn, m| {
                let sm = sm.clone();
                async move { sm.handle_unknown(conn, m).await }
            }));
    }

    pub fn mux(&self) -> Arc<Mux> {
        self.mux.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.cfg
    }

    pub fn dict(&self) -> Arc<Dictionary> {
        self.mux.dict()
    }

    /// Register an application handler by command name.
    pub fn handle(&self, name: &str, handler: Arc<dyn Handler>) {
        self.mux.handle(name, handler);
    }

    /// Register an async closure by command name.
    pub fn handle_func<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Connection, Message) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.mux.handle_func(name, f);
    }

    /// Install the sink receiving decode failures.
    pub fn set_error_handler<F>(&self, f: F)
    where
        F: Fn(ErrorReport) + Send + Sync + 'static,
    {
        self.mux.set_error_handler(f);
    }

    /// Deliver an error report to the sink.
    pub fn error(&self, report: ErrorReport) {
        self.mux.report(report);
    }

    /// Subscribe to connections that completed the server-side handshake.
    pub fn handshake_notify(&self) -> broadcast::Receiver<Connection> {
        self.hs_tx.subscribe()
    }

    /// Send a DPR to start a graceful disconnect; the peer's DPA closes
    /// the connection.
    pub fn disconnect(&self, conn: &Connection, cause: i32) -> Result<()> {
        let mut m = Message::request(cmd_code::DISCONNECT_PEER, 0);
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_host.clone()),
        );
        m.new_avp(
            avp_code::ORIGIN_REALM,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_realm.clone()),
        );
        m.new_avp(
            avp_code::DISCONNECT_CAUSE,
            avp_flags::M,
            0,
            AvpValue::Enumerated(cause),
        );
        conn.send(m)
    }

    async fn handle_cer(&self, conn: Connection, m: Message) {
        if conn.peer().is_some() {
            // Retransmitted CER after a completed handshake.
            debug!(peer = %conn.peer_addr(), "ignoring retransmitted CER");
            return;
        }
        let mut ce = CapabilitiesExchange::default();
        match ce.parse(&m, &self.dict(), Role::Server, self.cfg.tls_enabled) {
            Ok(()) => {
                if let Err(e) = self.success_cea(&conn, &m, &ce) {
                    self.error(ErrorReport {
                        peer_addr: Some(conn.peer_addr()),
                        message: Some(m),
                        result_code: None,
                        error: e,
                    });
                    return;
                }
                let meta = PeerMeta::from_ce(&ce);
                info!(
                    peer = %meta.origin_host,
                    realm = %meta.origin_realm,
                    apps = ?meta.applications,
                    "peer accepted"
                );
                conn.set_peer(meta);
                let _ = self.hs_tx.send(conn.clone());
            }
            Err(err) => {
                warn!(peer = %conn.peer_addr(), error = %err, "CER rejected");
                dbp_metrics::HANDSHAKE_FAILURES.inc();
                if let Some(failed) = ce.failed_avp.take() {
                    if let Err(e) = self.error_cea(&conn, &m, &ce, failed, &err) {
                        self.error(ErrorReport {
                            peer_addr: Some(conn.peer_addr()),
                            message: Some(m),
                            result_code: None,
                            error: e,
                        });
                    }
                }
                conn.close();
            }
        }
    }

    /// Answer a valid CER, echoing the peer's Origin-State-Id and
    /// application advertisements.
    fn success_cea(
        &self,
        conn: &Connection,
        m: &Message,
        ce: &CapabilitiesExchange,
    ) -> Result<()> {
        let mut a = m.answer(result_code::SUCCESS);
        self.identity_avps(&mut a, conn.local_addr().ip());
        if let Some(osid) = &ce.origin_state_id {
            a.add_avp(osid.clone());
        }
        for avp in &ce.acct_application_id {
            a.add_avp(avp.clone());
        }
        for avp in &ce.auth_application_id {
            a.add_avp(avp.clone());
        }
        for avp in &ce.vendor_specific_application_id {
            a.add_avp(avp.clone());
        }
        if self.cfg.firmware_revision != 0 {
            a.new_avp(
                avp_code::FIRMWARE_REVISION,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(self.cfg.firmware_revision),
            );
        }
        conn.send(a)
    }

    /// Answer a rejected CER with the E bit set and the offending AVP
    /// wrapped in Failed-AVP, then let the caller close.
    fn error_cea(
        &self,
        conn: &Connection,
        m: &Message,
        ce: &CapabilitiesExchange,
        failed: Avp,
        err: &PeerError,
    ) -> Result<()> {
        let code = match err {
            PeerError::NoCommonSecurity => result_code::NO_COMMON_SECURITY,
            _ => result_code::NO_COMMON_APPLICATION,
        };
        let mut a = m.answer(code);
        a.set_error();
        self.identity_avps(&mut a, conn.local_addr().ip());
        if let Some(osid) = &ce.origin_state_id {
            a.add_avp(osid.clone());
        }
        a.new_avp(
            avp_code::FAILED_AVP,
            avp_flags::M,
            0,
            AvpValue::Grouped(vec![failed]),
        );
        if self.cfg.firmware_revision != 0 {
            a.new_avp(
                avp_code::FIRMWARE_REVISION,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(self.cfg.firmware_revision),
            );
        }
        conn.send(a)
    }

    async fn handle_dwr(&self, conn: Connection, m: Message) {
        let mut a = m.answer(result_code::SUCCESS);
        a.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_host.clone()),
        );
        a.new_avp(
            avp_code::ORIGIN_REALM,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_realm.clone()),
        );
        if self.cfg.origin_state_id != 0 {
            a.new_avp(
                avp_code::ORIGIN_STATE_ID,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(self.cfg.origin_state_id),
            );
        }
        if let Err(e) = conn.send(a) {
            self.error(ErrorReport {
                peer_addr: Some(conn.peer_addr()),
                message: Some(m),
                result_code: None,
                error: e,
            });
        }
    }

    /// DPR: acknowledge and close once the DPA has drained.
    async fn handle_dpr(&self, conn: Connection, m: Message) {
        info!(peer = %conn.peer_addr(), "peer requested disconnect");
        let mut a = m.answer(result_code::SUCCESS);
        a.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_host.clone()),
        );
        a.new_avp(
            avp_code::ORIGIN_REALM,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_realm.clone()),
        );
        if let Err(e) = conn.send(a) {
            self.error(ErrorReport {
                peer_addr: Some(conn.peer_addr()),
                message: Some(m),
                result_code: None,
                error: e,
            });
        }
        conn.close();
    }

    /// Default route: reject unknown requests, drop unknown answers.
    async fn handle_unknown(&self, conn: Connection, m: Message) {
        warn!(
            code = m.header.code,
            app = m.header.application_id,
            peer = %conn.peer_addr(),
            "unsupported command"
        );
        if m.header.is_request() {
            let mut a = m.answer(result_code::COMMAND_UNSUPPORTED);
            a.set_error();
            a.new_avp(
                avp_code::ORIGIN_HOST,
                avp_flags::M,
                0,
                AvpValue::DiameterIdentity(self.cfg.origin_host.clone()),
            );
            a.new_avp(
                avp_code::ORIGIN_REALM,
                avp_flags::M,
                0,
                AvpValue::DiameterIdentity(self.cfg.origin_realm.clone()),
            );
            if let Err(e) = conn.send(a) {
                self.error(ErrorReport {
                    peer_addr: Some(conn.peer_addr()),
                    message: Some(m),
                    result_code: None,
                    error: e,
                });
            }
        }
    }

    /// The identity block every CEA carries.
    fn identity_avps(&self, m: &mut Message, local_ip: IpAddr) {
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_host.clone()),
        );
        m.new_avp(
            avp_code::ORIGIN_REALM,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(self.cfg.origin_realm.clone()),
        );
        m.new_avp(
            avp_code::HOST_IP_ADDRESS,
            avp_flags::M,
            0,
            AvpValue::Address(local_ip),
        );
        m.new_avp(
            avp_code::VENDOR_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(self.cfg.vendor_id),
        );
        m.new_avp(
            avp_code::PRODUCT_NAME,
            0,
            0,
            AvpValue::Utf8String(self.cfg.product_name.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            origin_host: "srv".to_string(),
            origin_realm: "test".to_string(),
            vendor_id: 13,
            product_name: "dbp".to_string(),
            origin_state_id: 0,
            firmware_revision: 1,
            tls_enabled: false,
        }
    }

    #[test]
    fn test_settings_from_config() {
        let yaml = r#"
origin_host: srv.example.com
origin_realm: example.com
vendor_id: 13
product_name: dbp
origin_state_id: 7
"#;
        let cfg: dbp_config::EndpointConfig = dbp_config::load_from_yaml(yaml).unwrap();
        let settings = Settings::from_config(&cfg);
        assert_eq!(settings.origin_host, "srv.example.com");
        assert_eq!(settings.origin_state_id, 7);
        assert!(!settings.tls_enabled);
    }

    #[tokio::test]
    async fn test_state_machine_installs_base_handlers() {
        let sm = StateMachine::new(test_settings(), Arc::new(Dictionary::base()));
        // CER/DWR/DPR/DPA are pre-registered; adding an app command works.
        sm.handle_func("ACR", |_conn, _m| async {});
        let mut rx = sm.handshake_notify();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
