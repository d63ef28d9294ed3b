//! Client endpoint: dial, capabilities exchange with bounded
//! retransmission, and the optional watchdog loop.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use dbp_core::avp::flags as avp_flags;
use dbp_core::{inband_security, Avp, AvpValue, Message, DEFAULT_PORT};
use dbp_dict::{avp_code, cmd_code, Dictionary};

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::meta::PeerMeta;
use crate::mux::Mux;
use crate::parser::{validate_applications, CapabilitiesExchange, Role};
use crate::state_machine::StateMachine;
use crate::tls;

/// Connect to a peer over TCP and return the connection handle.
/// Incoming messages are dispatched through the mux; an empty address
/// dials the default Diameter port on localhost.
pub async fn dial(addr: &str, mux: Arc<Mux>, dict: Option<Arc<Dictionary>>) -> Result<Connection> {
    let dict = dict.unwrap_or_else(|| mux.dict());
    let stream = TcpStream::connect(dial_target(addr)).await?;
    Connection::spawn(stream, mux, dict)
}

/// Like [`dial`], but wraps the socket in TLS. A client certificate is
/// presented when `client_cert` names PEM cert/key files.
pub async fn dial_tls(
    addr: &str,
    client_cert: Option<(&str, &str)>,
    mux: Arc<Mux>,
    dict: Option<Arc<Dictionary>>,
) -> Result<Connection> {
    let dict = dict.unwrap_or_else(|| mux.dict());
    let connector = tls::connector(client_cert)?;
    let name = tls::server_name(addr)?;
    let stream = TcpStream::connect(dial_target(addr)).await?;
    let stream = connector.connect(name, stream).await?;
    Connection::spawn(stream, mux, dict)
}

fn dial_target(addr: &str) -> String {
    if addr.is_empty() {
        return format!("127.0.0.1:{DEFAULT_PORT}");
    }
    addr.to_string()
}

/// A Diameter client that performs the capabilities exchange after the
/// connection is established.
///
/// It sends a CER built from its application-id AVP lists and expects a
/// CEA with Result-Code 2001. Retransmission is enabled by setting
/// `max_retransmits` above zero; the watchdog by `enable_watchdog`.
pub struct Client {
    pub handler: Arc<StateMachine>,
    /// Dictionary override; the state machine's dictionary is used if unset.
    pub dict: Option<Arc<Dictionary>>,
    /// Additional sends after the first, within handshake and watchdog.
    pub max_retransmits: u32,
    pub retransmit_interval: Duration,
    pub enable_watchdog: bool,
    pub watchdog_interval: Duration,
    pub supported_vendor_id: Vec<Avp>,
    pub acct_application_id: Vec<Avp>,
    pub auth_application_id: Vec<Avp>,
    pub vendor_specific_application_id: Vec<Avp>,
}

impl Client {
    pub fn new(handler: Arc<StateMachine>) -> Self {
        Self {
            handler,
            dict: None,
            max_retransmits: 0,
            retransmit_interval: Duration::from_secs(1),
            enable_watchdog: false,
            watchdog_interval: Duration::from_secs(5),
            supported_vendor_id: Vec::new(),
            acct_application_id: Vec::new(),
            auth_application_id: Vec::new(),
            vendor_specific_application_id: Vec::new(),
        }
    }

    /// Build a client from endpoint configuration.
    pub fn from_config(cfg: &dbp_config::EndpointConfig, handler: Arc<StateMachine>) -> Self {
        let mut client = Self::new(handler);
        client.max_retransmits = cfg.max_retransmits;
        client.retransmit_interval = Duration::from_secs(cfg.retransmit_interval_secs.max(1));
        client.enable_watchdog = cfg.watchdog.enabled;
        client.watchdog_interval = Duration::from_secs(cfg.watchdog.interval_secs.max(1));
        client
    }

    /// Dial and run the handshake; the returned connection is Open.
    pub async fn dial(&self, addr: &str) -> Result<Connection> {
        self.validate()?;
        let conn = dial(addr, self.handler.mux(), self.dict.clone()).await?;
        self.handshake(conn, false).await
    }

    /// Like [`Client::dial`], over TLS.
    pub async fn dial_tls(
        &self,
        addr: &str,
        client_cert: Option<(&str, &str)>,
    ) -> Result<Connection> {
        self.validate()?;
        let conn = dial_tls(addr, client_cert, self.handler.mux(), self.dict.clone()).await?;
        self.handshake(conn, true).await
    }

    fn dict(&self) -> Arc<Dictionary> {
        self.dict.clone().unwrap_or_else(|| self.handler.dict())
    }

    /// Check the configured application lists against the dictionary, so a
    /// bad configuration fails locally instead of on the wire.
    fn validate(&self) -> Result<()> {
        validate_applications(
            &self.acct_application_id,
            &self.auth_application_id,
            &self.vendor_specific_application_id,
            &self.dict(),
        )
        .map_err(|e| e.error)?;
        Ok(())
    }

    async fn handshake(&self, conn: Connection, tls: bool) -> Result<Connection> {
        let dict = self.dict();
        let mux = self.handler.mux();
        let settings = self.handler.settings().clone();

        // Ignore CERs from the peer while we are the connecting side.
        mux.handle_func("CER", |_conn, _m| async {});

        let (cea_tx, mut cea_rx) = mpsc::channel::<std::result::Result<PeerMeta, PeerError>>(4);
        {
            let dict = dict.clone();
            mux.handle_func("CEA", move |_conn, m| {
                let dict = dict.clone();
                let cea_tx = cea_tx.clone();
                async move {
                    let mut ce = CapabilitiesExchange::default();
                    let outcome = ce
                        .parse(&m, &dict, Role::Client, tls)
                        .map(|()| PeerMeta::from_ce(&ce));
                    let _ = cea_tx.try_send(outcome);
                }
            });
        }

        let (dwa_tx, dwa_rx) = mpsc::channel::<()>(4);
        mux.handle_func("DWA", move |_conn, _m| {
            let dwa_tx = dwa_tx.clone();
            async move {
                let _ = dwa_tx.try_send(());
            }
        });

        let mut m = self.make_cer(conn.local_addr().ip());
        for attempt in 0..=self.max_retransmits {
            if attempt > 0 {
                m.set_retransmit();
                dbp_metrics::RETRANSMITS.inc();
                debug!(attempt, "retransmitting CER");
            }
            conn.send(m.clone())?;
            tokio::select! {
                outcome = cea_rx.recv() => match outcome {
                    Some(Ok(meta)) => {
                        info!(peer = %meta.origin_host, apps = ?meta.applications, "handshake complete");
                        conn.set_peer(meta);
                        if self.enable_watchdog {
                            tokio::spawn(watchdog(
                                conn.clone(),
                                dwa_rx,
                                settings,
                                self.watchdog_interval,
                                self.retransmit_interval,
                                self.max_retransmits,
                            ));
                        }
                        return Ok(conn);
                    }
                    Some(Err(e)) => {
                        dbp_metrics::HANDSHAKE_FAILURES.inc();
                        conn.close();
                        return Err(e);
                    }
                    None => {
                        conn.close();
                        return Err(PeerError::ConnectionClosed);
                    }
                },
                _ = sleep(self.retransmit_interval) => {}
                _ = conn.closed() => return Err(PeerError::ConnectionClosed),
            }
        }
        conn.close();
        Err(PeerError::HandshakeTimeout)
    }

    fn make_cer(&self, local_ip: IpAddr) -> Message {
        let cfg = self.handler.settings();
        let mut m = Message::request(cmd_code::CAPABILITIES_EXCHANGE, 0);
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(cfg.origin_host.clone()),
        );
        m.new_avp(
            avp_code::ORIGIN_REALM,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity(cfg.origin_realm.clone()),
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
            AvpValue::Unsigned32(cfg.vendor_id),
        );
        m.new_avp(
            avp_code::PRODUCT_NAME,
            0,
            0,
            AvpValue::Utf8String(cfg.product_name.clone()),
        );
        if cfg.origin_state_id != 0 {
            m.new_avp(
                avp_code::ORIGIN_STATE_ID,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(cfg.origin_state_id),
            );
        }
        for avp in &self.supported_vendor_id {
            m.add_avp(avp.clone());
        }
        for avp in &self.auth_application_id {
            m.add_avp(avp.clone());
        }
        m.new_avp(
            avp_code::INBAND_SECURITY_ID,
            avp_flags::M,
            0,
            AvpValue::Unsigned32(inband_security::NO_INBAND_SECURITY),
        );
        for avp in &self.acct_application_id {
            m.add_avp(avp.clone());
        }
        for avp in &self.vendor_specific_application_id {
            m.add_avp(avp.clone());
        }
        if cfg.firmware_revision != 0 {
            m.new_avp(
                avp_code::FIRMWARE_REVISION,
                avp_flags::M,
                0,
                AvpValue::Unsigned32(cfg.firmware_revision),
            );
        }
        m
    }
}

/// Periodic DWR loop; closes the connection when a watchdog exchange
/// exhausts its retries.
async fn watchdog(
    conn: Connection,
    mut dwa_rx: mpsc::Receiver<()>,
    settings: crate::state_machine::Settings,
    interval: Duration,
    retransmit_interval: Duration,
    max_retransmits: u32,
) {
    loop {
        tokio::select! {
            _ = conn.closed() => return,
            _ = sleep(interval) => {
                if !exchange_dwr(
                    &conn,
                    &mut dwa_rx,
                    &settings,
                    retransmit_interval,
                    max_retransmits,
                )
                .await
                {
                    warn!(peer = %conn.peer_addr(), "watchdog failed, closing");
                    dbp_metrics::WATCHDOG_FAILURES.inc();
                    conn.close();
                    return;
                }
            }
        }
    }
}

/// One DWR/DWA exchange with the request retransmit policy.
async fn exchange_dwr(
    conn: &Connection,
    dwa_rx: &mut mpsc::Receiver<()>,
    settings: &crate::state_machine::Settings,
    retransmit_interval: Duration,
    max_retransmits: u32,
) -> bool {
    let mut m = make_dwr(settings);
    for attempt in 0..=max_retransmits {
        if attempt > 0 {
            m.set_retransmit();
            dbp_metrics::RETRANSMITS.inc();
        }
        if conn.send(m.clone()).is_err() {
            return false;
        }
        tokio::select! {
            answer = dwa_rx.recv() => return answer.is_some(),
            _ = sleep(retransmit_interval) => {}
            _ = conn.closed() => return false,
        }
    }
    false
}

fn make_dwr(settings: &crate::state_machine::Settings) -> Message {
    let mut m = Message::request(cmd_code::DEVICE_WATCHDOG, 0);
    m.new_avp(
        avp_code::ORIGIN_HOST,
        avp_flags::M,
        0,
        AvpValue::DiameterIdentity(settings.origin_host.clone()),
    );
    m.new_avp(
        avp_code::ORIGIN_REALM,
        avp_flags::M,
        0,
        AvpValue::DiameterIdentity(settings.origin_realm.clone()),
    );
    m.new_avp(
        avp_code::ORIGIN_STATE_ID,
        avp_flags::M,
        0,
        AvpValue::Unsigned32(settings.origin_state_id),
    );
    m
}
