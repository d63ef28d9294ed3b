//! End-to-end capabilities-exchange tests over loopback TCP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::time::timeout;

use dbp_core::avp::flags as avp_flags;
use dbp_core::{Avp, AvpValue, Message};
use dbp_dict::{avp_code, cmd_code, AppKind, ApplicationDef, Dictionary};
use dbp_peer::{Client, PeerError, Server, Settings, StateMachine};

fn test_dict() -> Arc<Dictionary> {
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

fn server_settings() -> Settings {
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

fn client_settings() -> Settings {
    Settings {
        origin_host: "cli".to_string(),
        origin_realm: "test".to_string(),
        vendor_id: 13,
        product_name: "dbp".to_string(),
        origin_state_id: 1,
        firmware_revision: 1,
        tls_enabled: false,
    }
}

fn acct_client(dict: Arc<Dictionary>) -> Client {
    let sm = StateMachine::new(client_settings(), dict);
    let mut client = Client::new(sm);
    client.acct_application_id.push(Avp::new(
        avp_code::ACCT_APPLICATION_ID,
        avp_flags::M,
        0,
        AvpValue::Unsigned32(1001),
    ));
    client
}

async fn spawn_server(dict: Arc<Dictionary>) -> (String, Arc<StateMachine>) {
    let sm = StateMachine::new(server_settings(), dict);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let srv = Server::new(sm.clone());
    tokio::spawn(async move {
        let _ = srv.serve(listener).await;
    });
    (addr, sm)
}

#[tokio::test]
async fn test_handshake_success() {
    dbp_logging::init_test();
    let dict = test_dict();
    let (addr, server_sm) = spawn_server(dict.clone()).await;
    let mut accepted = server_sm.handshake_notify();

    let client = acct_client(dict);
    let conn = client.dial(&addr).await.unwrap();

    // Client side sees the server identity.
    let meta = conn.peer().expect("peer metadata after handshake");
    assert_eq!(meta.origin_host, "srv");
    assert_eq!(meta.origin_realm, "test");
    assert_eq!(meta.vendor_id, 13);
    assert_eq!(meta.applications, vec![1001]);

    // Server side sees the client identity.
    let server_conn = timeout(Duration::from_secs(2), accepted.recv())
        .await
        .expect("handshake notification")
        .unwrap();
    let meta = server_conn.peer().expect("peer metadata on server");
    assert_eq!(meta.origin_host, "cli");
    assert_eq!(meta.origin_state_id, Some(1));
    assert_eq!(meta.applications, vec![1001]);

    conn.close();
}

#[tokio::test]
async fn test_handshake_rejected_by_server() {
    dbp_logging::init_test();
    // The server's dictionary does not declare application 1001.
    let (addr, _server_sm) = spawn_server(Arc::new(Dictionary::base())).await;

    let client = acct_client(test_dict());
    match client.dial(&addr).await {
        Err(PeerError::FailedResultCode(code)) => {
            assert_eq!(code, dbp_core::result_code::NO_COMMON_APPLICATION);
        }
        other => panic!("expected FailedResultCode, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_retry_then_timeout() {
    dbp_logging::init_test();
    // A peer that reads CERs and never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let cer_count = Arc::new(AtomicUsize::new(0));

    let count = cer_count.clone();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let dict = Dictionary::base();
        loop {
            let mut prefix = [0u8; 4];
            if socket.read_exact(&mut prefix).await.is_err() {
                return;
            }
            let length = u32::from_be_bytes([0, prefix[1], prefix[2], prefix[3]]) as usize;
            let mut rest = vec![0u8; length - 4];
            if socket.read_exact(&mut rest).await.is_err() {
                return;
            }
            let mut frame = prefix.to_vec();
            frame.extend_from_slice(&rest);
            let m = Message::decode(&frame, &dict).unwrap();
            if m.header.code == cmd_code::CAPABILITIES_EXCHANGE && m.header.is_request() {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    let mut client = acct_client(test_dict());
    client.max_retransmits = 2;
    client.retransmit_interval = Duration::from_millis(50);

    let started = std::time::Instant::now();
    match client.dial(&addr).await {
        Err(PeerError::HandshakeTimeout) => {}
        other => panic!("expected HandshakeTimeout, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(150));

    // One initial send plus two retransmissions, no more.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cer_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cer_missing_application_closes_without_answer() {
    dbp_logging::init_test();
    let dict = test_dict();
    let (addr, _server_sm) = spawn_server(dict.clone()).await;

    // A handshake-less client speaking raw frames: CER with origin AVPs
    // but no application advertisement.
    let sm = StateMachine::new(client_settings(), dict.clone());
    let conn = dbp_peer::dial(&addr, sm.mux(), None).await.unwrap();

    let mut m = Message::request(cmd_code::CAPABILITIES_EXCHANGE, 0);
    m.new_avp(
        avp_code::ORIGIN_HOST,
        avp_flags::M,
        0,
        AvpValue::DiameterIdentity("cli".into()),
    );
    m.new_avp(
        avp_code::ORIGIN_REALM,
        avp_flags::M,
        0,
        AvpValue::DiameterIdentity("test".into()),
    );
    conn.send(m).unwrap();

    // The server must close without sending any CEA.
    timeout(Duration::from_secs(2), conn.closed())
        .await
        .expect("server should close the connection");
    assert!(conn.peer().is_none());
}
