//! Server endpoint: accept loop over TCP or TLS, one connection handle
//! per accepted socket.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use dbp_core::DEFAULT_PORT;
use dbp_dict::Dictionary;

use crate::connection::Connection;
use crate::error::Result;
use crate::state_machine::StateMachine;
use crate::tls;

/// A Diameter server. The state machine answers CERs and watchdogs;
/// application handlers are registered on it before listening.
pub struct Server {
    pub handler: Arc<StateMachine>,
    /// Dictionary override; the state machine's dictionary is used if unset.
    pub dict: Option<Arc<Dictionary>>,
}

impl Server {
    pub fn new(handler: Arc<StateMachine>) -> Self {
        Self {
            handler,
            dict: None,
        }
    }

    fn dict(&self) -> Arc<Dictionary> {
        self.dict.clone().unwrap_or_else(|| self.handler.dict())
    }

    /// Bind and run the accept loop. An empty address binds the default
    /// Diameter port on all interfaces.
    pub async fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(listen_target(addr)).await?;
        self.serve(listener).await
    }

    /// Run the accept loop on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "listening");
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!(peer = %addr, "connection accepted");
                    if let Err(e) = Connection::spawn(socket, self.handler.mux(), self.dict()) {
                        error!(peer = %addr, error = %e, "failed to start connection");
                    }
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Bind and run the accept loop with TLS from PEM cert/key files.
    pub async fn listen_tls(&self, addr: &str, cert_file: &str, key_file: &str) -> Result<()> {
        let acceptor = tls::acceptor(cert_file, key_file)?;
        let listener = TcpListener::bind(listen_target(addr)).await?;
        self.serve_tls(listener, acceptor).await
    }

    /// Run the TLS accept loop on an already-bound listener.
    pub async fn serve_tls(&self, listener: TcpListener, acceptor: TlsAcceptor) -> Result<()> {
        info!(addr = %listener.local_addr()?, "listening (TLS)");
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    let acceptor = acceptor.clone();
                    let mux = self.handler.mux();
                    let dict = self.dict();
                    // The TLS handshake must not stall the accept loop.
                    tokio::spawn(async move {
                        match acceptor.accept(socket).await {
                            Ok(stream) => {
                                if let Err(e) = Connection::spawn(stream, mux, dict) {
                                    error!(peer = %addr, error = %e, "failed to start connection");
                                }
                            }
                            Err(e) => error!(peer = %addr, error = %e, "TLS accept failed"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

fn listen_target(addr: &str) -> String {
    if addr.is_empty() {
        return format!("0.0.0.0:{DEFAULT_PORT}");
    }
    addr.to_string()
}

/// Listen on `addr` with the given handler. Convenience wrapper around
/// [`Server`].
pub async fn listen(
    addr: &str,
    handler: Arc<StateMachine>,
    dict: Option<Arc<Dictionary>>,
) -> Result<()> {
    let mut srv = Server::new(handler);
    srv.dict = dict;
    srv.listen(addr).await
}

/// Listen with TLS. Convenience wrapper around [`Server`].
pub async fn listen_tls(
    addr: &str,
    cert_file: &str,
    key_file: &str,
    handler: Arc<StateMachine>,
    dict: Option<Arc<Dictionary>>,
) -> Result<()> {
    let mut srv = Server::new(handler);
    srv.dict = dict;
    srv.listen_tls(addr, cert_file, key_file).await
}
