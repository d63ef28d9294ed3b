//! Command dispatch.
//!
//! Handlers are registered by command name ("CER", "DWA", application
//! commands like "CCR"); the name is resolved through the dictionary from
//! the command code and the request bit. Unmatched commands go to the
//! default handler, frames that failed to decode go to the error sink.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use dbp_dict::Dictionary;
use tracing::warn;

use crate::connection::Connection;
use crate::error::PeerError;
use dbp_core::Message;

/// An incoming-message handler. Handlers run on the connection's reader
/// task in arrival order; long-running work must be offloaded.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, conn: Connection, msg: Message);
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Connection, Message) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, conn: Connection, msg: Message) {
        (self.f)(conn, msg).await
    }
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Connection, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// A decode failure that precluded dispatch.
#[derive(Debug)]
pub struct ErrorReport {
    pub peer_addr: Option<SocketAddr>,
    pub message: Option<Message>,
    /// The Result-Code an answer for this failure would carry, when the
    /// error maps to one.
    pub result_code: Option<u32>,
    pub error: PeerError,
}

type ErrorSink = Box<dyn Fn(ErrorReport) + Send + Sync>;

/// Maps command names to handlers for one endpoint.
pub struct Mux {
    dict: Arc<Dictionary>,
    handlers: DashMap<String, Arc<dyn Handler>>,
    default_handler: RwLock<Option<Arc<dyn Handler>>>,
    error_sink: RwLock<Option<ErrorSink>>,
}

impl Mux {
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self {
            dict,
            handlers: DashMap::new(),
            default_handler: RwLock::new(None),
            error_sink: RwLock::new(None),
        }
    }

    pub fn dict(&self) -> Arc<Dictionary> {
        self.dict.clone()
    }

    /// Register a handler for a command name. Last writer wins.
    pub fn handle(&self, name: &str, handler: Arc<dyn Handler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Register an async closure for a command name.
    pub fn handle_func<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Connection, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle(name, handler_fn(f));
    }

    /// Install the handler for commands with no registered name.
    pub fn set_default(&self, handler: Arc<dyn Handler>) {
        *self.default_handler.write().unwrap() = Some(handler);
    }

    /// Install the sink for decode failures.
    pub fn set_error_handler<F>(&self, f: F)
    where
        F: Fn(ErrorReport) + Send + Sync + 'static,
    {
        *self.error_sink.write().unwrap() = Some(Box::new(f));
    }

    /// Deliver a decode failure to the error sink, or log it.
    pub fn report(&self, report: ErrorReport) {
        let sink = self.error_sink.read().unwrap();
        match sink.as_ref() {
            Some(f) => f(report),
            None => warn!(
                peer = ?report.peer_addr,
                result_code = ?report.result_code,
                error = %report.error,
                "decode error"
            ),
        }
    }

    /// Route one message to its handler.
    pub async fn dispatch(&self, conn: &Connection, m: Message) {
        let key = self
            .dict
            .find_command(m.header.application_id, m.header.code)
            .map(|cmd| cmd.key(m.header.is_request()))
            .ok();

        let handler = key
            .as_deref()
            .and_then(|k| self.handlers.get(k).map(|e| e.value().clone()))
            .or_else(|| self.default_handler.read().unwrap().clone());

        match handler {
            Some(h) => h.handle(conn.clone(), m).await,
            None => warn!(
                code = m.header.code,
                app = m.header.application_id,
                "no handler for command"
            ),
        }
    }
}
