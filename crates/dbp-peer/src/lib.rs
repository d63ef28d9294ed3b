//! Diameter endpoint machinery: connections, command dispatch, the
//! capabilities-exchange handshake and the peer state machine.
//!
//! A [`Server`] accepts connections and answers CERs through its
//! [`StateMachine`]; a [`Client`] dials, performs the handshake with
//! bounded retransmission and optionally keeps the connection alive with
//! watchdogs. Both share the [`Connection`] read/write loops and the
//! [`Mux`] dispatch table.
//!
//! Dictionaries must be fully populated before the first `listen`/`dial`;
//! see [`dbp_dict::default`].

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod meta;
pub mod mux;
pub mod parser;
pub mod server;
pub mod state_machine;
pub mod tls;
pub mod transport;

pub use client::{dial, dial_tls, Client};
pub use connection::Connection;
pub use error::{PeerError, Result};
pub use meta::PeerMeta;
pub use mux::{handler_fn, ErrorReport, Handler, Mux};
pub use parser::{CapabilitiesExchange, Role};
pub use server::{listen, listen_tls, Server};
pub use state_machine::{Settings, StateMachine};
pub use transport::Transport;
