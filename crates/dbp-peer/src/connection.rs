//! A live Diameter connection.
//!
//! Each connection owns exactly one reader task and one writer task. The
//! reader decodes frames and dispatches them to the mux in arrival order;
//! the writer drains a FIFO queue, which is the single point that keeps
//! outgoing frames from interleaving. Closing is idempotent: it lets the
//! writer drain queued messages, shuts the socket down and fires a
//! close-notify signal every subscriber observes, even late ones.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tracing::{debug, error};

use dbp_core::Message;
use dbp_dict::Dictionary;

use crate::codec::{Frame, MessageCodec};
use crate::error::{PeerError, Result};
use crate::meta::PeerMeta;
use crate::mux::{ErrorReport, Mux};
use crate::transport::Transport;

enum WriteCmd {
    Message(Message),
    Shutdown,
}

struct Inner {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    writer: mpsc::UnboundedSender<WriteCmd>,
    close_tx: watch::Sender<bool>,
    closed: AtomicBool,
    peer: OnceLock<PeerMeta>,
    context: DashMap<String, String>,
    dict: Arc<Dictionary>,
}

/// Cheap-clone handle to a connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Take ownership of a connected socket: spawn the reader and writer
    /// tasks and return the handle.
    pub fn spawn<T>(socket: T, mux: Arc<Mux>, dict: Arc<Dictionary>) -> Result<Self>
    where
        T: Transport + 'static,
    {
        let local_addr = socket.local_addr()?;
        let peer_addr = socket.peer_addr()?;
        let (read_half, write_half) = tokio::io::split(socket);

        let (writer, write_rx) = mpsc::unbounded_channel();
        let (close_tx, _) = watch::channel(false);

        let conn = Self {
            inner: Arc::new(Inner {
                local_addr,
                peer_addr,
                writer,
                close_tx,
                closed: AtomicBool::new(false),
                peer: OnceLock::new(),
                context: DashMap::new(),
                dict: dict.clone(),
            }),
        };

        dbp_metrics::ACTIVE_CONNECTIONS.inc();
        let framed = FramedRead::new(read_half, MessageCodec::new(dict));
        tokio::spawn(read_loop(framed, conn.clone(), mux));
        tokio::spawn(write_loop(write_half, write_rx, conn.clone()));
        Ok(conn)
    }

    /// Queue a message for sending. Frames are written in queue order.
    pub fn send(&self, m: Message) -> Result<()> {
        if self.is_closed() {
            return Err(PeerError::ConnectionClosed);
        }
        self.inner
            .writer
            .send(WriteCmd::Message(m))
            .map_err(|_| PeerError::ConnectionClosed)
    }

    /// Close the connection. Idempotent; queued writes are drained first
    /// and every close-notify subscriber is woken.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.writer.send(WriteCmd::Shutdown);
        // send_replace updates the value even with no live subscriber.
        self.inner.close_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to the close signal. The value flips to `true` exactly
    /// once; subscribing after the fact still observes it.
    pub fn close_notify(&self) -> watch::Receiver<bool> {
        self.inner.close_tx.subscribe()
    }

    /// Resolve when the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.close_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Peer metadata, present once the handshake accepted the peer.
    pub fn peer(&self) -> Option<&PeerMeta> {
        self.inner.peer.get()
    }

    /// Attach peer metadata. The first write wins; returns false if the
    /// metadata was already set.
    pub fn set_peer(&self, meta: PeerMeta) -> bool {
        self.inner.peer.set(meta).is_ok()
    }

    /// Mutable key/value bag for application use.
    pub fn context(&self) -> &DashMap<String, String> {
        &self.inner.context
    }

    pub fn dict(&self) -> Arc<Dictionary> {
        self.inner.dict.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local", &self.inner.local_addr)
            .field("peer", &self.inner.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop<T>(
    mut framed: FramedRead<ReadHalf<T>, MessageCodec>,
    conn: Connection,
    mux: Arc<Mux>,
) where
    T: Transport + 'static,
{
    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(Frame::Message(m))) => {
                    dbp_metrics::MESSAGES_IN.inc();
                    mux.dispatch(&conn, m).await;
                }
                Some(Ok(Frame::Invalid(e))) => {
                    dbp_metrics::DECODE_ERRORS.inc();
                    mux.report(ErrorReport {
                        peer_addr: Some(conn.peer_addr()),
                        message: None,
                        result_code: Some(e.to_result_code()),
                        error: e.into(),
                    });
                }
                Some(Err(e)) => {
                    // Framing is unrecoverable; report and tear down.
                    let result_code = match &e {
                        PeerError::Codec(codec) => Some(codec.to_result_code()),
                        _ => None,
                    };
                    mux.report(ErrorReport {
                        peer_addr: Some(conn.peer_addr()),
                        message: None,
                        result_code,
                        error: e,
                    });
                    break;
                }
                None => {
                    debug!(peer = %conn.peer_addr(), "connection closed by peer");
                    break;
                }
            },
            _ = conn.closed() => break,
        }
    }
    conn.close();
    dbp_metrics::ACTIVE_CONNECTIONS.dec();
}

async fn write_loop<T>(
    mut write_half: WriteHalf<T>,
    mut rx: mpsc::UnboundedReceiver<WriteCmd>,
    conn: Connection,
) where
    T: Transport + 'static,
{
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriteCmd::Message(m) => {
                let bytes = m.to_bytes();
                if let Err(e) = write_half.write_all(&bytes).await {
                    error!(peer = %conn.peer_addr(), error = %e, "write failed");
                    break;
                }
                dbp_metrics::MESSAGES_OUT.inc();
            }
            WriteCmd::Shutdown => break,
        }
    }
    let _ = write_half.shutdown().await;
    conn.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::time::timeout;

    use dbp_core::avp::flags as avp_flags;
    use dbp_core::AvpValue;
    use dbp_dict::{avp_code, cmd_code};

    // Serves preset bytes, then EOF; collects everything written.
    struct MockTransport {
        read_data: Vec<u8>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl AsyncRead for MockTransport {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let me = self.get_mut();
            if me.read_data.is_empty() {
                return Poll::Ready(Ok(()));
            }
            let len = std::cmp::min(buf.remaining(), me.read_data.len());
            buf.put_slice(&me.read_data[..len]);
            me.read_data.drain(..len);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTransport {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn peer_addr(&self) -> std::io::Result<SocketAddr> {
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 12345))
        }

        fn local_addr(&self) -> std::io::Result<SocketAddr> {
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3868))
        }
    }

    fn dwr() -> Message {
        let mut m = Message::request(cmd_code::DEVICE_WATCHDOG, 0);
        m.new_avp(
            avp_code::ORIGIN_HOST,
            avp_flags::M,
            0,
            AvpValue::DiameterIdentity("cli".into()),
        );
        m
    }

    #[tokio::test]
    async fn test_incoming_frames_dispatch_in_order() {
        let dict = Arc::new(Dictionary::base());
        let mux = Arc::new(Mux::new(dict.clone()));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        mux.handle_func("DWR", move |_conn, _m| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut read_data = dwr().to_bytes().to_vec();
        read_data.extend_from_slice(&dwr().to_bytes());
        let transport = MockTransport {
            read_data,
            written: Arc::new(Mutex::new(Vec::new())),
        };

        let conn = Connection::spawn(transport, mux, dict).unwrap();
        timeout(Duration::from_secs(1), conn.closed()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_frame_reports_result_code() {
        let dict = Arc::new(Dictionary::base());
        let mux = Arc::new(Mux::new(dict.clone()));
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        mux.set_error_handler(move |report| {
            *captured.lock().unwrap() = report.result_code;
        });

        // Valid framing, unknown AVP code inside.
        let mut frame = dwr().to_bytes().to_vec();
        frame[20..24].copy_from_slice(&0xFFFFu32.to_be_bytes());
        let transport = MockTransport {
            read_data: frame,
            written: Arc::new(Mutex::new(Vec::new())),
        };

        let conn = Connection::spawn(transport, mux, dict).unwrap();
        timeout(Duration::from_secs(1), conn.closed()).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            Some(dbp_core::result_code::AVP_UNSUPPORTED)
        );
    }

    #[tokio::test]
    async fn test_writes_are_serialized_in_send_order() {
        let dict = Arc::new(Dictionary::base());
        let mux = Arc::new(Mux::new(dict.clone()));
        let written = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport {
            read_data: Vec::new(),
            written: written.clone(),
        };

        let conn = Connection::spawn(transport, mux, dict).unwrap();
        let frames: Vec<_> = (0..3).map(|_| dwr()).collect();
        let mut expected = Vec::new();
        for m in &frames {
            expected.extend_from_slice(&m.to_bytes());
            conn.send(m.clone()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*written.lock().unwrap(), expected);
        conn.close();
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let dict = Arc::new(Dictionary::base());
        let mux = Arc::new(Mux::new(dict.clone()));
        let transport = MockTransport {
            read_data: Vec::new(),
            written: Arc::new(Mutex::new(Vec::new())),
        };
        let conn = Connection::spawn(transport, mux, dict).unwrap();
        conn.close();
        conn.close(); // idempotent
        assert!(matches!(conn.send(dwr()), Err(PeerError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_peer_meta_set_once() {
        let dict = Arc::new(Dictionary::base());
        let mux = Arc::new(Mux::new(dict.clone()));
        let transport = MockTransport {
            read_data: Vec::new(),
            written: Arc::new(Mutex::new(Vec::new())),
        };
        let conn = Connection::spawn(transport, mux, dict).unwrap();
        assert!(conn.peer().is_none());

        let meta = PeerMeta {
            origin_host: "cli".to_string(),
            origin_realm: "test".to_string(),
            vendor_id: 13,
            product_name: "dbp".to_string(),
            origin_state_id: None,
            applications: vec![1001],
        };
        assert!(conn.set_peer(meta.clone()));
        assert!(!conn.set_peer(meta));
        assert_eq!(conn.peer().unwrap().origin_host, "cli");
        conn.close();
    }
}
