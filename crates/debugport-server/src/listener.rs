// ============================================
// File: crates/debugport-server/src/listener.rs
// ============================================
//! # Listener and Session Loop
//!
//! ## Creation Reason
//! The accept loop and per-connection session loop are where every
//! other component meets: pool admission, optional TLS wrapping, the
//! auth handshake, frame extraction, and dispatch. Keeping them in one
//! module keeps the connection lifecycle readable top to bottom.
//!
//! ## Main Logical Flow
//! 1. Accept a socket; admit it to the pool (or close immediately)
//! 2. Optionally wrap in TLS, distinguishing plaintext-on-TLS-port
//! 3. Send the auth challenge when auth is required
//! 4. Read bytes, extract frames, route to handshake or dispatcher
//! 5. On exit: remove from pool, publish the disconnect event
//!
//! ## ⚠️ Important Note for Next Developer
//! Pool admission happens BEFORE the TLS handshake on purpose: a
//! rejected over-capacity client must see its socket close with no
//! handshake bytes at all. Moving admission later leaks protocol data
//! to clients the server will not serve.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use debugport_common::{AuthToken, ClientId};
use debugport_core::auth::{Handshake, HandshakeOutcome};
use debugport_core::protocol::codec::FrameCodec;

use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::services::connection::{ClientConnection, ConnectionState};
use crate::services::dispatcher::Dispatcher;
use crate::services::pool::ConnectionPool;

/// Depth of the per-connection outbound queue (broadcasts and
/// disconnect notices); the session task drains it continuously.
const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Everything a session needs, shared across all connections.
pub(crate) struct ListenerContext {
    pub config: Arc<ServerConfig>,
    pub pool: Arc<ConnectionPool>,
    pub dispatcher: Arc<Dispatcher>,
    pub token: AuthToken,
    pub events: broadcast::Sender<ServerEvent>,
    pub shutdown: CancellationToken,
}

/// Runs the accept loop until shutdown is requested.
///
/// Individual connection faults are logged and absorbed; only the
/// shutdown token stops the loop.
pub(crate) async fn run_accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    ctx: Arc<ListenerContext>,
) {
    info!("Accept loop started");
    loop {
        tokio::select! {
            () = ctx.shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        admit(stream, peer_addr, tls.clone(), &ctx);
                    }
                    Err(e) => {
                        // Transient accept errors (EMFILE, resets) must
                        // not kill the listener.
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
    info!("Accept loop stopped");
}

/// Admits one accepted socket: pool capacity check, then session spawn.
fn admit(
    stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    tls: Option<TlsAcceptor>,
    ctx: &Arc<ListenerContext>,
) {
    let id = ClientId::generate();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let initial_state = if ctx.config.auth.required {
        ConnectionState::Connecting
    } else {
        ConnectionState::Connected
    };
    let conn = Arc::new(ClientConnection::new(
        id,
        peer_addr,
        outbound_tx,
        ctx.shutdown.child_token(),
        initial_state,
    ));

    if !ctx.pool.try_add(Arc::clone(&conn)) {
        // Over-capacity clients are dropped before any handshake
        // bytes; the close itself is the rejection signal.
        warn!(
            peer = %peer_addr,
            capacity = ctx.pool.capacity(),
            "Connection pool full, dropping new connection"
        );
        drop(stream);
        return;
    }

    info!(client_id = %id, peer = %peer_addr, clients = ctx.pool.len(), "Client connected");
    let _ = ctx.events.send(ServerEvent::ClientConnected { id, addr: peer_addr });

    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        handle_client(stream, tls, Arc::clone(&conn), outbound_rx, &ctx).await;

        ctx.pool.remove(&conn.id);
        conn.close();
        info!(
            client_id = %conn.id,
            state = %conn.state(),
            clients = ctx.pool.len(),
            "Client disconnected"
        );
        let _ = ctx.events.send(ServerEvent::ClientDisconnected { id: conn.id });
    });
}

/// Wraps the socket in TLS if configured, then runs the session loop.
async fn handle_client(
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    conn: Arc<ClientConnection>,
    outbound_rx: mpsc::Receiver<String>,
    ctx: &ListenerContext,
) {
    let result = match tls {
        Some(acceptor) => match accept_tls(stream, &acceptor, &conn).await {
            Some(tls_stream) => run_session(tls_stream, &conn, outbound_rx, ctx).await,
            None => {
                conn.set_state(ConnectionState::Error);
                return;
            }
        },
        None => run_session(stream, &conn, outbound_rx, ctx).await,
    };

    if let Err(e) = result {
        debug!(client_id = %conn.id, error = %e, "Session ended with I/O error");
        conn.set_state(ConnectionState::Error);
    }
}

/// Performs the TLS handshake, distinguishing the common operator
/// mistake of connecting with plain TCP to a TLS port.
async fn accept_tls(
    stream: TcpStream,
    acceptor: &TlsAcceptor,
    conn: &ClientConnection,
) -> Option<tokio_rustls::server::TlsStream<TcpStream>> {
    // TLS records start with a handshake content-type byte (0x16); a
    // peek lets us name the misconfiguration instead of surfacing an
    // opaque handshake error.
    let mut first = [0u8; 1];
    match stream.peek(&mut first).await {
        Ok(0) => {
            debug!(client_id = %conn.id, "Peer closed before TLS handshake");
            return None;
        }
        Ok(_) if first[0] != 0x16 => {
            warn!(
                client_id = %conn.id,
                peer = %conn.peer_addr,
                "Plaintext connection on TLS port; client must connect with TLS"
            );
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            debug!(client_id = %conn.id, error = %e, "Socket error before TLS handshake");
            return None;
        }
    }

    match acceptor.accept(stream).await {
        Ok(tls_stream) => Some(tls_stream),
        Err(e) => {
            warn!(client_id = %conn.id, peer = %conn.peer_addr, error = %e, "TLS handshake failed");
            None
        }
    }
}

/// Per-connection session loop: reads frames, routes them to the
/// handshake or the dispatcher, and drains the outbound queue.
async fn run_session<S>(
    stream: S,
    conn: &Arc<ClientConnection>,
    mut outbound_rx: mpsc::Receiver<String>,
    ctx: &ListenerContext,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut codec = FrameCodec::new();
    let mut handshake = ctx
        .config
        .auth
        .required
        .then(|| Handshake::new(ctx.token.clone()));
    let mut auth_misses: u32 = 0;

    if handshake.is_some() {
        send_line(&mut writer, conn, Handshake::challenge_line()).await?;
    }

    let cancel = conn.cancel_token();
    let read_timeout = ctx.config.read_timeout();
    let mut buf = BytesMut::with_capacity(4096);

    'session: loop {
        tokio::select! {
            () = cancel.cancelled() => break 'session,

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(line) => send_line(&mut writer, conn, line).await?,
                    None => break 'session,
                }
            }

            read = tokio::time::timeout(read_timeout, reader.read_buf(&mut buf)) => {
                let n = match read {
                    // A quiet period is not a fault; idle eviction is
                    // the sweeper's decision.
                    Err(_) => continue,
                    Ok(Err(e)) => return Err(e),
                    Ok(Ok(0)) => {
                        debug!(client_id = %conn.id, "Peer closed connection");
                        break 'session;
                    }
                    Ok(Ok(n)) => n,
                };

                conn.touch();
                conn.stats.record_rx(n);

                let chunk = buf.split();
                let frames = match codec.feed(&chunk) {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(client_id = %conn.id, error = %e, "Closing connection after framing fault");
                        conn.set_state(ConnectionState::Error);
                        break 'session;
                    }
                };

                for frame in frames {
                    let keep_open = process_frame(
                        &mut writer,
                        conn,
                        &mut handshake,
                        &mut auth_misses,
                        ctx,
                        &frame,
                    )
                    .await?;
                    if !keep_open {
                        break 'session;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Routes one extracted frame. Returns `false` when the connection
/// should close.
async fn process_frame<S>(
    writer: &mut WriteHalf<S>,
    conn: &Arc<ClientConnection>,
    handshake: &mut Option<Handshake>,
    auth_misses: &mut u32,
    ctx: &ListenerContext,
    frame: &str,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite,
{
    if let Some(hs) = handshake.as_mut() {
        if !conn.is_authenticated() {
            return match hs.process(frame) {
                HandshakeOutcome::Authenticated { reply } => {
                    send_line(writer, conn, reply).await?;
                    conn.mark_authenticated();
                    info!(client_id = %conn.id, "Client authenticated");
                    Ok(true)
                }
                HandshakeOutcome::Rejected { reply } => {
                    send_line(writer, conn, reply).await?;
                    warn!(
                        client_id = %conn.id,
                        peer = %conn.peer_addr,
                        "Authentication failed"
                    );
                    *auth_misses += 1;
                    Ok(*auth_misses < ctx.config.auth.max_retries)
                }
                HandshakeOutcome::Retry { reply } => {
                    send_line(writer, conn, reply).await?;
                    *auth_misses += 1;
                    if *auth_misses >= ctx.config.auth.max_retries {
                        warn!(
                            client_id = %conn.id,
                            "Closing connection after exhausted handshake attempts"
                        );
                        return Ok(false);
                    }
                    Ok(true)
                }
            };
        }
    }

    let response = ctx.dispatcher.dispatch(conn, frame).await;
    send_line(writer, conn, response).await?;
    Ok(true)
}

/// Writes one newline-terminated frame and updates the tx counter.
async fn send_line<S>(
    writer: &mut WriteHalf<S>,
    conn: &ClientConnection,
    line: String,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    conn.stats.record_tx(line.len() + 1);
    Ok(())
}
