//! TCP relay server
//!
//! Accepts players, registers them in the [`Relay`] and shuttles frames.
//! Each connection gets a reader loop (this task) and a writer task fed by an
//! unbounded queue, so a slow receiver never blocks the sender's reads.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::protocol::{encode_frame, read_frame_async, ControlSignal, FramingError};
use crate::relay::{control_frame, Frame, Relay};

/// Bind and serve until the process exits.
///
/// `ready_tx` receives the bound address once the listener is up, which lets
/// callers bind port 0.
pub async fn run_server(
    config: ServerConfig,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
) -> anyhow::Result<()> {
    run_server_until(config, ready_tx, std::future::pending()).await
}

/// Like [`run_server`] but returns once `shutdown` completes.
pub async fn run_server_until<F>(
    config: ServerConfig,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let bound = listener.local_addr()?;
    tracing::info!(addr = %bound, "battle server listening");
    if let Some(tx) = ready_tx {
        let _ = tx.send(bound);
    }

    let relay = Relay::new(config)?;
    serve(listener, relay, shutdown).await
}

/// Accept loop over an already bound listener.
pub async fn serve<F>(listener: TcpListener, relay: Arc<Relay>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        tracing::warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                let relay = Arc::clone(&relay);
                connections.spawn(async move {
                    if let Err(e) = handle_connection(socket, addr, relay).await {
                        tracing::warn!(peer = %addr, error = %e, "connection error");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    relay.shutdown();
    connections.shutdown().await;
    Ok(())
}

#[tracing::instrument(name = "player", skip(socket, relay), fields(peer = %addr))]
async fn handle_connection(
    mut socket: TcpStream,
    addr: SocketAddr,
    relay: Arc<Relay>,
) -> anyhow::Result<()> {
    let _ = socket.set_nodelay(true);
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let Some(id) = relay.join(addr, tx) else {
        tracing::info!("roster full, rejecting");
        let frame = control_frame(ControlSignal::RosterFull)?;
        socket.write_all(&frame).await?;
        socket.shutdown().await?;
        return Ok(());
    };

    let (mut reader, mut writer) = socket.into_split();

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let max_len = relay.config().max_frame_len;
    let result = tokio::select! {
        r = read_loop(&mut reader, id, &relay, max_len) => r,
        _ = &mut write_task => Ok(()),
    };

    relay.leave(id);
    write_task.abort();

    match result {
        Ok(()) => {
            tracing::info!(id, "player disconnected");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Forward every complete frame from this player to the other one.
///
/// Payloads are relayed verbatim; the server never decodes them.
async fn read_loop(
    reader: &mut OwnedReadHalf,
    id: u64,
    relay: &Relay,
    max_len: usize,
) -> Result<(), FramingError> {
    loop {
        let payload = match read_frame_async(reader, max_len).await {
            Ok(payload) => payload,
            Err(FramingError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };
        let frame: Frame = encode_frame(&payload)?.into();
        let delivered = relay.relay_from(id, &frame);
        tracing::trace!(id, bytes = payload.len(), delivered, "relayed frame");
    }
}
