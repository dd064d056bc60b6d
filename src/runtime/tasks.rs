//! Cooperative-task runtime (tokio, current-thread).
//!
//! Same contract as the polling loop, different substrate: one lightweight
//! task per connection races a pinned line read against the connection's
//! `Notify` wakeups (raised whenever the broadcast path queues a chunk). A
//! single asynchronous mutex around the registry serializes concurrent
//! registration and removal from the accept/disconnect paths.

use crate::chat;
use crate::chat::command::CommandTable;
use crate::chat::registry::{Connection, ConnectionRegistry, Link, PeerId};
use crate::config::Config;
use crate::runtime::{resolve_addr, StartupError};
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};

use tracing::{debug, error, info, warn};

/// Wakeup handle for a connection task.
pub struct TaskLink(Arc<Notify>);

impl Link for TaskLink {
    fn wake(&self) {
        self.0.notify_one();
    }
}

type SharedRegistry = Arc<Mutex<ConnectionRegistry<TaskLink>>>;

/// Run the task-based server on a current-thread runtime until Ctrl-C.
pub fn run(config: Config) -> Result<(), StartupError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), StartupError> {
    let addr = resolve_addr(&config.host, config.port, "0.0.0.0")?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Bind(addr, e))?;
    info!(addr = %listener.local_addr()?, "Server listening");

    let registry: SharedRegistry = Arc::new(Mutex::new(ConnectionRegistry::new(
        config.max_connections,
    )));
    let table = Arc::new(CommandTable::with_builtins());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
        result = accept_loop(listener, registry, table) => result,
    }
}

/// Accept connections forever, spawning one task per peer.
///
/// Split out from `serve` so tests can drive it against an ephemeral
/// listener without the signal handling around it.
pub async fn accept_loop(
    listener: TcpListener,
    registry: SharedRegistry,
    table: Arc<CommandTable>,
) -> Result<(), StartupError> {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let registry = Arc::clone(&registry);
                let table = Arc::clone(&table);
                tokio::spawn(handle_client(stream, peer_addr, registry, table));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Drive one connection: register, then race reads against send wakeups
/// until the peer leaves or fails.
async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: SharedRegistry,
    table: Arc<CommandTable>,
) {
    let notify = Arc::new(Notify::new());
    let id = {
        let mut registry = registry.lock().await;
        let conn = Connection::new(peer_addr.to_string(), TaskLink(Arc::clone(&notify)));
        match registry.insert(conn) {
            Some(id) => {
                chat::connection_made(&mut registry, id);
                id
            }
            None => {
                warn!(peer = %peer_addr, "Connection limit reached, rejecting");
                return;
            }
        }
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    'session: loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line);
        tokio::pin!(read);

        // The read future stays pending across wakeups of the send side, so
        // no inbound bytes are ever dropped by the race.
        loop {
            tokio::select! {
                result = &mut read => {
                    match result {
                        Ok(0) => break 'session,
                        Ok(_) => {
                            let mut registry = registry.lock().await;
                            chat::message_received(&mut registry, &table, id, &line);
                        }
                        Err(e) => {
                            debug!(peer = %peer_addr, error = %e, "Read failed");
                            break 'session;
                        }
                    }
                    break;
                }
                _ = notify.notified() => {
                    if flush_outbox(&registry, id, &mut write_half).await.is_err() {
                        break 'session;
                    }
                }
            }
        }
    }

    let mut registry = registry.lock().await;
    chat::connection_lost(&mut registry, id);
}

/// Write out every queued chunk. The registry lock is released around each
/// socket write so a slow peer never stalls the rest of the server.
async fn flush_outbox(
    registry: &SharedRegistry,
    id: PeerId,
    writer: &mut OwnedWriteHalf,
) -> io::Result<()> {
    loop {
        let chunk: Option<Bytes> = {
            let mut registry = registry.lock().await;
            registry.get_mut(id).and_then(|conn| conn.next_chunk())
        };
        match chunk {
            Some(chunk) => writer.write_all(&chunk).await?,
            None => return Ok(()),
        }
    }
}
