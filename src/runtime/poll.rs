//! Readiness-polling event loop (mio).
//!
//! Single thread, no blocking calls: poll tells us which sockets are ready,
//! then we perform non-blocking accept/read/write syscalls. Within one tick
//! accepts are processed before reads, reads before writes, errors last.
//! Write interest is derived from outbound-queue state and synced through
//! `reregister` at the end of every tick.
//!
//! The poll wait is bounded to 100 ms so the loop stays responsive to
//! SIGINT, which a libc handler records in an atomic flag.

use crate::chat;
use crate::chat::command::CommandTable;
use crate::chat::framer::{decode_dropping, MAX_FRAME_SIZE};
use crate::chat::registry::{Connection, ConnectionRegistry, Link, PeerId};
use crate::config::Config;
use crate::runtime::{resolve_addr, StartupError};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const EVENT_CAPACITY: usize = 256;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Scheduler state attached to each connection: the mio stream and the
/// currently registered write interest.
pub struct PollLink {
    stream: TcpStream,
    want_write: bool,
}

/// The polling loop recomputes write interest every tick; enqueues need no
/// explicit wakeup.
impl Link for PollLink {}

/// Run the polling server until SIGINT.
pub fn run(config: Config) -> Result<(), StartupError> {
    // SAFETY: installs a handler that only stores to an atomic flag.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as usize);
    }

    let mut server = PollServer::bind(&config)?;
    info!(addr = %server.local_addr()?, "Server listening");
    server.run()?;
    Ok(())
}

/// Single-threaded readiness-polling chat server.
pub struct PollServer {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    registry: ConnectionRegistry<PollLink>,
    table: CommandTable,
    shutdown: Arc<AtomicBool>,
}

impl PollServer {
    /// Resolve the configured address and bind the listening socket.
    pub fn bind(config: &Config) -> Result<Self, StartupError> {
        let addr = resolve_addr(&config.host, config.port, "0.0.0.0")?;
        let listener = create_listener(addr).map_err(|e| StartupError::Bind(addr, e))?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            registry: ConnectionRegistry::new(config.max_connections),
            table: CommandTable::with_builtins(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Flag that stops the loop at the next tick boundary.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Loop until shutdown or SIGINT. The listener closes on return; queued
    /// outbound data is not flushed.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) && !INTERRUPTED.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        info!("Server loop stopped");
        Ok(())
    }

    /// One readiness cycle: wait, then accept / read / write / error passes.
    fn tick(&mut self) -> io::Result<()> {
        self.poll.poll(&mut self.events, Some(POLL_TIMEOUT))?;

        let mut accept_ready = false;
        let mut readable = Vec::new();
        let mut writable = Vec::new();
        let mut errored = Vec::new();
        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => accept_ready = true,
                Token(id) => {
                    if event.is_readable() || event.is_read_closed() {
                        readable.push(id);
                    }
                    if event.is_writable() {
                        writable.push(id);
                    }
                    if event.is_error() {
                        errored.push(id);
                    }
                }
            }
        }

        if accept_ready {
            self.accept_ready_sockets()?;
        }
        for id in readable {
            self.handle_readable(id);
        }
        for id in writable {
            self.handle_writable(id);
        }
        for id in errored {
            self.terminate(id);
        }

        self.sync_write_interest()
    }

    fn accept_ready_sockets(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let link = PollLink {
                        stream,
                        want_write: false,
                    };
                    let conn = Connection::new(peer_addr.to_string(), link);
                    match self.registry.insert(conn) {
                        Some(id) => {
                            if let Some(conn) = self.registry.get_mut(id) {
                                self.poll.registry().register(
                                    &mut conn.link.stream,
                                    Token(id),
                                    Interest::READABLE,
                                )?;
                            }
                            chat::connection_made(&mut self.registry, id);
                        }
                        None => {
                            warn!(peer = %peer_addr, "Connection limit reached, rejecting");
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Drain the socket. Each non-empty read is one logical message; line
    /// reassembly across reads is left to the peer's line discipline.
    fn handle_readable(&mut self, id: PeerId) {
        let mut messages = Vec::new();
        let mut lost = false;
        {
            let Some(conn) = self.registry.get_mut(id) else {
                return;
            };
            let mut buf = [0u8; MAX_FRAME_SIZE];
            loop {
                match conn.link.stream.read(&mut buf) {
                    Ok(0) => {
                        lost = true;
                        break;
                    }
                    Ok(n) => messages.push(decode_dropping(&buf[..n])),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        debug!(conn_id = id, error = %e, "Read failed");
                        lost = true;
                        break;
                    }
                }
            }
        }

        for message in messages {
            chat::message_received(&mut self.registry, &self.table, id, &message);
        }
        if lost {
            self.terminate(id);
        }
    }

    /// Drain the outbound queue until empty or the socket would block.
    /// Partially written chunks keep their unsent tail at the queue front.
    fn handle_writable(&mut self, id: PeerId) {
        let mut lost = false;
        {
            let Some(conn) = self.registry.get_mut(id) else {
                return;
            };
            while let Some(chunk) = conn.next_chunk() {
                match conn.link.stream.write(&chunk) {
                    Ok(0) => {
                        lost = true;
                        break;
                    }
                    Ok(n) if n < chunk.len() => {
                        conn.requeue_front(chunk.slice(n..));
                    }
                    Ok(n) => {
                        trace!(conn_id = id, bytes = n, "Chunk sent");
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        conn.requeue_front(chunk);
                        break;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                        conn.requeue_front(chunk);
                    }
                    Err(e) => {
                        debug!(conn_id = id, error = %e, "Write failed");
                        lost = true;
                        break;
                    }
                }
            }
        }
        if lost {
            self.terminate(id);
        }
    }

    /// Remove the peer, broadcast its departure, release the socket.
    fn terminate(&mut self, id: PeerId) {
        if let Some(mut conn) = chat::connection_lost(&mut self.registry, id) {
            let _ = self.poll.registry().deregister(&mut conn.link.stream);
        }
    }

    /// Align registered interest with queue state: sockets with pending
    /// output are watched for writability, the rest for readability only.
    fn sync_write_interest(&mut self) -> io::Result<()> {
        let poll_registry = self.poll.registry();
        for (id, conn) in self.registry.iter_mut() {
            let want_write = conn.has_pending();
            if want_write != conn.link.want_write {
                conn.link.want_write = want_write;
                let interest = if want_write {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                poll_registry.reregister(&mut conn.link.stream, Token(id), interest)?;
            }
        }
        Ok(())
    }
}

/// Create a non-blocking TCP listener.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
