//! TCP transport
//!
//! One accept thread plus one blocking reader thread per wand connection.
//! `accept` cannot be cancelled, so stopping the receiver sets the stop flag
//! and then connects to the listener once to wake it up.

use parking_lot::Mutex;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::socket::{create_listener, wake_address};
use super::PacketRouter;
use crate::constants::TCP_READ_SIZE;
use crate::error::{NetworkError, ProtocolError};
use crate::protocol::stream::StreamDeframer;

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// A live wand connection
struct Connection {
    /// Clone of the reader's stream, used to unblock its read on shutdown
    stream: TcpStream,
    handle: JoinHandle<()>,
}

/// TCP listener and its reader threads
pub struct TcpReceiver {
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    accept_handle: Option<JoinHandle<()>>,
    connections: Arc<Mutex<Vec<Connection>>>,
}

impl TcpReceiver {
    /// Bind and start accepting. Bind failures are returned to the caller.
    pub fn start(addr: SocketAddr, router: Arc<PacketRouter>, max_frame_samples: usize) -> Result<Self, NetworkError> {
        let listener = create_listener(addr)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let connections = Arc::new(Mutex::new(Vec::new()));

        let running_for_loop = running.clone();
        let connections_for_loop = connections.clone();
        let handle = thread::Builder::new()
            .name("wand-tcp-accept".to_string())
            .spawn(move || {
                Self::accept_loop(listener, router, max_frame_samples, running_for_loop, connections_for_loop);
            })
            .map_err(|e| NetworkError::SpawnFailed(e.to_string()))?;

        tracing::info!("TCP receiver listening on {}", local_addr);

        Ok(Self {
            running,
            local_addr,
            accept_handle: Some(handle),
            connections,
        })
    }

    fn accept_loop(
        listener: TcpListener,
        router: Arc<PacketRouter>,
        max_frame_samples: usize,
        running: Arc<AtomicBool>,
        connections: Arc<Mutex<Vec<Connection>>>,
    ) {
        while running.load(Ordering::SeqCst) {
            tracing::debug!("Waiting for wand TCP connection...");
            let (stream, addr) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        // Existing connections keep running; only new ones are refused.
                        tracing::error!("{}", NetworkError::AcceptFailed(e.to_string()));
                    }
                    break;
                }
            };
            if !running.load(Ordering::SeqCst) {
                break;
            }

            tracing::info!("Connected to wand at {}", addr);
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }
            let shutdown_handle = match stream.try_clone() {
                Ok(clone) => clone,
                Err(e) => {
                    tracing::error!("Failed to clone stream for {}: {}", addr, e);
                    continue;
                }
            };

            router.connect(addr);

            let router_for_reader = router.clone();
            let running_for_reader = running.clone();
            let spawned = thread::Builder::new()
                .name(format!("wand-tcp-{}", addr))
                .spawn(move || {
                    Self::read_loop(stream, addr, router_for_reader, max_frame_samples, running_for_reader);
                });

            match spawned {
                Ok(handle) => {
                    let mut connections = connections.lock();
                    connections.retain(|c| !c.handle.is_finished());
                    connections.push(Connection {
                        stream: shutdown_handle,
                        handle,
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to spawn reader for {}: {}", addr, e);
                    router.disconnect(addr);
                }
            }
        }
        tracing::debug!("TCP accept loop exited");
    }

    fn read_loop(
        mut stream: TcpStream,
        addr: SocketAddr,
        router: Arc<PacketRouter>,
        max_frame_samples: usize,
        running: Arc<AtomicBool>,
    ) {
        let mut deframer = StreamDeframer::new(max_frame_samples);
        let mut buf = [0u8; TCP_READ_SIZE];

        while running.load(Ordering::Relaxed) {
            let n = match stream.read(&mut buf) {
                Ok(0) => {
                    tracing::info!("Lost connection from wand at {}", addr);
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if running.load(Ordering::Relaxed) {
                        tracing::warn!("Read from wand {} failed: {}", addr, e);
                    }
                    break;
                }
            };

            router.stats().add_bytes(n);
            deframer.extend(&buf[..n]);
            while let Some(frame) = deframer.next_frame() {
                let routed = frame.and_then(|samples| router.route_tcp_frame(addr, &samples));
                match routed {
                    Ok(_) => {}
                    Err(e @ ProtocolError::FrameTooLong { .. }) => {
                        router.stats().add_invalid();
                        tracing::warn!("Resynchronising stream from {}: {}", addr, e);
                    }
                    Err(e) => tracing::debug!("Discarded frame from {}: {}", addr, e),
                }
            }
        }

        router.disconnect(addr);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection and join all threads
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // Wake the blocking accept
        if let Err(e) = TcpStream::connect_timeout(&wake_address(self.local_addr), WAKE_TIMEOUT) {
            tracing::debug!("Wake connection failed: {}", e);
        }
        if let Some(handle) = self.accept_handle.take() {
            if handle.join().is_err() {
                tracing::error!("TCP accept thread panicked");
            }
        }

        let connections: Vec<Connection> = self.connections.lock().drain(..).collect();
        for connection in connections {
            let _ = connection.stream.shutdown(Shutdown::Both);
            if connection.handle.join().is_err() {
                tracing::error!("TCP reader thread panicked");
            }
        }
        tracing::info!("TCP receiver on {} stopped", self.local_addr);
    }
}

impl Drop for TcpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
