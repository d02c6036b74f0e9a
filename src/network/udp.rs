//! UDP transport
//!
//! A single socket receives datagrams from every wand and demultiplexes them
//! by source address. Wands are never torn down on this transport.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::socket::{create_socket, wake_address};
use super::{PacketRouter, RouteOutcome};
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;

/// Receive timeout, so a lost wake-up datagram cannot hang shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// UDP receiver thread
pub struct UdpReceiver {
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    thread_handle: Option<JoinHandle<()>>,
}

impl UdpReceiver {
    pub fn start(addr: SocketAddr, router: Arc<PacketRouter>, recv_buffer: Option<usize>) -> Result<Self, NetworkError> {
        let socket = create_socket(addr, recv_buffer)?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let handle = thread::Builder::new()
            .name("wand-udp".to_string())
            .spawn(move || Self::receive_loop(socket, router, running_for_loop))
            .map_err(|e| NetworkError::SpawnFailed(e.to_string()))?;

        tracing::info!("UDP receiver listening on {}", local_addr);

        Ok(Self {
            running,
            local_addr,
            thread_handle: Some(handle),
        })
    }

    fn receive_loop(socket: UdpSocket, router: Arc<PacketRouter>, running: Arc<AtomicBool>) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        while running.load(Ordering::SeqCst) {
            let (n, addr) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) => match e.kind() {
                    std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    // Windows reports ICMP port-unreachable on the next receive
                    | std::io::ErrorKind::ConnectionReset => continue,
                    _ => {
                        tracing::error!("{}", NetworkError::ReceiveFailed(e.to_string()));
                        break;
                    }
                },
            };
            // Zero-length datagrams are the stop wake-up
            if n == 0 {
                continue;
            }

            router.stats().add_bytes(n);
            match router.route_datagram(addr, &buf[..n]) {
                Ok(RouteOutcome::Queued) | Ok(RouteOutcome::Stale) => {}
                Err(e) => tracing::debug!("Discarded datagram from {}: {}", addr, e),
            }
        }
        tracing::debug!("UDP receive loop exited");
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the receiver and join its thread
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let bind_any = if self.local_addr.is_ipv4() {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        } else {
            SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
        };
        match UdpSocket::bind(bind_any) {
            Ok(waker) => {
                if let Err(e) = waker.send_to(&[], wake_address(self.local_addr)) {
                    tracing::debug!("Wake datagram failed: {}", e);
                }
            }
            Err(e) => tracing::debug!("Wake socket failed: {}", e),
        }

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("UDP receiver thread panicked");
            }
        }
        tracing::info!("UDP receiver on {} stopped", self.local_addr);
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
