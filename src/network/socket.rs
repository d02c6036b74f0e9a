//! Socket construction

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs, UdpSocket};

use crate::error::NetworkError;

const LISTEN_BACKLOG: i32 = 5;

/// Resolve `host:port` to a single address
pub fn resolve(addr: &str) -> Result<SocketAddr, NetworkError> {
    addr.to_socket_addrs()
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| NetworkError::BindFailed(format!("{}: no address", addr)))
}

/// Bind a TCP listener with address reuse enabled
pub fn create_listener(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    let bind_err = |e: std::io::Error| NetworkError::BindFailed(format!("{}: {}", addr, e));

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&SockAddr::from(addr)).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
    Ok(socket.into())
}

/// Bind a UDP socket, optionally enlarging its receive buffer
pub fn create_socket(addr: SocketAddr, recv_buffer: Option<usize>) -> Result<UdpSocket, NetworkError> {
    let bind_err = |e: std::io::Error| NetworkError::BindFailed(format!("{}: {}", addr, e));

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    if let Some(size) = recv_buffer {
        if let Err(e) = socket.set_recv_buffer_size(size) {
            tracing::warn!("Could not set UDP receive buffer to {} bytes: {}", size, e);
        }
    }
    socket.bind(&SockAddr::from(addr)).map_err(bind_err)?;
    Ok(socket.into())
}

/// Address a local peer can use to reach a socket bound to `local`
pub fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_address_uses_loopback() {
        let local: SocketAddr = "0.0.0.0:5005".parse().unwrap();
        assert_eq!(wake_address(local), "127.0.0.1:5005".parse().unwrap());

        let local: SocketAddr = "192.168.0.4:5005".parse().unwrap();
        assert_eq!(wake_address(local), local);
    }

    #[test]
    fn test_bind_ephemeral() {
        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);

        let socket = create_socket("127.0.0.1:0".parse().unwrap(), Some(1 << 16)).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let taken = listener.local_addr().unwrap();
        // A second listener on the same port must fail even with reuse set.
        assert!(matches!(create_listener(taken), Err(NetworkError::BindFailed(_))));
    }
}
