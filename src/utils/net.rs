//! Socket binding with explicit IPv6-only behavior
//!
//! Every listener is bound through nix so that `[::]` never silently
//! captures IPv4 traffic meant for a separate `0.0.0.0` socket.

use std::io;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

use nix::sys::socket::{
    self, sockopt, AddressFamily, Backlog, SockFlag, SockProtocol, SockType, SockaddrIn,
    SockaddrIn6,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Tcp,
    Udp,
}

fn bind_socket(addr: SocketAddr, transport: Transport) -> io::Result<OwnedFd> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let (ty, protocol) = match transport {
        Transport::Tcp => (SockType::Stream, SockProtocol::Tcp),
        Transport::Udp => (SockType::Datagram, SockProtocol::Udp),
    };

    let fd = socket::socket(family, ty, SockFlag::SOCK_CLOEXEC, protocol)?;
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)?;

    match addr {
        SocketAddr::V4(v4) => socket::bind(fd.as_raw_fd(), &SockaddrIn::from(v4))?,
        SocketAddr::V6(v6) => {
            socket::setsockopt(&fd, sockopt::Ipv6V6Only, &true)?;
            socket::bind(fd.as_raw_fd(), &SockaddrIn6::from(v6))?;
        }
    }

    Ok(fd)
}

/// Non-blocking TCP listener, ready for `tokio::net::TcpListener::from_std`
pub fn bind_tcp_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let fd = bind_socket(addr, Transport::Tcp)?;
    socket::listen(&fd, Backlog::MAXCONN)?;

    let listener = TcpListener::from(fd);
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Non-blocking UDP socket, ready for `tokio::net::UdpSocket::from_std`
pub fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::from(bind_socket(addr, Transport::Udp)?);
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Blocking UDP socket for a dedicated reader thread
///
/// `recv_buffer` is a hint; the kernel may clamp it.
pub fn bind_blocking_udp_socket(
    addr: SocketAddr,
    read_timeout: Duration,
    recv_buffer: usize,
) -> io::Result<UdpSocket> {
    let fd = bind_socket(addr, Transport::Udp)?;
    if recv_buffer > 0 {
        if let Err(e) = socket::setsockopt(&fd, sockopt::RcvBuf, &recv_buffer) {
            tracing::debug!("Could not raise receive buffer on {}: {}", addr, e);
        }
    }

    let socket = UdpSocket::from(fd);
    socket.set_read_timeout(Some(read_timeout))?;
    Ok(socket)
}
