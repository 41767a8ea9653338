//! UDP multicast transport for the coordination protocol.
//!
//! Two sockets per node: a receive socket bound to the group port with
//! address/port reuse (so several nodes on one host can share the group) and
//! an any-bound send socket. The send socket's ephemeral port doubles as the
//! node's identity when a duplicate node id must be told apart from our own
//! looped-back announcements.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::NodeConfig;
use crate::error::{Error, Result};

/// Receive buffer size. Far larger than any state record; anything that does
/// not match the record size is dropped by the caller anyway.
const MAX_DATAGRAM: usize = 1500;

/// Datagram send/receive on one IPv4 multicast group.
#[derive(Debug)]
pub struct MulticastTransport {
    recv: UdpSocket,
    send: UdpSocket,
    group: SocketAddrV4,
    local: SocketAddrV4,
}

impl MulticastTransport {
    /// Binds both sockets, joins the group on the any-interface, enables
    /// loopback (peers on the same host must hear each other) and applies the
    /// configured TTL.
    pub fn open(config: &NodeConfig) -> Result<Self> {
        if !config.group.is_multicast() {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not an IPv4 multicast group", config.group),
            )));
        }
        let group = SocketAddrV4::new(config.group, config.port);

        let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::Transport)?;
        sock.set_reuse_address(true).map_err(Error::Transport)?;
        #[cfg(unix)]
        sock.set_reuse_port(true).map_err(Error::Transport)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
        sock.bind(&bind_addr.into()).map_err(Error::Transport)?;
        let recv: UdpSocket = sock.into();
        recv.join_multicast_v4(&config.group, &Ipv4Addr::UNSPECIFIED)
            .map_err(Error::Transport)?;
        recv.set_multicast_loop_v4(true).map_err(Error::Transport)?;

        let send =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(Error::Transport)?;
        send.set_multicast_ttl_v4(config.ttl).map_err(Error::Transport)?;
        send.set_multicast_loop_v4(true).map_err(Error::Transport)?;
        let local = match send.local_addr().map_err(Error::Transport)? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(Error::Transport(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("expected an IPv4 local address, got {addr}"),
                )))
            }
        };

        Ok(Self {
            recv,
            send,
            group,
            local,
        })
    }

    /// The bound address of the sending socket. The port is what peers see
    /// as the datagram source port.
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local
    }

    /// Sends one datagram to the group.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let sent = self
            .send
            .send_to(payload, self.group)
            .map_err(Error::Transport)?;
        if sent != payload.len() {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram send ({sent} of {} bytes)", payload.len()),
            )));
        }
        Ok(())
    }

    /// Waits up to `max_wait` for one datagram; `Ok(None)` on timeout.
    ///
    /// A zero `max_wait` is a pure poll: it returns a datagram only if one is
    /// already queued.
    pub fn recv(&self, max_wait: Duration) -> Result<Option<(Vec<u8>, SocketAddr)>> {
        if max_wait.is_zero() {
            self.recv.set_nonblocking(true).map_err(Error::Transport)?;
        } else {
            self.recv.set_nonblocking(false).map_err(Error::Transport)?;
            self.recv
                .set_read_timeout(Some(max_wait))
                .map_err(Error::Transport)?;
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        match self.recv.recv_from(&mut buf) {
            Ok((len, src)) => {
                buf.truncate(len);
                Ok(Some((buf, src)))
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(Error::Transport(err)),
        }
    }
}
