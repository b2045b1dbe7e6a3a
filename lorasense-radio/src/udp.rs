use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use lorasense_core::protocol::MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::{Radio, TransportError};

/// One multicast group is one radio channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpRadioConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Local interface to join the group on; unspecified lets the OS choose.
    #[serde(default = "unspecified")]
    pub interface: Ipv4Addr,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl Default for UdpRadioConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 255, 76, 67),
            port: 7667,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// A radio emulated with UDP multicast: each datagram carries one frame.
///
/// Multicast loopback is enabled so several stations can share one host,
/// which also means a station hears its own frames. Protocol code filters
/// on addressing, so those are discarded like any other unrelated packet.
pub struct UdpRadio {
    socket: UdpSocket,
    target: SocketAddr,
    buf: Vec<u8>,
}

impl UdpRadio {
    /// Must be called from within a tokio runtime.
    pub fn open(config: &UdpRadioConfig) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
        socket.bind(&SocketAddr::V4(bind).into())?;
        socket.join_multicast_v4(&config.group, &config.interface)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;

        tracing::info!(group = %config.group, port = config.port, "joined radio channel");

        Ok(Self {
            socket,
            target: SocketAddr::V4(SocketAddrV4::new(config.group, config.port)),
            // One spare byte so oversized datagrams are seen as oversized
            // rather than silently truncated to a valid length.
            buf: vec![0; MAX_FRAME_SIZE + 1],
        })
    }
}

#[async_trait]
impl Radio for UdpRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        self.socket.send_to(frame, self.target).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let (len, from) = self.socket.recv_from(&mut self.buf).await?;
        tracing::trace!(%from, len, "datagram received");
        Ok(self.buf[..len].to_vec())
    }
}
