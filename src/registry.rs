//! Transport registry (C8): a closed, tagged enum standing in for the
//! reflection-based transport class lookup of the system this crate's
//! protocol layer was modeled on. Construction is a single match, not a
//! dynamic lookup, so unsupported combinations are caught at compile time.

use crate::error::Result;
use crate::transport::tcp::{TcpClientTransport, TcpServerTransport};
use crate::transport::Transport;

/// Identifies a transport to open and the parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// Connect out to a listening YMODEM peer.
    TcpClient {
        /// Peer host or IP address.
        ip: String,
        /// Peer TCP port.
        port: u16,
    },
    /// Bind and accept a single inbound YMODEM peer connection.
    TcpServer {
        /// Local TCP port to bind.
        port: u16,
    },
    /// Tunnel bytes over SocketCAN, addressed to a single `motor_id`.
    #[cfg(feature = "can")]
    Can {
        /// SocketCAN interface name (e.g. `"can0"`).
        interface: String,
        /// 6-bit motor/node identifier this transport is bound to.
        motor_id: u16,
    },
}

impl TransportKind {
    /// Open the transport described by this variant.
    pub fn open(self) -> Result<Box<dyn Transport>> {
        match self {
            TransportKind::TcpClient { ip, port } => {
                Ok(Box::new(TcpClientTransport::connect(&ip, port)?))
            },
            TransportKind::TcpServer { port } => Ok(Box::new(TcpServerTransport::accept_once(port)?)),
            #[cfg(feature = "can")]
            TransportKind::Can { interface, motor_id } => {
                Ok(Box::new(crate::transport::can::CanTransport::open(&interface, motor_id)?))
            },
        }
    }
}
