//! # fwlink
//!
//! A transport-agnostic YMODEM/CRC file transfer library, used to stream
//! firmware images to embedded targets over whichever link the target
//! exposes: a TCP byte stream today, SocketCAN behind the `can` feature.
//!
//! The protocol layer ([`protocol`]) only ever talks to the [`transport`]
//! abstraction, never to a concrete socket or bus, so the same sender and
//! receiver state machines drive any medium that can move bytes.
//!
//! ## Example
//!
//! ```no_run
//! use fwlink::registry::TransportKind;
//! use fwlink::protocol::YmodemSender;
//!
//! # fn main() -> fwlink::error::Result<()> {
//! let mut transport = TransportKind::TcpClient {
//!     ip: "192.168.1.50".into(),
//!     port: 9000,
//! }
//! .open()?;
//!
//! let firmware = std::fs::read("firmware.bin").unwrap();
//! let mut sender = YmodemSender::new(&mut *transport);
//! sender.send("firmware.bin", &firmware)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crc;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use error::{Error, Result};
pub use protocol::frame;
pub use protocol::{YmodemReceiver, YmodemSender};
pub use registry::TransportKind;
pub use transport::Transport;
