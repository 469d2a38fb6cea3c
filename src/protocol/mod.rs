//! YMODEM/CRC protocol implementation.

pub mod frame;
pub mod receiver;
pub mod sender;

pub use receiver::YmodemReceiver;
pub use sender::YmodemSender;
