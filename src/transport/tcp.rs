//! TCP stream transport (C4): adapts a `TcpStream` to the [`Transport`]
//! contract via a background receiver thread that drains the socket into
//! an unbounded FIFO.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Socket-level read timeout for the background receiver thread. Short
/// enough that the thread notices a shutdown request promptly, without
/// spinning.
const READER_TICK: Duration = Duration::from_millis(1000);

/// Bytes read per recv() call in the background receiver thread.
const READ_CHUNK: usize = 4096;

/// Spawn the background receiver thread shared by client and server
/// variants: reads from `stream` until EOF, a permanent error, or
/// `shutdown` is set, pushing every byte read into `tx`.
fn spawn_receiver(
    mut stream: TcpStream,
    tx: Sender<u8>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let _ = stream.set_read_timeout(Some(READER_TICK));
        let mut buf = [0u8; READ_CHUNK];

        while !shutdown.load(Ordering::Relaxed) {
            match stream.read(&mut buf) {
                Ok(0) => {
                    debug!("tcp receiver: peer closed the connection");
                    break;
                },
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if tx.send(byte).is_err() {
                            return;
                        }
                    }
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {},
                Err(e) => {
                    warn!("tcp receiver: read error, stopping: {e}");
                    break;
                },
            }
        }
        trace!("tcp receiver thread exiting");
    })
}

/// Shared machinery for the client and server TCP transports: the write
/// half of the socket plus the receiver thread's FIFO and shutdown flag.
struct TcpHalf {
    stream: TcpStream,
    rx: Receiver<u8>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl TcpHalf {
    fn new(stream: TcpStream) -> Result<Self> {
        let reader_stream = stream.try_clone().map_err(Error::Io)?;
        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let reader = spawn_receiver(reader_stream, tx, shutdown.clone());

        Ok(Self {
            stream,
            rx,
            shutdown,
            reader: Some(reader),
        })
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).map_err(Error::Io)
    }

    fn poll_byte(&mut self) -> i32 {
        self.rx.try_recv().map_or(-1, i32::from)
    }
}

impl Drop for TcpHalf {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

/// TCP client transport: connects to a listening peer.
pub struct TcpClientTransport {
    half: TcpHalf,
}

impl TcpClientTransport {
    /// Connect to `(ip, port)` and start the background receiver.
    pub fn connect(ip: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((ip, port)).map_err(Error::Io)?;
        debug!("tcp client connected to {ip}:{port}");
        Ok(Self {
            half: TcpHalf::new(stream)?,
        })
    }

    /// Wrap an already-connected stream (e.g. one accepted elsewhere).
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        Ok(Self {
            half: TcpHalf::new(stream)?,
        })
    }
}

impl Transport for TcpClientTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.half.send(data)
    }

    fn poll_byte(&mut self) -> i32 {
        self.half.poll_byte()
    }
}

/// TCP server transport: binds and accepts a single client connection.
pub struct TcpServerTransport {
    half: TcpHalf,
}

impl TcpServerTransport {
    /// Bind to `port` on all interfaces and block until one client
    /// connects.
    pub fn accept_once(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(Error::Io)?;
        debug!("tcp server waiting for a connection on 0.0.0.0:{port}");
        let (stream, addr) = listener.accept().map_err(Error::Io)?;
        debug!("tcp server accepted connection from {addr}");
        Ok(Self {
            half: TcpHalf::new(stream)?,
        })
    }
}

impl Transport for TcpServerTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.half.send(data)
    }

    fn poll_byte(&mut self) -> i32 {
        self.half.poll_byte()
    }
}

/// Probability that any given polled byte is dropped or corrupted by
/// [`UnreliableTransport`].
const DEFAULT_FAULT_PROBABILITY: f64 = 0.002;

/// Default PRNG seed for [`UnreliableTransport`], chosen to make failure
/// traces reproducible across runs.
pub const DEFAULT_SEED: u64 = 10;

/// Wraps any [`Transport`] and injects synthetic faults into its byte
/// stream: with probability `p` per polled byte, either drops it or
/// substitutes a uniformly random byte value. Used to exercise the
/// sender/receiver's retransmission logic deterministically (see S3).
pub struct UnreliableTransport<T: Transport> {
    inner: T,
    rng: StdRng,
    probability: f64,
}

impl<T: Transport> UnreliableTransport<T> {
    /// Wrap `inner`, seeding the fault generator with [`DEFAULT_SEED`].
    pub fn new(inner: T) -> Self {
        Self::with_seed(inner, DEFAULT_SEED)
    }

    /// Wrap `inner`, seeding the fault generator explicitly.
    pub fn with_seed(inner: T, seed: u64) -> Self {
        Self {
            inner,
            rng: StdRng::seed_from_u64(seed),
            probability: DEFAULT_FAULT_PROBABILITY,
        }
    }

    /// Override the per-byte fault probability (default `0.002`).
    #[must_use]
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }
}

impl<T: Transport> Transport for UnreliableTransport<T> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.inner.send(data)
    }

    fn poll_byte(&mut self) -> i32 {
        let byte = self.inner.poll_byte();
        if byte == -1 {
            return -1;
        }

        if self.rng.random::<f64>() < self.probability {
            if self.rng.random_bool(0.5) {
                trace!("unreliable transport: dropping byte 0x{byte:02X}");
                -1
            } else {
                let corrupted = self.rng.random_range(0..=255);
                trace!("unreliable transport: corrupting 0x{byte:02X} -> 0x{corrupted:02X}");
                corrupted
            }
        } else {
            byte
        }
    }

    fn initiate_ota(&mut self) -> Result<()> {
        self.inner.initiate_ota()
    }

    fn wait_for_ota(&mut self, timeout: Duration) -> bool {
        self.inner.wait_for_ota(timeout)
    }
}
