//! Where the bytes come from.
//!
//! A [Transport] hands out chunks of bytes and tells "nothing yet" apart from
//! "the device is gone". It never reconnects on its own; that is up to
//! whoever owns it.

use log::info;
use serial2::SerialPort;
use std::{
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

/// Why a read returned no data.
#[derive(Debug)]
pub enum TransportError {
    /// The read timed out with no data. Try again.
    Timeout,
    /// The device went away or the stream ended.
    Disconnected(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "read timed out"),
            TransportError::Disconnected(e) => write!(f, "device disconnected: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                TransportError::Timeout
            }
            _ => TransportError::Disconnected(value),
        }
    }
}

/// A byte source with a bounded read time.
pub trait Transport {
    /// Read whatever is available into `buf`, blocking at most for the
    /// transport's read timeout. Never returns `Ok(0)`.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

fn read_nonempty(read: io::Result<usize>) -> Result<usize, TransportError> {
    match read {
        Ok(0) => Err(TransportError::Disconnected(io::Error::from(
            io::ErrorKind::UnexpectedEof,
        ))),
        Ok(n) => Ok(n),
        Err(e) => Err(e.into()),
    }
}

/// The glove on a serial port.
pub struct SerialTransport {
    port: SerialPort,
    path: PathBuf,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, with reads timing out after
    /// `read_timeout`. Bytes already sitting in the OS buffer are discarded.
    pub fn open(
        path: impl AsRef<Path>,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let mut port = SerialPort::open(&path, baud_rate).map_err(TransportError::Disconnected)?;
        port.set_read_timeout(read_timeout)
            .map_err(TransportError::Disconnected)?;
        port.discard_input_buffer()
            .map_err(TransportError::Disconnected)?;

        info!("Opened {} at {} baud", path.display(), baud_rate);
        Ok(Self { port, path })
    }

    /// Serial ports present on this machine.
    pub fn available_ports() -> io::Result<Vec<PathBuf>> {
        SerialPort::available_ports()
    }

    /// The device path this transport was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for SerialTransport {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_nonempty(self.port.read(buf))
    }
}

/// Any [Read]er as a transport, e.g. a recorded byte dump. End of stream
/// counts as a disconnect.
#[derive(Debug)]
pub struct ReadTransport<R> {
    inner: R,
}

impl<R: Read> ReadTransport<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Transport for ReadTransport<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_nonempty(self.inner.read(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Flaky {
        calls: usize,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 => Err(io::Error::from(io::ErrorKind::TimedOut)),
                2 => {
                    buf[0] = 0xAA;
                    Ok(1)
                }
                _ => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            }
        }
    }

    #[test]
    fn reader_until_eof() {
        let mut t = ReadTransport::new(Cursor::new(vec![1u8, 2, 3]));
        let mut buf = [0u8; 2];

        assert_eq!(t.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(t.read_chunk(&mut buf).unwrap(), 1);
        assert!(matches!(
            t.read_chunk(&mut buf),
            Err(TransportError::Disconnected(_))
        ));
    }

    #[test]
    fn timeout_is_not_a_disconnect() {
        let mut t = ReadTransport::new(Flaky { calls: 0 });
        let mut buf = [0u8; 4];

        assert!(matches!(t.read_chunk(&mut buf), Err(TransportError::Timeout)));
        assert_eq!(t.read_chunk(&mut buf).unwrap(), 1);
        assert!(matches!(
            t.read_chunk(&mut buf),
            Err(TransportError::Disconnected(_))
        ));
        assert_eq!(t.into_inner().calls, 3);
    }
}
