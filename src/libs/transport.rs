#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::time::Duration;

use crate::libs::error::{RspError, RspResult};

/// Per-read socket timeout. The decoder is fed one chunk at a time, so a
/// short timeout just means another spin of the polling loop rather than
/// a lost byte.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1);
/// Per-write socket timeout. Writes to a debug-probe GDB server are small
/// and local, so 50ms is generous headroom before treating the link as
/// wedged.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// A thin wrapper over a single IPv4 TCP connection to a GDB server.
///
/// `Transport` owns no protocol knowledge; it only knows how to open,
/// shuttle bytes across, and close a socket with the timeouts this tool
/// needs. Framing and checksums live in [`crate::libs::codec`].
pub struct Transport {
    stream: TcpStream,
}

impl Transport {
    /// Connects to `addr:port` over IPv4 and applies the read/write
    /// timeouts used throughout this tool.
    pub fn connect(addr: Ipv4Addr, port: u16) -> RspResult<Self> {
        let stream = TcpStream::connect(SocketAddrV4::new(addr, port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Transport { stream })
    }

    /// Writes the full contents of `data`, treating a short write as a
    /// hard failure rather than retrying partial progress.
    pub fn send(&mut self, data: &[u8]) -> RspResult<()> {
        match self.stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(RspError::SendTimeout),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(RspError::SendTimeout),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads whatever is immediately available into `buf`, returning the
    /// number of bytes read. Returns `Ok(0)` on a read timeout (nothing
    /// arrived within [`READ_TIMEOUT`]) so callers can distinguish "no
    /// data yet" from a hard socket error.
    pub fn recv_some(&mut self, buf: &mut [u8]) -> RspResult<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(RspError::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Shuts down both halves of the socket. Errors are ignored: by the
    /// time a caller wants to close the link it has nothing useful to do
    /// with a shutdown failure.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
