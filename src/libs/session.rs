#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::libs::codec::{encode_frame, Frame, FrameDecoder};
use crate::libs::error::{RspError, RspResult};
use crate::libs::mem_io::{max_memo_read, max_memo_write};
use crate::libs::transport::Transport;

/// Upper bound on the scratch receive buffer and any single decoded
/// frame. A misbehaving server sending an oversize frame is rejected
/// rather than allowed to grow this without limit.
pub const TCP_BUFF_LENGTH: usize = 65535;

const DEFAULT_PACKET_SIZE: u32 = 4096;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
const CAPABILITY_TIMEOUT: Duration = Duration::from_millis(2500);
const ACK_TIMEOUT: Duration = Duration::from_millis(2500);
const GREETING_DRAIN: Duration = Duration::from_millis(100);

/// Owns the transport, ack-mode state, negotiated packet sizes, and the
/// streaming decoder for one GDB RSP connection.
///
/// `Session` is the single choke point every higher-level component
/// (`mem_io`, `executor`, `target_control`) goes through to talk to the
/// server; this is what gives the "no pipelining, one response per
/// request" ordering its teeth.
pub struct Session {
    transport: Transport,
    ack_mode_enabled: bool,
    max_send_packet: u32,
    max_recv_packet: u32,
    last_error: Option<RspError>,
    decoder: FrameDecoder,
    /// Bytes read off the socket but not yet consumed because a frame
    /// completed before the end of the chunk they arrived in. A server
    /// that coalesces several replies into one TCP segment (e.g. an
    /// `O`-output chain followed by the terminating `OK`/`E...`) would
    /// otherwise have its trailing bytes silently dropped.
    pending: Vec<u8>,
}

impl Session {
    /// Opens a transport, drains any greeting bytes, negotiates
    /// capabilities, and requests no-ack mode.
    ///
    /// `user_recv_packet`, when `Some` and within `[256, 65535]`,
    /// overrides the server-advertised receive packet size.
    pub fn connect(
        ip: Ipv4Addr,
        port: u16,
        user_recv_packet: Option<u32>,
    ) -> RspResult<Session> {
        let transport = Transport::connect(ip, port)?;
        let mut session = Session {
            transport,
            ack_mode_enabled: true,
            max_send_packet: DEFAULT_PACKET_SIZE,
            max_recv_packet: DEFAULT_PACKET_SIZE,
            last_error: None,
            decoder: FrameDecoder::with_rle(TCP_BUFF_LENGTH),
            pending: Vec::new(),
        };

        session.drain_for(GREETING_DRAIN);
        session.query_capabilities()?;
        if let Some(requested) = user_recv_packet {
            if (256..=65535).contains(&requested) {
                session.max_recv_packet = requested;
            }
        }
        session.request_no_ack()?;
        Ok(session)
    }

    /// Bytes beyond which `max_memo_read`/`max_memo_write` is derived.
    pub fn max_send_packet(&self) -> u32 {
        self.max_send_packet
    }

    pub fn max_recv_packet(&self) -> u32 {
        self.max_recv_packet
    }

    pub fn max_memo_read(&self) -> u32 {
        max_memo_read(self.max_recv_packet)
    }

    pub fn max_memo_write(&self) -> u32 {
        max_memo_write(self.max_send_packet)
    }

    pub fn last_error(&self) -> Option<&RspError> {
        self.last_error.as_ref()
    }

    /// Sends `qSupported` advertising no client features, requires
    /// `QStartNoAckMode+` in the reply, and parses `PacketSize=HH...` if
    /// present.
    fn query_capabilities(&mut self) -> RspResult<()> {
        let reply = self.send_request(b"qSupported:", CAPABILITY_TIMEOUT)?;
        let reply = String::from_utf8_lossy(&reply);

        if !reply.split(';').any(|feat| feat == "QStartNoAckMode+") {
            return Err(RspError::UnsupportedServer);
        }

        if let Some(size_str) = reply
            .split(';')
            .find_map(|feat| feat.strip_prefix("PacketSize="))
        {
            let parsed = u32::from_str_radix(size_str, 16).map_err(|_| RspError::BadFormat)?;
            self.max_send_packet = parsed.min(65535);
            self.max_recv_packet = parsed.min(65535);
        }

        Ok(())
    }

    /// Sends `QStartNoAckMode`; on `$OK#` disables ack generation.
    fn request_no_ack(&mut self) -> RspResult<()> {
        let reply = self.send_request(b"QStartNoAckMode", DEFAULT_REQUEST_TIMEOUT)?;
        if reply == b"OK" {
            self.ack_mode_enabled = false;
            Ok(())
        } else {
            Err(RspError::BadResponse)
        }
    }

    /// Sends `D` and ignores the reply body.
    pub fn detach(&mut self) {
        let _ = self.send_request(b"D", DEFAULT_REQUEST_TIMEOUT);
    }

    /// Drains and logs any unsolicited frames without blocking for long.
    /// Never returns an error; the server may emit stop replies after a
    /// reset, breakpoint, or exception that this client has no use for.
    pub fn drain_unsolicited(&mut self) {
        self.drain_for(Duration::from_millis(5));
    }

    fn drain_for(&mut self, budget: Duration) {
        let deadline = Instant::now() + budget;

        let leftover = std::mem::take(&mut self.pending);
        self.feed_and_log_discards(&leftover);

        let mut scratch = [0u8; 512];
        while Instant::now() < deadline {
            match self.transport.recv_some(&mut scratch) {
                Ok(0) => break,
                Ok(n) => self.feed_and_log_discards(&scratch[..n]),
                Err(_) => break,
            }
        }
    }

    fn feed_and_log_discards(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match self.decoder.push_byte(b) {
                Ok(Some(Frame::Packet(payload))) => {
                    log::debug!(
                        "discarding unsolicited frame: {:?}",
                        String::from_utf8_lossy(&payload)
                    );
                }
                Ok(_) => {}
                Err(e) => log::debug!("discarding malformed unsolicited data: {}", e),
            }
        }
    }

    /// Feeds `bytes` through the decoder and returns the first completed
    /// frame, if any. Any bytes after the one that completed the frame
    /// are kept in `self.pending` rather than discarded, so a server that
    /// coalesces multiple replies into one read is not silently truncated.
    fn feed_bytes(&mut self, bytes: &[u8]) -> RspResult<Option<Frame>> {
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(frame) = self.decoder.push_byte(b)? {
                if i + 1 < bytes.len() {
                    self.pending = bytes[i + 1..].to_vec();
                }
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    /// Waits until a frame completes or `deadline` passes, consuming any
    /// bytes left over from a previous call before reading fresh ones off
    /// the socket.
    fn await_frame(&mut self, deadline: Instant) -> RspResult<Frame> {
        loop {
            if !self.pending.is_empty() {
                let leftover = std::mem::take(&mut self.pending);
                if let Some(frame) = self.feed_bytes(&leftover)? {
                    return Ok(frame);
                }
            }

            if Instant::now() >= deadline {
                return Err(RspError::RecvTimeout);
            }

            let mut scratch = [0u8; TCP_BUFF_LENGTH];
            let n = self.transport.recv_some(&mut scratch)?;
            if n == 0 {
                continue;
            }
            if let Some(frame) = self.feed_bytes(&scratch[..n])? {
                return Ok(frame);
            }
        }
    }

    /// Sends one request and waits for exactly one reply.
    ///
    /// If ack mode is enabled, first consumes the expected `+` (bounded
    /// by [`ACK_TIMEOUT`]), then reads until a complete frame arrives or
    /// `timeout` elapses.
    pub fn send_request(&mut self, payload: &[u8], timeout: Duration) -> RspResult<Vec<u8>> {
        let wire = encode_frame(payload);
        let result = self.send_request_raw(&wire, timeout);
        if let Err(ref e) = result {
            self.last_error = Some(clone_error(e));
        }
        result
    }

    fn send_request_raw(&mut self, wire: &[u8], timeout: Duration) -> RspResult<Vec<u8>> {
        self.transport.send(wire)?;

        if self.ack_mode_enabled {
            self.await_ack(ACK_TIMEOUT)?;
        }

        self.await_packet(timeout)
    }

    fn await_ack(&mut self, timeout: Duration) -> RspResult<()> {
        let deadline = Instant::now() + timeout;
        match self.await_frame(deadline)? {
            Frame::Ack => Ok(()),
            Frame::Nack => Err(RspError::BadResponse),
            Frame::Packet(_) => Err(RspError::BadResponse),
        }
    }

    fn await_packet(&mut self, timeout: Duration) -> RspResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.await_frame(deadline)? {
                Frame::Packet(payload) => {
                    if self.ack_mode_enabled {
                        let _ = self.transport.send(b"+");
                    }
                    return Ok(payload);
                }
                Frame::Ack | Frame::Nack => continue,
            }
        }
    }

    /// Waits for one additional frame without sending anything first.
    ///
    /// Used by the Command Executor to pick up chained `O`-output
    /// frames following a reply, bounded by a short trailing timeout
    /// rather than the full request timeout.
    pub fn await_unsolicited_frame(&mut self, timeout: Duration) -> RspResult<Vec<u8>> {
        self.await_packet(timeout)
    }

    /// Closes the transport. Idempotent: calling it more than once is
    /// harmless since `Transport::close` tolerates an already-closed
    /// socket.
    pub fn cleanup(&mut self) {
        self.transport.close();
    }
}

fn clone_error(e: &RspError) -> RspError {
    match e {
        RspError::RecvTimeout => RspError::RecvTimeout,
        RspError::SendTimeout => RspError::SendTimeout,
        RspError::PartialSend => RspError::PartialSend,
        RspError::SocketError(m) => RspError::SocketError(m.clone()),
        RspError::ConnectionClosed => RspError::ConnectionClosed,
        RspError::BadFormat => RspError::BadFormat,
        RspError::BadChecksum => RspError::BadChecksum,
        RspError::RunLengthNotImplemented => RspError::RunLengthNotImplemented,
        RspError::BadResponse => RspError::BadResponse,
        RspError::BadInput => RspError::BadInput,
        RspError::GdbReported(m) => RspError::GdbReported(m.clone()),
        RspError::UnsupportedServer => RspError::UnsupportedServer,
        RspError::InvalidHeader => RspError::InvalidHeader,
        RspError::SizeOutOfRange => RspError::SizeOutOfRange,
        RspError::IoError(m) => RspError::IoError(m.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Spawns a thread that plays a scripted server: for each incoming
    /// framed request it sends back the corresponding raw wire reply.
    fn spawn_mock_server(
        listener: TcpListener,
        scripts: Vec<(&'static str, &'static [u8])>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for (expect_prefix, reply) in scripts {
                let mut buf = [0u8; 4096];
                // Read one `$...#cc` request (and consume a leading ack if
                // no-ack mode is already off from a prior round).
                let mut collected = Vec::new();
                loop {
                    let n = stream.read(&mut buf).unwrap();
                    collected.extend_from_slice(&buf[..n]);
                    let has_full_frame = collected
                        .iter()
                        .position(|&b| b == b'#')
                        .map(|pos| collected.len() >= pos + 3)
                        .unwrap_or(false);
                    if has_full_frame || collected.len() > 4096 {
                        break;
                    }
                }
                let text = String::from_utf8_lossy(&collected);
                assert!(
                    text.contains(expect_prefix),
                    "expected request containing {:?}, got {:?}",
                    expect_prefix,
                    text
                );
                stream.write_all(reply).unwrap();
            }
        })
    }

    #[test]
    fn connect_negotiates_and_disables_ack() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = spawn_mock_server(
            listener,
            vec![
                ("qSupported", b"+$QStartNoAckMode+;PacketSize=1000#07".as_slice()),
                ("QStartNoAckMode", b"+$OK#9a"),
            ],
        );

        let session = Session::connect(Ipv4Addr::LOCALHOST, port, None).unwrap();
        assert!(!session.ack_mode_enabled);
        assert_eq!(session.max_send_packet(), 0x1000);
        assert_eq!(session.max_memo_read(), 2044);
        assert_eq!(session.max_memo_write(), 2028);

        server.join().unwrap();
    }

    #[test]
    fn connect_without_no_ack_capability_fails() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).unwrap();
            stream.write_all(b"+$PacketSize=190#ca").unwrap();
        });

        let result = Session::connect(Ipv4Addr::LOCALHOST, port, None);
        assert!(matches!(result, Err(RspError::UnsupportedServer)));
        server.join().unwrap();
    }
}
