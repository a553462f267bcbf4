use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rsp_trace_tools::libs::codec::{decode_hex, encode_frame, encode_hex, Frame, FrameDecoder};

/// A scripted in-memory target: a flat byte array addressed starting
/// at `base`, driven entirely by the `m`/`M` requests a real `Session`
/// would send.
pub struct MockTarget {
    pub base: u64,
    pub memory: Vec<u8>,
    /// Every request payload the server has seen, in arrival order, for
    /// tests that assert on wire-message ordering.
    pub request_log: Vec<String>,
}

impl MockTarget {
    pub fn new(base: u64, memory: Vec<u8>) -> MockTarget {
        MockTarget { base, memory, request_log: Vec::new() }
    }

    fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        let start = (addr - self.base) as usize;
        self.memory[start..start + len].to_vec()
    }

    fn write(&mut self, addr: u64, data: &[u8]) {
        let start = (addr - self.base) as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }
}

/// Starts a background thread that accepts exactly one connection and
/// plays a minimal GDB RSP server against `target`: capability
/// negotiation, then `m`/`M`/`D`/`qSupported` against the mock memory.
pub fn spawn_mock_server(target: Arc<Mutex<MockTarget>>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream, target);
    });

    (port, handle)
}

fn serve(mut stream: TcpStream, target: Arc<Mutex<MockTarget>>) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut decoder = FrameDecoder::with_rle(65536);
    let mut ack_mode = true;
    let mut buf = [0u8; 4096];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        for &b in &buf[..n] {
            match decoder.push_byte(b) {
                Ok(Some(Frame::Packet(payload))) => {
                    if ack_mode {
                        stream.write_all(b"+").unwrap();
                    }
                    let is_no_ack = payload == b"QStartNoAckMode";
                    if let Some(reply) = handle_request(&payload, &target) {
                        stream.write_all(&encode_frame(&reply)).unwrap();
                    }
                    if is_no_ack {
                        ack_mode = false;
                    }
                }
                Ok(_) => {}
                Err(_) => {}
            }
        }
    }
}

fn handle_request(payload: &[u8], target: &Arc<Mutex<MockTarget>>) -> Option<Vec<u8>> {
    let text = String::from_utf8_lossy(payload).into_owned();
    target.lock().unwrap().request_log.push(text.clone());

    if text.starts_with("qSupported") {
        return Some(b"QStartNoAckMode+;PacketSize=1000".to_vec());
    }
    if text == "QStartNoAckMode" {
        return Some(b"OK".to_vec());
    }
    if text == "D" {
        return Some(b"OK".to_vec());
    }
    if let Some(rest) = text.strip_prefix('m') {
        let mut parts = rest.splitn(2, ',');
        let addr = u64::from_str_radix(parts.next().unwrap(), 16).unwrap();
        let len = u64::from_str_radix(parts.next().unwrap(), 16).unwrap();
        let data = target.lock().unwrap().read(addr, len as usize);
        return Some(encode_hex(&data));
    }
    if let Some(rest) = text.strip_prefix('M') {
        let colon = rest.find(':').unwrap();
        let (head, rest) = rest.split_at(colon);
        let data_hex = &rest[1..];
        let mut parts = head.splitn(2, ',');
        let addr = u64::from_str_radix(parts.next().unwrap(), 16).unwrap();
        let data = decode_hex(data_hex.as_bytes()).unwrap();
        target.lock().unwrap().write(addr, &data);
        return Some(b"OK".to_vec());
    }

    Some(b"".to_vec())
}
