#![allow(dead_code)]

use crate::libs::error::{RspError, RspResult};

/// The raw `$`/`#`/`%` framing byte that starts an ordinary RSP packet.
const PACKET_START: u8 = b'$';
const PACKET_END: u8 = b'#';
const ESCAPE_BYTE: u8 = b'}';
const RLE_BYTE: u8 = b'*';

/// The contents of one decoded RSP exchange unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A lone `+` acknowledgement byte.
    Ack,
    /// A lone `-` (resend request) byte.
    Nack,
    /// A complete `$payload#cc` packet, with escaping and RLE already
    /// undone and the checksum verified.
    Packet(Vec<u8>),
}

/// Computes the RSP checksum: the sum of the payload bytes, mod 256.
///
/// Identical to the fold used by the reference RSP server stub this client
/// was generalized from.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Formats a single byte as two lowercase hex digits.
pub fn hex_byte(b: u8) -> [u8; 2] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    [DIGITS[(b >> 4) as usize], DIGITS[(b & 0xf) as usize]]
}

fn hex_nibble(c: u8) -> RspResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(RspError::BadFormat),
    }
}

/// Decodes two hex-digit bytes into a single byte. Case-insensitive.
pub fn decode_hex_byte(hi: u8, lo: u8) -> RspResult<u8> {
    Ok((hex_nibble(hi)? << 4) | hex_nibble(lo)?)
}

/// Decodes a run of hex-digit bytes into a `Vec<u8>`. `data.len()` must be
/// even.
pub fn decode_hex(data: &[u8]) -> RspResult<Vec<u8>> {
    if data.len() % 2 != 0 {
        return Err(RspError::BadFormat);
    }
    data.chunks(2)
        .map(|pair| decode_hex_byte(pair[0], pair[1]))
        .collect()
}

/// Encodes a byte slice as a run of lowercase hex-digit pairs.
pub fn encode_hex(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for &b in data {
        out.extend_from_slice(&hex_byte(b));
    }
    out
}

/// Escapes `$`, `#`, `}`, and `*` in `payload` using the RSP `}`/XOR-0x20
/// quoting scheme, then wraps the result in a full `$payload#cc` frame.
///
/// The checksum in the trailer is computed over the *escaped* bytes, since
/// that is what actually crosses the wire and what the peer will sum.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(payload.len() + 2);
    for &b in payload {
        match b {
            PACKET_START | PACKET_END | ESCAPE_BYTE | RLE_BYTE => {
                escaped.push(ESCAPE_BYTE);
                escaped.push(b ^ 0x20);
            }
            _ => escaped.push(b),
        }
    }

    let mut out = Vec::with_capacity(escaped.len() + 4);
    out.push(PACKET_START);
    out.extend_from_slice(&escaped);
    out.push(PACKET_END);
    out.extend_from_slice(&hex_byte(checksum(&escaped)));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    InPayload,
    RleCount,
    Checksum1,
    Checksum2(u8),
}

/// A streaming decoder for the RSP wire format.
///
/// Bytes are fed one at a time via [`push_byte`](FrameDecoder::push_byte).
/// Escaped bytes (`}` followed by `byte ^ 0x20`) and RLE runs (`*`
/// followed by a repeat-count byte) are transparently expanded into the
/// accumulated payload. A bare `+`/`-` outside any packet yields
/// `Frame::Ack`/`Frame::Nack` immediately; a `$...#cc` packet yields
/// `Frame::Packet` once the checksum has been read and verified.
pub struct FrameDecoder {
    state: DecoderState,
    payload: Vec<u8>,
    escape_next: bool,
    last_byte: u8,
    rle_enabled: bool,
    max_len: usize,
    /// Checksum accumulated over the literal wire bytes (escape markers
    /// and RLE markers included, exactly as the sender summed them),
    /// independent of the expanded `payload`.
    wire_checksum: u8,
}

impl FrameDecoder {
    /// Creates a decoder that rejects RLE runs with
    /// `RunLengthNotImplemented` rather than expanding them.
    pub fn new(max_len: usize) -> Self {
        FrameDecoder {
            state: DecoderState::Idle,
            payload: Vec::new(),
            escape_next: false,
            last_byte: 0,
            rle_enabled: false,
            max_len,
            wire_checksum: 0,
        }
    }

    /// Creates a decoder that expands run-length-encoded payload bytes
    /// instead of rejecting them.
    pub fn with_rle(max_len: usize) -> Self {
        FrameDecoder {
            rle_enabled: true,
            ..FrameDecoder::new(max_len)
        }
    }

    /// Feeds one byte from the wire into the decoder.
    ///
    /// Returns `Ok(Some(frame))` once a complete ack/nack/packet has been
    /// recognized, `Ok(None)` if more bytes are needed, or an error if the
    /// byte is structurally invalid (bad checksum hex, oversize frame, or
    /// an RLE run while RLE is disabled).
    pub fn push_byte(&mut self, b: u8) -> RspResult<Option<Frame>> {
        match self.state {
            DecoderState::Idle => match b {
                b'+' => Ok(Some(Frame::Ack)),
                b'-' => Ok(Some(Frame::Nack)),
                PACKET_START => {
                    self.payload.clear();
                    self.escape_next = false;
                    self.last_byte = 0;
                    self.wire_checksum = 0;
                    self.state = DecoderState::InPayload;
                    Ok(None)
                }
                _ => Ok(None), // stray byte between frames; ignore
            },
            DecoderState::InPayload => {
                if b == PACKET_END {
                    self.state = DecoderState::Checksum1;
                    return Ok(None);
                }

                if self.payload.len() >= self.max_len {
                    self.state = DecoderState::Idle;
                    return Err(RspError::BadResponse);
                }

                self.wire_checksum = self.wire_checksum.wrapping_add(b);

                if self.escape_next {
                    let decoded = b ^ 0x20;
                    self.payload.push(decoded);
                    self.last_byte = decoded;
                    self.escape_next = false;
                } else if b == ESCAPE_BYTE {
                    self.escape_next = true;
                } else if b == RLE_BYTE {
                    if !self.rle_enabled {
                        self.state = DecoderState::Idle;
                        return Err(RspError::RunLengthNotImplemented);
                    }
                    self.state = DecoderState::RleCount;
                } else {
                    self.payload.push(b);
                    self.last_byte = b;
                }
                Ok(None)
            }
            DecoderState::RleCount => {
                self.wire_checksum = self.wire_checksum.wrapping_add(b);
                // RSP run-length: the repeat count is `b - 29`, and it
                // counts the *total* number of times the preceding byte
                // appears, so the run itself contributes `count - 1`
                // additional copies of `last_byte`.
                let count = b.wrapping_sub(29);
                for _ in 0..count {
                    if self.payload.len() >= self.max_len {
                        self.state = DecoderState::Idle;
                        return Err(RspError::BadResponse);
                    }
                    self.payload.push(self.last_byte);
                }
                self.state = DecoderState::InPayload;
                Ok(None)
            }
            DecoderState::Checksum1 => {
                self.state = DecoderState::Checksum2(b);
                Ok(None)
            }
            DecoderState::Checksum2(hi) => {
                self.state = DecoderState::Idle;
                let received = decode_hex_byte(hi, b)?;
                if received != self.wire_checksum {
                    return Err(RspError::BadChecksum);
                }
                Ok(Some(Frame::Packet(std::mem::take(&mut self.payload))))
            }
        }
    }
}

/// Feeds every byte of `bytes` through `decoder`, returning the first
/// complete frame produced.
#[cfg(test)]
fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> RspResult<Option<Frame>> {
    for &b in bytes {
        if let Some(frame) = decoder.push_byte(b)? {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}
