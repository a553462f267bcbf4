#![allow(dead_code)]

use std::time::Duration;

use crate::libs::codec::{decode_hex, encode_hex};
use crate::libs::error::{RspError, RspResult};
use crate::libs::session::Session;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest chunk, in bytes, that can be requested in a single `m` read
/// given a server's advertised receive packet size: four hex digits per
/// byte of address plus comma plus length, aligned down to 4 to keep
/// probes happy with aligned lengths.
pub fn max_memo_read(max_recv_packet: u32) -> u32 {
    ((max_recv_packet.saturating_sub(4)) / 8) * 4
}

/// Largest chunk, in bytes, that can be written in a single `M` write:
/// the worst-case `M<addr_hex>,<len_hex>:` framing (a full 16-hex-digit
/// address, the comma, an 8-hex-digit length, the colon) plus the outer
/// `$...#cc` frame and checksum slack costs 40 bytes of non-data
/// overhead, subtracted before the same alignment.
pub fn max_memo_write(max_send_packet: u32) -> u32 {
    ((max_send_packet.saturating_sub(40)) / 8) * 4
}

fn is_error_payload(payload: &[u8]) -> Option<String> {
    if payload.first() != Some(&b'E') {
        return None;
    }
    Some(String::from_utf8_lossy(&payload[1..]).into_owned())
}

/// Reads `len` bytes starting at `addr`, appending them to `out`.
///
/// Splits the request into chunks no larger than
/// `session.max_memo_read()`, issuing one `m<addr_hex>,<len_hex>` per
/// chunk and decoding the hex-ASCII reply.
pub fn read_memory(session: &mut Session, addr: u64, len: u64, out: &mut Vec<u8>) -> RspResult<()> {
    if len == 0 {
        return Ok(());
    }
    let chunk_max = session.max_memo_read().max(4) as u64;
    let mut remaining = len;
    let mut cursor = addr;

    while remaining > 0 {
        let chunk_len = remaining.min(chunk_max);
        let request = format!("m{:x},{:x}", cursor, chunk_len);
        let reply = session.send_request(request.as_bytes(), REQUEST_TIMEOUT)?;

        if let Some(code) = is_error_payload(&reply) {
            return Err(RspError::GdbReported(code));
        }
        if reply.len() as u64 != chunk_len * 2 {
            return Err(RspError::BadResponse);
        }

        let decoded = decode_hex(&reply)?;
        out.extend_from_slice(&decoded);

        cursor += chunk_len;
        remaining -= chunk_len;
    }

    Ok(())
}

/// Writes `data` starting at `addr`.
///
/// Splits the request into chunks no larger than
/// `session.max_memo_write()`, issuing one
/// `M<ADDR_HEX>,<LEN_HEX>:<data_hex>` per chunk (uppercase address and
/// length, matching the servers this tool was validated against) and
/// requiring `$OK#` in reply.
pub fn write_memory(session: &mut Session, addr: u64, data: &[u8]) -> RspResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let chunk_max = (session.max_memo_write().max(4) as usize).max(1);
    let mut cursor = addr;

    for chunk in data.chunks(chunk_max) {
        let request = format!(
            "M{:X},{:X}:{}",
            cursor,
            chunk.len(),
            String::from_utf8_lossy(&encode_hex(chunk))
        );
        let reply = session.send_request(request.as_bytes(), REQUEST_TIMEOUT)?;

        if let Some(code) = is_error_payload(&reply) {
            return Err(RspError::GdbReported(code));
        }
        if reply != b"OK" {
            return Err(RspError::BadResponse);
        }

        cursor += chunk.len() as u64;
    }

    Ok(())
}
