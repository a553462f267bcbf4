#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use crate::libs::error::{RspError, RspResult};
use crate::libs::session::Session;
use crate::libs::target_control::TargetControl;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);
const ERROR_DATA_TIMEOUT: Duration = Duration::from_millis(50);

/// Sends `command_text` verbatim as an RSP payload and classifies the
/// reply per spec.md §4.5: `OK`, an `O`-prefixed console-output chain,
/// an `E...` error, or anything else (logged and reported as
/// `BadResponse`).
pub fn execute(session: &mut Session, command_text: &str) -> RspResult<String> {
    let reply = session.send_request(command_text.as_bytes(), DEFAULT_COMMAND_TIMEOUT)?;

    if reply == b"OK" {
        return Ok("OK".to_string());
    }

    if reply.first() == Some(&b'O') && reply.len() > 1 {
        return drain_console_output(session, &reply[1..]);
    }

    if reply.first() == Some(&b'E') {
        let code = String::from_utf8_lossy(&reply[1..]).into_owned();
        return Err(RspError::GdbReported(code));
    }

    log::warn!("unexpected reply to {:?}: {:?}", command_text, reply);
    let _ = drain_stray(session);
    Err(RspError::BadResponse)
}

fn drain_console_output(session: &mut Session, first_chunk: &[u8]) -> RspResult<String> {
    let mut text = decode_console_chunk(first_chunk)?;
    log::info!("{}", text);

    loop {
        match session.await_unsolicited_frame(ERROR_DATA_TIMEOUT) {
            Ok(reply) if reply.first() == Some(&b'O') && reply.len() > 1 => {
                let chunk = decode_console_chunk(&reply[1..])?;
                log::info!("{}", chunk);
                text.push(' ');
                text.push_str(&chunk);
            }
            Ok(reply) if reply.first() == Some(&b'E') => {
                let code = String::from_utf8_lossy(&reply[1..]).into_owned();
                return Err(RspError::GdbReported(code));
            }
            _ => break,
        }
    }

    Ok(text)
}

fn decode_console_chunk(hex: &[u8]) -> RspResult<String> {
    let bytes = crate::libs::codec::decode_hex(hex)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(text.replace('\n', " "))
}

fn drain_stray(session: &mut Session) -> RspResult<()> {
    session.drain_unsolicited();
    Ok(())
}

/// Reads `path` line by line and runs each command through `execute`,
/// dispatching `#`-prefixed lines to local meta-commands.
///
/// `##` lines are comments; blank lines are skipped. A failed `execute`
/// aborts the script with its error; a failed meta-command is logged
/// and the script continues.
pub fn run_script(target: &mut TargetControl, path: &Path) -> RspResult<()> {
    let contents = fs::read_to_string(path).map_err(|e| RspError::IoError(e.to_string()))?;

    for line in contents.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("##") {
            continue;
        }

        if let Some(rest) = line.strip_prefix('#') {
            if let Err(e) = run_meta_command(target, rest.trim()) {
                log::warn!("meta-command {:?} failed: {}", line, e);
            }
            continue;
        }

        execute(target.session_mut(), line)?;
    }

    Ok(())
}

fn run_meta_command(target: &mut TargetControl, command: &str) -> RspResult<()> {
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();

    match name {
        "delay" => {
            let ms: u64 = args.parse().map_err(|_| RspError::BadInput)?;
            sleep(Duration::from_millis(ms));
            target.session_mut().drain_unsolicited();
            Ok(())
        }
        "echo" => {
            println!("{}", args);
            Ok(())
        }
        "filter" => {
            let value = parse_hex_arg(args)?;
            target.set_filter_override(Some(value));
            target.restore_filter(value)
        }
        "init" => {
            let mut it = args.split_whitespace();
            let cfg_hex = it.next().ok_or(RspError::BadInput)?;
            let freq_dec = it.next().ok_or(RspError::BadInput)?;
            let cfg_word = parse_hex_arg(cfg_hex)?;
            let ts_freq: u32 = freq_dec.parse().map_err(|_| RspError::BadInput)?;
            target.initialize_structure(cfg_word, ts_freq)
        }
        _ => {
            log::warn!("unknown meta-command: {}", name);
            Ok(())
        }
    }
}

fn parse_hex_arg(arg: &str) -> RspResult<u32> {
    let trimmed = arg.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).map_err(|_| RspError::BadInput)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_arg_accepts_0x_prefix() {
        assert_eq!(parse_hex_arg("0x10").unwrap(), 0x10);
        assert_eq!(parse_hex_arg("ff").unwrap(), 0xff);
        assert!(parse_hex_arg("zz").is_err());
    }

    #[test]
    fn decode_console_chunk_replaces_newlines() {
        let hex = crate::libs::codec::encode_hex(b"line1\nline2");
        let decoded = decode_console_chunk(&hex).unwrap();
        assert_eq!(decoded, "line1 line2");
    }
}
