#![allow(dead_code)]

use std::fs;
use std::path::Path;

use crate::libs::error::{RspError, RspResult};

/// Number of bits in the target's 32-bit message filter.
pub const FILTER_BIT_COUNT: usize = 32;

/// Reads one name per filter bit (0..31) from `path`; an empty line
/// means that bit has no human-readable name. Used only to annotate
/// status and header-summary output, not the protocol itself.
pub fn load_filter_names(path: &Path) -> RspResult<Vec<Option<String>>> {
    let contents = fs::read_to_string(path).map_err(|e| RspError::IoError(e.to_string()))?;
    let mut names: Vec<Option<String>> = contents
        .lines()
        .take(FILTER_BIT_COUNT)
        .map(|line| {
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect();
    names.resize(FILTER_BIT_COUNT, None);
    Ok(names)
}

/// Renders `filter` as a comma-separated list of set bits' names,
/// falling back to `bitN` for unnamed set bits.
pub fn describe_filter(filter: u32, names: &[Option<String>]) -> String {
    let mut parts = Vec::new();
    for bit in 0..FILTER_BIT_COUNT {
        if filter & (1 << bit) == 0 {
            continue;
        }
        match names.get(bit).and_then(|n| n.as_ref()) {
            Some(name) => parts.push(name.clone()),
            None => parts.push(format!("bit{}", bit)),
        }
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(",")
    }
}
