#![allow(dead_code)]

use bitfield::bitfield;

use crate::libs::error::{RspError, RspResult};

/// Size of `TargetHeader` on the wire, in bytes.
pub const HEADER_SIZE_BYTES: u64 = 24;
/// Smallest legal total structure size (header + buffer).
pub const MIN_STRUCT_SIZE: u64 = 80;
/// Largest legal total structure size (header + buffer), ~2 MiB.
pub const MAX_STRUCT_SIZE: u64 = 0x20_0000;

bitfield! {
    /// Packed `rte_cfg` configuration word.
    ///
    /// Bit layout: 0 single-shot active; 1 filtering enabled; 2
    /// firmware-off allowed; 3 single-shot compile-enabled; 4 long
    /// timestamps; 5-7 reserved; 8-11 timestamp shift (stored value + 1);
    /// 12-14 format id; 15 reserved; 16-23 max subpackets (0 means 256);
    /// 24-30 header size in 32-bit words; 31 buffer size is a power of two.
    pub struct RteCfg(u32);
    impl Debug;
    u32;
    pub single_shot_active, set_single_shot_active: 0;
    pub filtering_enabled, set_filtering_enabled: 1;
    pub firmware_off_allowed, set_firmware_off_allowed: 2;
    pub single_shot_compile_enabled, set_single_shot_compile_enabled: 3;
    pub long_timestamps, set_long_timestamps: 4;
    reserved_low, set_reserved_low: 7, 5;
    raw_timestamp_shift, set_raw_timestamp_shift: 11, 8;
    pub format_id, set_format_id: 14, 12;
    reserved_mid, set_reserved_mid: 15;
    raw_max_subpackets, set_raw_max_subpackets: 23, 16;
    pub header_size_words, set_header_size_words: 30, 24;
    pub buffer_size_pow2, set_buffer_size_pow2: 31;
}

impl RteCfg {
    /// The stored field is `shift - 1`; this returns the actual shift.
    pub fn timestamp_shift(&self) -> u32 {
        self.raw_timestamp_shift() + 1
    }

    pub fn set_timestamp_shift(&mut self, shift: u32) {
        self.set_raw_timestamp_shift(shift.saturating_sub(1));
    }

    /// A stored value of 0 means 256 subpackets.
    pub fn max_subpackets(&self) -> u32 {
        let raw = self.raw_max_subpackets();
        if raw == 0 {
            256
        } else {
            raw
        }
    }

    pub fn set_max_subpackets(&mut self, count: u32) {
        self.set_raw_max_subpackets(if count >= 256 { 0 } else { count });
    }

    /// True if every bit that must be zero actually is.
    pub fn reserved_bits_are_zero(&self) -> bool {
        self.reserved_low() == 0 && !self.reserved_mid()
    }
}

/// Fixed 24-byte, little-endian target header.
///
/// Laid out exactly as the embedded structure on the wire. Parsed and
/// serialized word-by-word via `from_le_bytes`/`to_le_bytes` rather than
/// a raw cast, since the target is always little-endian regardless of
/// the host this tool runs on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHeader {
    pub last_index: u32,
    pub filter: u32,
    pub rte_cfg: u32,
    pub timestamp_frequency: u32,
    pub filter_copy: u32,
    pub buffer_size: u32,
}

impl TargetHeader {
    /// Parses a header out of exactly `HEADER_SIZE_BYTES` little-endian
    /// bytes.
    pub fn from_bytes(bytes: &[u8]) -> RspResult<TargetHeader> {
        if bytes.len() as u64 != HEADER_SIZE_BYTES {
            return Err(RspError::BadInput);
        }
        let mut words = [0u32; 6];
        for (i, word) in words.iter_mut().enumerate() {
            let offset = i * 4;
            *word = u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]);
        }
        Ok(TargetHeader {
            last_index: words[0],
            filter: words[1],
            rte_cfg: words[2],
            timestamp_frequency: words[3],
            filter_copy: words[4],
            buffer_size: words[5],
        })
    }

    /// Serializes back to `HEADER_SIZE_BYTES` little-endian bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE_BYTES as usize] {
        let mut out = [0u8; HEADER_SIZE_BYTES as usize];
        for (i, word) in [
            self.last_index,
            self.filter,
            self.rte_cfg,
            self.timestamp_frequency,
            self.filter_copy,
            self.buffer_size,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn rte_cfg(&self) -> RteCfg {
        RteCfg(self.rte_cfg)
    }

    /// Total on-target structure size: header plus the circular buffer.
    pub fn total_size(&self) -> u64 {
        HEADER_SIZE_BYTES + self.buffer_size as u64 * 4
    }
}

/// Checks the size invariant from spec §3: within `[MIN, MAX]`.
pub fn validate_total_size(total_size: u64) -> RspResult<()> {
    if total_size < MIN_STRUCT_SIZE || total_size > MAX_STRUCT_SIZE {
        Err(RspError::SizeOutOfRange)
    } else {
        Ok(())
    }
}
