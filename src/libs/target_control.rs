#![allow(dead_code)]

use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::libs::console::Console;
use crate::libs::error::{RspError, RspResult};
use crate::libs::mem_io::{read_memory, write_memory};
use crate::libs::output::{write_benchmark_csv, write_snapshot_file, BenchRow};
use crate::libs::session::Session;
use crate::libs::target::{
    validate_total_size, TargetHeader, HEADER_SIZE_BYTES, MAX_STRUCT_SIZE,
};

const FILTER_OFFSET: u64 = 4;
const RTE_CFG_OFFSET: u64 = 8;
const BENCHMARK_DURATION: Duration = Duration::from_secs(20);
const BENCHMARK_REPEAT_COUNT: u32 = 1000;

/// User-supplied parameters that shape Target Control's behavior,
/// carried over from the CLI without tying this module to `clap`.
#[derive(Debug, Clone)]
pub struct Parameters {
    pub start_address: u64,
    /// `0` means "read `buffer_size` from the target header".
    pub size: u64,
    pub filter_override: Option<u32>,
    pub clear: bool,
    pub delay_ms: u64,
    pub bin_path: PathBuf,
}

/// Higher-level operations against the embedded header+circular-buffer
/// structure, built entirely out of `mem_io` reads/writes against one
/// `Session`.
pub struct TargetControl {
    session: Session,
    params: Parameters,
    header: Option<TargetHeader>,
    mirror: Vec<u8>,
}

impl TargetControl {
    pub fn new(session: Session, params: Parameters) -> TargetControl {
        TargetControl {
            session,
            params,
            header: None,
            mirror: Vec::new(),
        }
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn header(&self) -> Option<&TargetHeader> {
        self.header.as_ref()
    }

    pub fn set_filter_override(&mut self, filter: Option<u32>) {
        self.params.filter_override = filter;
    }

    /// Reads the header at `start_address`, recomputes the expected
    /// total size from `buffer_size`, and reconciles it against the
    /// user-supplied `size` (0 means "trust the header").
    pub fn load_header(&mut self) -> RspResult<&TargetHeader> {
        let mut bytes = Vec::new();
        read_memory(
            &mut self.session,
            self.params.start_address,
            HEADER_SIZE_BYTES,
            &mut bytes,
        )?;
        let header = TargetHeader::from_bytes(&bytes)?;

        let expected_total = header.total_size();
        if self.params.size != 0 && self.params.size != expected_total {
            log::warn!(
                "user-supplied size {:#x} disagrees with header (buffer_size={} -> {:#x}); using the header's value",
                self.params.size,
                header.buffer_size,
                expected_total
            );
        }
        // A user size of 0 or one that mismatches the header is always
        // replaced by the recomputed total; it only ever survives here
        // when it already matched.
        let effective_total = expected_total;
        validate_total_size(effective_total)?;
        if effective_total > MAX_STRUCT_SIZE {
            return Err(RspError::SizeOutOfRange);
        }
        self.params.size = effective_total;

        let needed_len = effective_total as usize;
        if self.mirror.len() != needed_len {
            self.mirror.resize(needed_len, 0);
        }

        self.header = Some(header);
        Ok(self.header.as_ref().unwrap())
    }

    /// Requires `header_size_words * 4 == sizeof(header)` and all
    /// reserved bits zero.
    pub fn validate_header(&self) -> RspResult<()> {
        let header = self.header.as_ref().ok_or(RspError::InvalidHeader)?;
        let cfg = header.rte_cfg();
        if cfg.header_size_words() as u64 * 4 != HEADER_SIZE_BYTES {
            return Err(RspError::InvalidHeader);
        }
        if !cfg.reserved_bits_are_zero() {
            return Err(RspError::InvalidHeader);
        }
        Ok(())
    }

    /// Writes four zero bytes to the filter word.
    pub fn pause_logging(&mut self) -> RspResult<()> {
        write_memory(&mut self.session, self.filter_addr(), &0u32.to_le_bytes())
    }

    /// Reads the filter word; must be zero, else logs the
    /// firmware-race warning from spec.md §9(c).
    pub fn check_filter_zero(&mut self) -> RspResult<()> {
        let mut bytes = Vec::new();
        read_memory(&mut self.session, self.filter_addr(), 4, &mut bytes)?;
        let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if value != 0 {
            log::warn!(
                "firmware re-enabled filter during transfer; data may be partially corrupt"
            );
        }
        Ok(())
    }

    fn filter_addr(&self) -> u64 {
        self.params.start_address + FILTER_OFFSET
    }

    fn rte_cfg_addr(&self) -> u64 {
        self.params.start_address + RTE_CFG_OFFSET
    }

    fn buffer_addr(&self) -> u64 {
        self.params.start_address + HEADER_SIZE_BYTES
    }

    /// The pause/read/restore sequence: the main operation of this tool.
    ///
    /// Any failure from step 3 through 7 triggers a best-effort
    /// `restore_filter` before the error propagates, so the target is
    /// never left paused on a failed run.
    pub fn snapshot(&mut self) -> RspResult<()> {
        let mut old_filter_bytes = Vec::new();
        read_memory(&mut self.session, self.filter_addr(), 4, &mut old_filter_bytes)?;
        let old_filter = u32::from_le_bytes([
            old_filter_bytes[0],
            old_filter_bytes[1],
            old_filter_bytes[2],
            old_filter_bytes[3],
        ]);

        if old_filter != 0 {
            self.pause_logging()?;
        }

        if let Err(e) = self.snapshot_body(old_filter) {
            let _ = self.restore_filter(old_filter);
            return Err(e);
        }

        Ok(())
    }

    fn snapshot_body(&mut self, old_filter: u32) -> RspResult<()> {
        self.load_header()?;
        self.validate_header()?;

        if self.params.delay_ms > 0 {
            sleep(Duration::from_millis(self.params.delay_ms));
        }

        let total_size = self.header.as_ref().unwrap().total_size();
        let mut mirror = Vec::with_capacity(total_size as usize);
        read_memory(&mut self.session, self.params.start_address, total_size, &mut mirror)?;
        self.mirror = mirror;

        self.check_filter_zero()?;

        let single_shot_was_active = self.header.as_ref().unwrap().rte_cfg().single_shot_active();
        self.reset_circular_buffer(single_shot_was_active)?;
        self.restore_filter(old_filter)?;

        let header_bytes = &self.mirror[..HEADER_SIZE_BYTES as usize];
        let buffer_bytes = &self.mirror[HEADER_SIZE_BYTES as usize..];
        write_snapshot_file(&self.params.bin_path, header_bytes, buffer_bytes, old_filter)?;

        Ok(())
    }

    /// If `-clear` was requested, fills the buffer region with `0xFF`
    /// then zeroes `last_index`; else if single-shot was active, only
    /// zeroes `last_index`; otherwise does nothing.
    pub fn reset_circular_buffer(&mut self, single_shot_was_active: bool) -> RspResult<()> {
        let buffer_len = self.mirror.len().saturating_sub(HEADER_SIZE_BYTES as usize);

        if self.params.clear {
            let fill = vec![0xFFu8; buffer_len];
            write_memory(&mut self.session, self.buffer_addr(), &fill)?;
            write_memory(&mut self.session, self.params.start_address, &0u32.to_le_bytes())
        } else if single_shot_was_active {
            write_memory(&mut self.session, self.params.start_address, &0u32.to_le_bytes())
        } else {
            Ok(())
        }
    }

    /// Precedence: explicit user value, then `filter_copy` when the
    /// firmware turned logging off itself, else the filter observed
    /// before pausing.
    pub fn restore_filter(&mut self, old_filter: u32) -> RspResult<()> {
        let value = if let Some(explicit) = self.params.filter_override {
            explicit
        } else if old_filter == 0 {
            match self.header.as_ref() {
                Some(header) if header.rte_cfg().firmware_off_allowed() => header.filter_copy,
                _ => old_filter,
            }
        } else {
            old_filter
        };

        write_memory(&mut self.session, self.filter_addr(), &value.to_le_bytes())
    }

    /// Refuses if single-shot is not compile-enabled; pauses, sets bit
    /// 0 of `rte_cfg`, resets the buffer, and restores the filter.
    pub fn switch_to_single_shot(&mut self) -> RspResult<()> {
        self.load_header()?;
        let mut cfg = self.header.as_ref().unwrap().rte_cfg();
        if !cfg.single_shot_compile_enabled() {
            return Err(RspError::InvalidHeader);
        }

        let mut old_filter_bytes = Vec::new();
        read_memory(&mut self.session, self.filter_addr(), 4, &mut old_filter_bytes)?;
        let old_filter = u32::from_le_bytes([
            old_filter_bytes[0],
            old_filter_bytes[1],
            old_filter_bytes[2],
            old_filter_bytes[3],
        ]);
        self.pause_logging()?;

        cfg.set_single_shot_active(true);
        write_memory(&mut self.session, self.rte_cfg_addr(), &cfg.0.to_le_bytes())?;

        self.reset_circular_buffer(true)?;
        self.restore_filter(old_filter)
    }

    /// Pauses; if single-shot was active, clears bit 0 of `rte_cfg`;
    /// resets the buffer and restores the filter.
    pub fn switch_to_post_mortem(&mut self) -> RspResult<()> {
        self.load_header()?;
        let mut cfg = self.header.as_ref().unwrap().rte_cfg();
        let was_single_shot = cfg.single_shot_active();

        let mut old_filter_bytes = Vec::new();
        read_memory(&mut self.session, self.filter_addr(), 4, &mut old_filter_bytes)?;
        let old_filter = u32::from_le_bytes([
            old_filter_bytes[0],
            old_filter_bytes[1],
            old_filter_bytes[2],
            old_filter_bytes[3],
        ]);
        self.pause_logging()?;

        if was_single_shot {
            cfg.set_single_shot_active(false);
            write_memory(&mut self.session, self.rte_cfg_addr(), &cfg.0.to_le_bytes())?;
        }

        self.reset_circular_buffer(was_single_shot)?;
        self.restore_filter(old_filter)
    }

    /// Builds and writes a fresh header for a target whose firmware has
    /// no init routine of its own. Requires a nonzero timestamp
    /// frequency and a nonzero total size.
    pub fn initialize_structure(&mut self, cfg_word: u32, ts_freq: u32) -> RspResult<()> {
        if ts_freq == 0 || self.params.size == 0 {
            return Err(RspError::BadInput);
        }
        let user_filter = self.params.filter_override.unwrap_or(0);
        let buffer_size = ((self.params.size - HEADER_SIZE_BYTES) / 4) as u32;

        let header = TargetHeader {
            last_index: 0,
            filter: 0,
            rte_cfg: cfg_word,
            timestamp_frequency: ts_freq,
            filter_copy: user_filter,
            buffer_size,
        };

        self.pause_logging()?;
        write_memory(&mut self.session, self.params.start_address, &header.to_bytes())?;
        self.header = Some(header);
        self.mirror = vec![0u8; self.params.size as usize];
        self.reset_circular_buffer(false)?;

        if user_filter != 0 {
            write_memory(&mut self.session, self.filter_addr(), &user_filter.to_le_bytes())?;
        }

        Ok(())
    }

    /// Repeatedly reads the structure for up to 20s or 1000 iterations
    /// or a keypress, recording per-read wall time, then writes
    /// `speed_test.csv` and returns the recorded rows.
    pub fn benchmark(&mut self, console: &Console, csv_path: &std::path::Path) -> RspResult<Vec<BenchRow>> {
        self.load_header()?;
        let total_size = self.header.as_ref().unwrap().total_size();

        let mut rows = Vec::new();
        let start = Instant::now();

        for count in 1..=BENCHMARK_REPEAT_COUNT {
            if start.elapsed() >= BENCHMARK_DURATION {
                break;
            }
            if console.poll().is_some() {
                break;
            }

            let iter_start = Instant::now();
            let mut scratch = Vec::new();
            read_memory(&mut self.session, self.params.start_address, total_size, &mut scratch)?;
            let elapsed = iter_start.elapsed();

            let time_ms = elapsed.as_secs_f64() * 1000.0;
            let speed_kbps = if time_ms > 0.0 {
                (total_size as f64 / 1024.0) / (time_ms / 1000.0)
            } else {
                0.0
            };
            rows.push(BenchRow { count, time_ms, speed_kbps });
        }

        write_benchmark_csv(csv_path, &rows)?;

        if let Some((min, max, avg)) = crate::libs::output::summarize(&rows) {
            println!(
                "benchmark: min={:.3} kB/s max={:.3} kB/s avg={:.3} kB/s over {} iterations",
                min,
                max,
                avg,
                rows.len()
            );
        }

        Ok(rows)
    }
}

