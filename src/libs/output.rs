#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::libs::error::{RspError, RspResult};

fn io_err(e: std::io::Error) -> RspError {
    RspError::IoError(e.to_string())
}

/// Writes the raw little-endian snapshot image: the header bytes (with
/// byte offset 4, the filter word, overlaid by `pre_pause_filter`)
/// followed by the buffer bytes.
///
/// `header_bytes` must be exactly `target::HEADER_SIZE_BYTES` long.
pub fn write_snapshot_file(
    path: &Path,
    header_bytes: &[u8],
    buffer_bytes: &[u8],
    pre_pause_filter: u32,
) -> RspResult<()> {
    if header_bytes.len() != crate::libs::target::HEADER_SIZE_BYTES as usize {
        return Err(RspError::BadInput);
    }

    let mut image = header_bytes.to_vec();
    image[4..8].copy_from_slice(&pre_pause_filter.to_le_bytes());
    image.extend_from_slice(buffer_bytes);

    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(&image).map_err(io_err)?;
    Ok(())
}

/// One row of the benchmark CSV: an iteration count, its wall time in
/// milliseconds, and the resulting throughput in kB/s.
#[derive(Debug, Clone, Copy)]
pub struct BenchRow {
    pub count: u32,
    pub time_ms: f64,
    pub speed_kbps: f64,
}

/// Writes `speed_test.csv`: a header line, one row per iteration, a
/// blank line, then a textual min/max/avg summary.
pub fn write_benchmark_csv(path: &Path, rows: &[BenchRow]) -> RspResult<()> {
    let mut file = File::create(path).map_err(io_err)?;
    writeln!(file, "Count;Time [ms];Data transfer speed [kB/s]").map_err(io_err)?;
    for row in rows {
        writeln!(file, "{};{:.3};{:.3}", row.count, row.time_ms, row.speed_kbps)
            .map_err(io_err)?;
    }
    writeln!(file).map_err(io_err)?;

    if let Some(summary) = summarize(rows) {
        writeln!(
            file,
            "min={:.3} kB/s max={:.3} kB/s avg={:.3} kB/s over {} iterations",
            summary.0,
            summary.1,
            summary.2,
            rows.len()
        )
        .map_err(io_err)?;
    }

    Ok(())
}

/// Returns `(min, max, avg)` throughput in kB/s, or `None` for an empty
/// set of rows.
pub fn summarize(rows: &[BenchRow]) -> Option<(f64, f64, f64)> {
    if rows.is_empty() {
        return None;
    }
    let min = rows.iter().map(|r| r.speed_kbps).fold(f64::INFINITY, f64::min);
    let max = rows
        .iter()
        .map(|r| r.speed_kbps)
        .fold(f64::NEG_INFINITY, f64::max);
    let avg = rows.iter().map(|r| r.speed_kbps).sum::<f64>() / rows.len() as f64;
    Some((min, max, avg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn snapshot_file_overlays_filter_word() {
        let dir = std::env::temp_dir().join("rsp_trace_test_snapshot_overlay");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("data.bin");

        let header_bytes = [0u8; 24];
        let buffer_bytes = [0xAAu8; 16];
        write_snapshot_file(&path, &header_bytes, &buffer_bytes, 0x0000_000f).unwrap();

        let written = fs::read(&path).unwrap();
        assert_eq!(written.len(), 24 + 16);
        assert_eq!(&written[4..8], &[0x0f, 0x00, 0x00, 0x00]);
        assert_eq!(&written[24..], &buffer_bytes[..]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn snapshot_file_rejects_wrong_header_length() {
        let path = std::env::temp_dir().join("rsp_trace_test_bad_header.bin");
        let result = write_snapshot_file(&path, &[0u8; 10], &[], 0);
        assert!(matches!(result, Err(RspError::BadInput)));
    }

    #[test]
    fn summary_computes_min_max_avg() {
        let rows = [
            BenchRow { count: 1, time_ms: 10.0, speed_kbps: 100.0 },
            BenchRow { count: 2, time_ms: 20.0, speed_kbps: 200.0 },
            BenchRow { count: 3, time_ms: 15.0, speed_kbps: 150.0 },
        ];
        let (min, max, avg) = summarize(&rows).unwrap();
        assert_eq!(min, 100.0);
        assert_eq!(max, 200.0);
        assert_eq!(avg, 150.0);
    }
}
