//! Window planning for long recordings.
//!
//! Tiles `[0, duration_ms]` with fixed-size windows that overlap by a constant
//! amount at every internal boundary. The last window is clipped so it ends
//! exactly at `duration_ms`.

use crate::alignment::types::{ChunkMapEntry, ChunkWindow};
use crate::defaults::{MAX_CHUNK_SECONDS, MAX_OVERLAP_SECONDS};
use crate::error::{ChapalignError, Result};

/// Plans the windows covering a recording of `duration_ms`.
///
/// Fails when the duration is zero, the chunk size is outside
/// `1..=MAX_CHUNK_SECONDS`, the overlap exceeds `MAX_OVERLAP_SECONDS`, or the
/// overlap is not strictly smaller than the chunk size.
pub fn plan(duration_ms: u64, chunk_size_sec: u32, overlap_sec: u32) -> Result<Vec<ChunkWindow>> {
    if duration_ms == 0 {
        return Err(ChapalignError::invalid(
            "duration_ms",
            "duration must be positive",
        ));
    }
    if chunk_size_sec == 0 || chunk_size_sec > MAX_CHUNK_SECONDS {
        return Err(ChapalignError::invalid(
            "chunk_size_sec",
            format!("chunk size must be between 1 and {MAX_CHUNK_SECONDS} seconds"),
        ));
    }
    if overlap_sec > MAX_OVERLAP_SECONDS {
        return Err(ChapalignError::invalid(
            "overlap_sec",
            format!("overlap must be between 0 and {MAX_OVERLAP_SECONDS} seconds"),
        ));
    }
    if overlap_sec >= chunk_size_sec {
        return Err(ChapalignError::invalid(
            "overlap_sec",
            "overlap must be smaller than chunk size",
        ));
    }

    let chunk_size_ms = u64::from(chunk_size_sec) * 1000;
    let overlap_ms = u64::from(overlap_sec) * 1000;

    let mut windows = Vec::new();
    let mut start = 0;
    let mut index = 1;
    loop {
        let end = (start + chunk_size_ms).min(duration_ms);
        let overlap = if index == 1 { 0 } else { overlap_ms };
        windows.push(ChunkWindow::new(index, start, end, overlap));
        if end == duration_ms {
            break;
        }
        // overlap_ms < chunk_size_ms, so start strictly advances
        start = end - overlap_ms;
        index += 1;
    }

    Ok(windows)
}

/// Serializes windows into their diagnostic chunk-map form.
pub fn chunk_map(windows: &[ChunkWindow]) -> Vec<ChunkMapEntry> {
    windows.iter().map(ChunkMapEntry::from).collect()
}
