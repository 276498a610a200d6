//! Pure alignment algorithms: window planning, stitching and coverage.
//!
//! Nothing in here touches audio or the filesystem; every function works on
//! millisecond offsets and word timings produced elsewhere.

pub mod coverage;
pub mod planner;
pub mod stitcher;
pub mod types;

pub use coverage::{CoverageReport, ExitStatus, evaluate, exit_status};
pub use planner::{chunk_map, plan};
pub use stitcher::{Stitcher, StitcherConfig, stitch};
pub use types::{AlignedWord, ChunkAlignment, ChunkMapEntry, ChunkWindow, WordSegment};
