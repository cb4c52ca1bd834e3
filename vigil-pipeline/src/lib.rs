//! The concurrent segment pipeline: intake staging, per-stream processors
//! (Live → Detect → Finish), and the incident assembler.

pub mod incident;
pub mod intake;
pub mod processor;
pub mod registry;

use vigil_core::models::{HlsCallback, StreamKey, TsSegment};

/// Capacity of every pipeline channel. A full channel blocks the sender,
/// which the upstream media server tolerates.
pub const CHANNEL_CAPACITY: usize = 1024;

/// A segment that intake has staged into the working directory, paired with
/// the callback that announced it.
#[derive(Debug, Clone)]
pub struct StagedSegment {
    pub stream_key: StreamKey,
    pub callback: HlsCallback,
    pub ts: TsSegment,
}
