use serde::{Deserialize, Serialize};

use super::ProcessSegment;

/// Ordered stage queue. The owning processor serializes access through its
/// single mutex; the queue itself is plain data so a whole stage move
/// (dequeue here, enqueue there) happens under one lock.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProcessQueue {
    #[serde(default)]
    segments: Vec<ProcessSegment>,
}

impl ProcessQueue {
    #[must_use]
    pub fn count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn enqueue(&mut self, segment: ProcessSegment) {
        self.segments.push(segment);
    }

    #[must_use]
    pub fn first(&self) -> Option<&ProcessSegment> {
        self.segments.first()
    }

    /// Remove a segment by identity. Returns it so the caller can move it
    /// into the next stage or dispose it.
    pub fn dequeue(&mut self, ts_id: &str) -> Option<ProcessSegment> {
        let index = self.segments.iter().position(|s| s.ts.ts_id == ts_id)?;
        Some(self.segments.remove(index))
    }

    /// Drain the queue, handing every segment back for disposal.
    pub fn reset(&mut self) -> Vec<ProcessSegment> {
        std::mem::take(&mut self.segments)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ProcessSegment> {
        self.segments.clone()
    }
}
