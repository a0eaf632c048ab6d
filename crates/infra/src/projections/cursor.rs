//! Per-stream projection cursors.
//!
//! A cursor is the last applied sequence number of one journal stream. It makes
//! projections idempotent (replays at or below the cursor are ignored) and lets a
//! rebuild start from zero.

use std::collections::HashMap;
use std::sync::RwLock;

use stockledger_core::StockKey;

use super::ProjectionError;

/// What to do with an incoming envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    Apply,
    Duplicate,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<StockKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, stream: StockKey) -> u64 {
        self.inner
            .read()
            .map(|m| m.get(&stream).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Gaps are an error: the caller must catch up from the journal in order.
    pub fn check(&self, stream: StockKey, sequence: u64) -> Result<CursorCheck, ProjectionError> {
        let last = self.position(stream);
        if sequence == 0 || sequence > last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                stream,
                last,
                found: sequence,
            });
        }
        if sequence <= last {
            return Ok(CursorCheck::Duplicate);
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, stream: StockKey, sequence: u64) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(stream, sequence);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.inner.write() {
            m.clear();
        }
    }
}
