//! Scan progress: blocks covered, payments found and an ETA from the
//! observed block rate

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scan stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    /// Not started
    Idle,
    /// Fetching payment logs
    Logs,
    /// Recovering ephemeral keys and testing ownership
    Matching,
    /// Complete
    Complete,
    /// Stopped before the end of the range
    Cancelled,
}

impl ScanStage {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Logs => "Fetching Logs",
            Self::Matching => "Matching Payments",
            Self::Complete => "Scanned",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Shared view of a running scan, cheap to clone
#[derive(Debug, Clone)]
pub struct ScanProgress {
    inner: Arc<RwLock<ProgressInner>>,
}

#[derive(Debug, Clone)]
struct ProgressInner {
    start_block: u64,
    current_block: u64,
    target_block: u64,
    stage: ScanStage,
    start_time: Option<Instant>,
    eta_seconds: Option<u64>,
    blocks_per_second: f64,
    payments_found: u64,
}

impl ScanProgress {
    /// Create new progress tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ProgressInner {
                start_block: 0,
                current_block: 0,
                target_block: 0,
                stage: ScanStage::Idle,
                start_time: None,
                eta_seconds: None,
                blocks_per_second: 0.0,
                payments_found: 0,
            })),
        }
    }

    /// Start tracking a scan over `[from, to]`
    pub fn start(&self, from: u64, to: u64) {
        let mut inner = self.inner.write();
        inner.start_block = from;
        inner.current_block = from;
        inner.target_block = to;
        inner.stage = ScanStage::Logs;
        inner.start_time = Some(Instant::now());
        inner.eta_seconds = None;
        inner.blocks_per_second = 0.0;
        inner.payments_found = 0;
    }

    /// Set stage
    pub fn set_stage(&self, stage: ScanStage) {
        self.inner.write().stage = stage;
    }

    /// Record a finished window ending at `block` that yielded `payments`
    pub fn record_window(&self, block: u64, payments: u64) {
        let mut inner = self.inner.write();
        inner.current_block = block;
        inner.payments_found += payments;

        if let Some(start_time) = inner.start_time {
            let elapsed = start_time.elapsed().as_secs_f64();
            let scanned = inner.current_block.saturating_sub(inner.start_block) + 1;
            let remaining = inner.target_block.saturating_sub(inner.current_block);

            if elapsed > 0.0 {
                inner.blocks_per_second = scanned as f64 / elapsed;
                if inner.blocks_per_second > 0.0 {
                    inner.eta_seconds = Some((remaining as f64 / inner.blocks_per_second) as u64);
                }
            }
        }
    }

    /// Share of the range covered, in percent
    pub fn percentage(&self) -> f64 {
        let inner = self.inner.read();
        if inner.stage == ScanStage::Complete {
            return 100.0;
        }
        if inner.stage == ScanStage::Idle || inner.target_block < inner.start_block {
            return 0.0;
        }

        let total = inner.target_block - inner.start_block + 1;
        let done = inner.current_block.saturating_sub(inner.start_block) + 1;
        (done.min(total) as f64 / total as f64) * 100.0
    }

    /// Last block fully scanned
    pub fn current_block(&self) -> u64 {
        self.inner.read().current_block
    }

    /// Last block of the range
    pub fn target_block(&self) -> u64 {
        self.inner.read().target_block
    }

    /// Get current stage
    pub fn stage(&self) -> ScanStage {
        self.inner.read().stage
    }

    /// Payments attributed to the account so far
    pub fn payments_found(&self) -> u64 {
        self.inner.read().payments_found
    }

    /// Seconds left at the current rate; `None` until a window completes
    pub fn eta_seconds(&self) -> Option<u64> {
        self.inner.read().eta_seconds
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner.read().start_time.map(|start| start.elapsed())
    }

    /// Mark as complete
    pub fn complete(&self) {
        let mut inner = self.inner.write();
        inner.stage = ScanStage::Complete;
        inner.current_block = inner.target_block;
        inner.eta_seconds = Some(0);
    }

    /// Check if complete
    pub fn is_complete(&self) -> bool {
        self.inner.read().stage == ScanStage::Complete
    }

    /// One-line status for logs and the CLI
    pub fn summary(&self) -> String {
        let eta_str = match self.eta_seconds() {
            Some(secs) if secs > 0 => format!("ETA: {}m {}s", secs / 60, secs % 60),
            _ => "ETA: calculating...".to_string(),
        };
        let inner = self.inner.read();

        format!(
            "{} | {}/{} | {} payments | {:.1} blocks/s | {}",
            inner.stage.name(),
            inner.current_block,
            inner.target_block,
            inner.payments_found,
            inner.blocks_per_second,
            eta_str
        )
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}
