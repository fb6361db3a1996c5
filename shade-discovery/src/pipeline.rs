//! Payment discovery pipeline
//!
//! Pipeline stages, per block window:
//! 1. Fetch `StealthPaymentSent` logs for the window
//! 2. Per log, concurrently (bounded by a semaphore):
//!    - sender is the scanning account: classify `Sent`
//!    - otherwise fetch the transaction input, unwrap the payload to recover
//!      the ephemeral key and run the stealth check
//! 3. Refresh the claimed flag of received payments
//!
//! Results are sorted by ledger timestamp, so the output does not depend on
//! task completion order.

use crate::calldata::{extract_ephemeral_key, EphemeralKeyLookup};
use crate::cancel::CancelToken;
use crate::ledger::{LedgerClient, PaymentLog, RawLog, TxHash};
use crate::progress::{ScanProgress, ScanStage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize, Serializer};
use shade_core::{stealth, LedgerAddress, ScanKeys};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of blocks per log query
pub const DEFAULT_BLOCK_WINDOW: u64 = 5_000;

/// Maximum concurrent per-log tasks
pub const MAX_SCAN_CONCURRENCY: usize = 8;

/// Performance counters for a scan
#[derive(Debug, Default)]
pub struct PerfCounters {
    /// Payment logs examined
    pub logs_scanned: AtomicU64,
    /// Transaction inputs fetched and unwrapped
    pub payloads_unwrapped: AtomicU64,
    /// Payments attributed to the account (received or sent)
    pub matches: AtomicU64,
    /// Logs skipped because no usable ephemeral key was found
    pub skipped: AtomicU64,
    /// Block windows completed
    pub windows_processed: AtomicU64,
    /// Last window processing time in milliseconds
    pub last_window_ms: AtomicU64,
    /// Total processing time in milliseconds
    pub total_time_ms: AtomicU64,
}

impl PerfCounters {
    /// Create new perf counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Get average window time in ms
    pub fn avg_window_ms(&self) -> u64 {
        let windows = self.windows_processed.load(Ordering::Relaxed);
        if windows == 0 {
            return 0;
        }
        self.total_time_ms.load(Ordering::Relaxed) / windows
    }

    /// Record window completion
    pub fn record_window(&self, duration_ms: u64) {
        self.windows_processed.fetch_add(1, Ordering::Relaxed);
        self.last_window_ms.store(duration_ms, Ordering::Relaxed);
        self.total_time_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Get snapshot of counters
    pub fn snapshot(&self) -> PerfSnapshot {
        PerfSnapshot {
            logs_scanned: self.logs_scanned.load(Ordering::Relaxed),
            payloads_unwrapped: self.payloads_unwrapped.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            windows_processed: self.windows_processed.load(Ordering::Relaxed),
            last_window_ms: self.last_window_ms.load(Ordering::Relaxed),
            avg_window_ms: self.avg_window_ms(),
        }
    }

    /// Reset counters
    pub fn reset(&self) {
        for counter in [
            &self.logs_scanned,
            &self.payloads_unwrapped,
            &self.matches,
            &self.skipped,
            &self.windows_processed,
            &self.last_window_ms,
            &self.total_time_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of performance counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerfSnapshot {
    /// Payment logs examined
    pub logs_scanned: u64,
    /// Transaction inputs unwrapped
    pub payloads_unwrapped: u64,
    /// Payments attributed to the account
    pub matches: u64,
    /// Logs skipped
    pub skipped: u64,
    /// Block windows completed
    pub windows_processed: u64,
    /// Last window time in ms
    pub last_window_ms: u64,
    /// Average window time in ms
    pub avg_window_ms: u64,
}

/// Which side of a payment the scanning account is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection {
    /// Paid to one of our stealth addresses
    Received,
    /// Paid by the scanning account
    Sent,
}

/// A payment attributed to the scanning account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StealthPayment {
    /// Ephemeral key `R` published with the payment; `None` for a sent
    /// payment whose input could not be unwrapped
    #[serde(serialize_with = "serialize_optional_hex")]
    pub ephemeral_public_key: Option<Vec<u8>>,
    /// One-time destination
    pub stealth_address: LedgerAddress,
    /// Amount paid
    pub amount: u128,
    /// Payer
    pub sender: LedgerAddress,
    /// Whether the funds have been claimed
    pub claimed: bool,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
    /// Emitting transaction
    #[serde(serialize_with = "serialize_hex")]
    pub transaction_hash: TxHash,
    /// Block that included the payment
    pub block_number: u64,
    /// Log position within the block
    pub log_index: u32,
    /// Received or sent
    pub direction: PaymentDirection,
}

fn serialize_hex<S: Serializer>(bytes: &TxHash, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn serialize_optional_hex<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_some(&format!("0x{}", hex::encode(bytes))),
        None => serializer.serialize_none(),
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Blocks per log query
    pub block_window: u64,
    /// Maximum concurrent per-log tasks
    pub max_concurrency: usize,
    /// Read the contract for the claimed flag of received payments
    pub refresh_claimed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_window: DEFAULT_BLOCK_WINDOW,
            max_concurrency: MAX_SCAN_CONCURRENCY,
            refresh_claimed: true,
        }
    }
}

/// Pipeline execution result
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// First block scanned
    pub from_block: u64,
    /// Last block fully scanned; `None` if cancelled before the first window finished
    pub to_block: Option<u64>,
    /// Payments found, newest first
    pub payments: Vec<StealthPayment>,
    /// Performance snapshot
    pub perf: PerfSnapshot,
    /// Total duration
    pub duration: Duration,
    /// Whether the scan stopped early
    pub cancelled: bool,
}

impl PipelineResult {
    /// Payments received by the account
    pub fn received(&self) -> impl Iterator<Item = &StealthPayment> {
        self.payments
            .iter()
            .filter(|p| p.direction == PaymentDirection::Received)
    }

    /// Payments sent by the account
    pub fn sent(&self) -> impl Iterator<Item = &StealthPayment> {
        self.payments
            .iter()
            .filter(|p| p.direction == PaymentDirection::Sent)
    }
}

/// State shared by the per-log tasks of one run
struct ScanContext {
    ledger: Arc<dyn LedgerClient>,
    payment_contract: LedgerAddress,
    keys: ScanKeys,
    account: LedgerAddress,
    perf: Arc<PerfCounters>,
    cancel: CancelToken,
    refresh_claimed: bool,
}

/// Scans payment logs for payments to or from one account.
///
/// The pipeline only reads: it never touches key state, and the keys it
/// holds for a run are wiped when the run ends.
pub struct DiscoveryPipeline {
    ledger: Arc<dyn LedgerClient>,
    payment_contract: LedgerAddress,
    config: PipelineConfig,
    perf: Arc<PerfCounters>,
    cancel: CancelToken,
    progress: ScanProgress,
}

impl DiscoveryPipeline {
    /// Create a pipeline reading from `ledger`
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        payment_contract: LedgerAddress,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ledger,
            payment_contract,
            config,
            perf: Arc::new(PerfCounters::new()),
            cancel: CancelToken::new(),
            progress: ScanProgress::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress through an externally owned tracker
    pub fn with_progress(mut self, progress: ScanProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Cancellation token observed by [`run`](Self::run)
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress of the current run
    pub fn progress(&self) -> ScanProgress {
        self.progress.clone()
    }

    /// Get performance counters reference
    pub fn perf_counters(&self) -> Arc<PerfCounters> {
        Arc::clone(&self.perf)
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Scan from `from` to the ledger tip
    pub async fn run_to_tip(
        &self,
        keys: &ScanKeys,
        account: LedgerAddress,
        from: u64,
    ) -> Result<PipelineResult> {
        let tip = self.ledger.latest_block().await?;
        self.run(keys, account, from, tip).await
    }

    /// Scan blocks `[from, to]`.
    ///
    /// A ledger error aborts the scan. Cancellation is not an error: the
    /// payments collected so far are returned with `cancelled` set.
    pub async fn run(
        &self,
        keys: &ScanKeys,
        account: LedgerAddress,
        from: u64,
        to: u64,
    ) -> Result<PipelineResult> {
        if from > to {
            return Err(Error::InvalidRange(format!("{} > {}", from, to)));
        }

        self.perf.reset();
        self.progress.start(from, to);
        let pipeline_start = Instant::now();
        let window = self.config.block_window.max(1);

        tracing::info!(
            account = %account,
            from,
            to,
            window,
            "starting payment scan"
        );

        let ctx = Arc::new(ScanContext {
            ledger: Arc::clone(&self.ledger),
            payment_contract: self.payment_contract,
            keys: keys.clone(),
            account,
            perf: Arc::clone(&self.perf),
            cancel: self.cancel.clone(),
            refresh_claimed: self.config.refresh_claimed,
        });

        let mut payments = Vec::new();
        let mut scanned_to = None;
        let mut start = from;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let end = start.saturating_add(window - 1).min(to);
            let window_start = Instant::now();

            self.progress.set_stage(ScanStage::Logs);
            let logs = tokio::select! {
                logs = self.ledger.payment_logs(start, end) => logs?,
                _ = self.cancel.cancelled() => break,
            };

            self.progress.set_stage(ScanStage::Matching);
            let found = self.process_window(&ctx, logs).await?;
            if self.cancel.is_cancelled() {
                // Tasks stop early once cancelled, so this window is incomplete.
                payments.extend(found);
                break;
            }

            self.progress.record_window(end, found.len() as u64);
            payments.extend(found);
            scanned_to = Some(end);
            self.perf
                .record_window(window_start.elapsed().as_millis() as u64);

            tracing::debug!(
                start,
                end,
                payments = payments.len(),
                "scanned block window"
            );

            if end >= to {
                break;
            }
            start = end + 1;
        }

        sort_payments(&mut payments);

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            self.progress.set_stage(ScanStage::Cancelled);
            tracing::warn!(
                scanned_to = ?scanned_to,
                payments = payments.len(),
                "payment scan cancelled"
            );
        } else {
            self.progress.complete();
        }

        let duration = pipeline_start.elapsed();
        let perf = self.perf.snapshot();
        tracing::info!(
            logs = perf.logs_scanned,
            matches = perf.matches,
            skipped = perf.skipped,
            elapsed_ms = duration.as_millis() as u64,
            "payment scan finished"
        );

        Ok(PipelineResult {
            from_block: from,
            to_block: scanned_to,
            payments,
            perf,
            duration,
            cancelled,
        })
    }

    async fn process_window(
        &self,
        ctx: &Arc<ScanContext>,
        logs: Vec<RawLog>,
    ) -> Result<Vec<StealthPayment>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        // Dropping the set aborts whatever is still running, so an abandoned
        // scan stops issuing ledger requests.
        let mut tasks = JoinSet::new();
        for raw in logs {
            let sem = Arc::clone(&semaphore);
            let ctx = Arc::clone(ctx);

            tasks.spawn(async move {
                let _permit = sem.acquire().await.map_err(|_| Error::Cancelled)?;
                process_log(&ctx, &raw).await
            });
        }

        let mut found = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(Error::from).and_then(|outcome| outcome) {
                Ok(Some(payment)) => found.push(payment),
                Ok(None) => {}
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }
        Ok(found)
    }
}

/// Classify one log; `Ok(None)` means it is not ours or is unusable
async fn process_log(ctx: &ScanContext, raw: &RawLog) -> Result<Option<StealthPayment>> {
    if ctx.cancel.is_cancelled() {
        return Ok(None);
    }
    PerfCounters::bump(&ctx.perf.logs_scanned);

    let log = match PaymentLog::decode(raw) {
        Ok(log) => log,
        Err(e) => {
            tracing::debug!(block = raw.block_number, error = %e, "skipping undecodable log");
            PerfCounters::bump(&ctx.perf.skipped);
            return Ok(None);
        }
    };

    if log.event.sender == ctx.account {
        let input = ctx.ledger.transaction_input(&log.transaction_hash).await?;
        PerfCounters::bump(&ctx.perf.payloads_unwrapped);
        let ephemeral_public_key = match extract_ephemeral_key(
            &input,
            &ctx.payment_contract,
            &log.event.stealth_address,
        ) {
            EphemeralKeyLookup::Found {
                ephemeral_public_key,
                ..
            } => Some(ephemeral_public_key),
            EphemeralKeyLookup::NotFound => None,
        };

        let timestamp = ctx.ledger.block_timestamp(log.block_number).await?;
        PerfCounters::bump(&ctx.perf.matches);
        return Ok(Some(payment(
            &log,
            ephemeral_public_key,
            false,
            timestamp,
            PaymentDirection::Sent,
        )));
    }

    let input = ctx.ledger.transaction_input(&log.transaction_hash).await?;
    PerfCounters::bump(&ctx.perf.payloads_unwrapped);

    let (ephemeral_public_key, via) =
        match extract_ephemeral_key(&input, &ctx.payment_contract, &log.event.stealth_address) {
            EphemeralKeyLookup::Found {
                ephemeral_public_key,
                via,
            } => (ephemeral_public_key, via),
            EphemeralKeyLookup::NotFound => {
                tracing::trace!(
                    tx = %hex::encode(log.transaction_hash),
                    "no ephemeral key in transaction input"
                );
                PerfCounters::bump(&ctx.perf.skipped);
                return Ok(None);
            }
        };

    let check = match stealth::check(
        &ephemeral_public_key,
        ctx.keys.viewing_private_key(),
        ctx.keys.spending_public_key(),
        &log.event.stealth_address,
    ) {
        Ok(check) => check,
        Err(e) => {
            tracing::debug!(error = %e, "skipping payment with unusable ephemeral key");
            PerfCounters::bump(&ctx.perf.skipped);
            return Ok(None);
        }
    };
    if !check.is_for_me {
        return Ok(None);
    }

    tracing::debug!(
        stealth_address = %log.event.stealth_address,
        via = ?via,
        "found received payment"
    );
    PerfCounters::bump(&ctx.perf.matches);

    let timestamp = ctx.ledger.block_timestamp(log.block_number).await?;
    let claimed = if ctx.refresh_claimed {
        ctx.ledger
            .payment_status(&log.event.stealth_address)
            .await?
            .claimed
    } else {
        false
    };

    Ok(Some(payment(
        &log,
        Some(ephemeral_public_key),
        claimed,
        timestamp,
        PaymentDirection::Received,
    )))
}

fn payment(
    log: &PaymentLog,
    ephemeral_public_key: Option<Vec<u8>>,
    claimed: bool,
    timestamp: u64,
    direction: PaymentDirection,
) -> StealthPayment {
    StealthPayment {
        ephemeral_public_key,
        stealth_address: log.event.stealth_address,
        amount: log.event.amount,
        sender: log.event.sender,
        claimed,
        timestamp,
        transaction_hash: log.transaction_hash,
        block_number: log.block_number,
        log_index: log.log_index,
        direction,
    }
}

/// Newest first; ties by block (newest first), then transaction hash and
/// log position
pub fn sort_payments(payments: &mut [StealthPayment]) {
    payments.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.block_number.cmp(&a.block_number))
            .then_with(|| a.transaction_hash.cmp(&b.transaction_hash))
            .then_with(|| a.log_index.cmp(&b.log_index))
    });
}
