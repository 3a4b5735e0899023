//! Deposit reconciliation engine.
//!
//! The engine is responsible for:
//! - Paging through pending deposits in latency-sized batches
//! - Expiring deposits past their deadline without asking the gateway
//! - Checking live deposits against the settlement gateway concurrently
//! - Crediting settled deposits exactly once and closing failed ones
//! - Notifying users of every transition
//! - Refreshing countdowns of pending deposits on a slower cadence
//!
//! Whole cycles are guarded by a [`CircuitBreaker`]: ledger failures count
//! against it, gateway failures never do. Countdown refreshes run on their own
//! task and never delay a cycle.

mod batch;
mod breaker;

pub use batch::AdaptiveBatch;
pub use breaker::{CircuitBreaker, CircuitState};

use crate::config::ReconcileConfig;
use crate::entities::{Deposit, DepositStatus};
use crate::gateway::{GatewayVerdict, SettlementGateway};
use crate::ledger::{LedgerError, LedgerStore};
use crate::notify::Notifier;
use futures_util::StreamExt;
use futures_util::stream;
use numrent_sdk::objects::Severity;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Errors that fail a whole cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Ledger error
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// What happened to one deposit in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    StillPending,
    Completed,
    Failed,
    /// Someone else moved the deposit out of pending first.
    Superseded,
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub expired: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub duration: Duration,
}

impl CycleReport {
    fn has_transitions(&self) -> bool {
        self.expired + self.completed + self.failed > 0
    }
}

/// Background service that settles pending deposits.
pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerStore>,
    gateway: Option<Arc<dyn SettlementGateway>>,
    notifier: Notifier,
    config: ReconcileConfig,
    breaker: CircuitBreaker,
    batch: AdaptiveBatch,
    countdowns: CountdownRefresher,
}

/// Edits the remaining-time display of live pending deposits.
///
/// Owns clones of the engine's ledger and notifier so it can run as a task
/// of its own next to the poll loop.
#[derive(Clone)]
struct CountdownRefresher {
    ledger: Arc<dyn LedgerStore>,
    notifier: Notifier,
    interval: Duration,
    page_size: usize,
}

impl ReconciliationEngine {
    /// Create a new engine.
    ///
    /// Without a `gateway` live deposits are never checked and simply age
    /// out at their deadline.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Option<Arc<dyn SettlementGateway>>,
        notifier: Notifier,
        config: ReconcileConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.failure_threshold, config.cooldown);
        let batch = AdaptiveBatch::new(
            config.initial_batch(),
            config.min_batch,
            config.max_batch,
            config.poll_interval,
        );
        let countdowns = CountdownRefresher {
            ledger: ledger.clone(),
            notifier: notifier.clone(),
            interval: config.countdown_interval,
            page_size: config.max_batch.max(1),
        };
        Self {
            ledger,
            gateway,
            notifier,
            config,
            breaker,
            batch,
            countdowns,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.breaker.consecutive_errors()
    }

    pub fn batch_size(&self) -> usize {
        self.batch.size()
    }

    /// Run both loops until shutdown is signalled.
    ///
    /// The countdown loop is spawned as a separate task; this future drives
    /// the reconciliation cycles and waits for the countdown task on exit.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            countdown_secs = self.config.countdown_interval.as_secs(),
            gateway = self.gateway.is_some(),
            "Reconciliation engine started"
        );

        let countdowns = tokio::spawn(self.countdowns.clone().run(shutdown_rx.clone()));

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Reconciliation engine received shutdown signal");
                        break;
                    }
                }

                _ = poll.tick() => {
                    match self.run_cycle().await {
                        Ok(Some(report)) if report.has_transitions() => info!(
                            scanned = report.scanned,
                            expired = report.expired,
                            completed = report.completed,
                            failed = report.failed,
                            still_pending = report.still_pending,
                            duration_ms = report.duration.as_millis() as u64,
                            batch = self.batch.size(),
                            "Reconciliation cycle finished"
                        ),
                        Ok(Some(report)) => debug!(
                            scanned = report.scanned,
                            duration_ms = report.duration.as_millis() as u64,
                            "Reconciliation cycle finished"
                        ),
                        Ok(None) => debug!("Circuit open, skipping cycle"),
                        Err(e) => error!(
                            error = %e,
                            consecutive_errors = self.breaker.consecutive_errors(),
                            "Reconciliation cycle failed"
                        ),
                    }
                }
            }
        }

        if let Err(e) = countdowns.await {
            error!(error = %e, "Countdown task failed");
        }
        info!("Reconciliation engine shutdown complete");
    }

    /// Run one cycle if the circuit admits it.
    ///
    /// Returns `Ok(None)` when the circuit is open.
    pub async fn run_cycle(&mut self) -> Result<Option<CycleReport>, ReconcileError> {
        if !self.breaker.try_acquire(Instant::now()) {
            return Ok(None);
        }

        let started = Instant::now();
        let result = self.scan(self.batch.size()).await;
        let elapsed = started.elapsed();
        self.batch.record(elapsed);

        match result {
            Ok(mut report) => {
                self.breaker.record_success();
                report.duration = elapsed;
                Ok(Some(report))
            }
            Err(e) => {
                let was_open = self.breaker.state() == CircuitState::Open;
                self.breaker.record_failure(Instant::now());
                if !was_open && self.breaker.state() == CircuitState::Open {
                    self.notifier
                        .alert(
                            "Reconciliation paused",
                            format!(
                                "{} consecutive cycles failed, last error: {e}. Retrying in {}s.",
                                self.breaker.consecutive_errors(),
                                self.config.cooldown.as_secs()
                            ),
                            Severity::High,
                        )
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Page through every pending deposit once.
    async fn scan(&self, batch_size: usize) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport::default();
        let mut after: Option<String> = None;

        loop {
            let page = self
                .ledger
                .pending_deposits(after.as_deref(), batch_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id.clone());
            let full_page = page.len() >= batch_size;
            report.scanned += page.len();

            let now = time::OffsetDateTime::now_utc();
            let (expired, live): (Vec<Deposit>, Vec<Deposit>) =
                page.into_iter().partition(|d| d.is_expired_at(now));

            for deposit in &expired {
                if self.close(deposit, DepositStatus::Expired).await? {
                    report.expired += 1;
                }
            }

            let outcomes: Vec<Result<Settlement, ReconcileError>> = stream::iter(live)
                .map(|deposit| async move { self.settle(&deposit).await })
                .buffer_unordered(batch_size)
                .collect()
                .await;

            // Tally everything before surfacing an error so that settled
            // deposits in the same page are still counted.
            let mut first_error = None;
            for outcome in outcomes {
                match outcome {
                    Ok(Settlement::StillPending) => report.still_pending += 1,
                    Ok(Settlement::Completed) => report.completed += 1,
                    Ok(Settlement::Failed) => report.failed += 1,
                    Ok(Settlement::Superseded) => {}
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }

            if !full_page {
                break;
            }
        }

        Ok(report)
    }

    /// Ask the gateway about one live deposit and act on the answer.
    async fn settle(&self, deposit: &Deposit) -> Result<Settlement, ReconcileError> {
        let Some(gateway) = &self.gateway else {
            return Ok(Settlement::StillPending);
        };

        let verdict = match gateway.check(&deposit.id).await {
            Ok(verdict) => verdict,
            Err(e) => {
                debug!(deposit_id = %deposit.id, error = %e, "Gateway check failed, retrying next cycle");
                return Ok(Settlement::StillPending);
            }
        };

        match verdict {
            GatewayVerdict::Pending => Ok(Settlement::StillPending),
            GatewayVerdict::Succeeded { reported_amount } => {
                if reported_amount.is_some_and(|reported| reported != deposit.amount) {
                    warn!(
                        deposit_id = %deposit.id,
                        recorded = %deposit.amount,
                        reported = ?reported_amount,
                        "Gateway reported a different amount, crediting the recorded amount"
                    );
                }

                let Some(credit) = self.ledger.credit_deposit(&deposit.id).await? else {
                    debug!(deposit_id = %deposit.id, "Deposit already settled elsewhere");
                    return Ok(Settlement::Superseded);
                };
                info!(
                    deposit_id = %deposit.id,
                    user_id = credit.user_id,
                    amount = %credit.amount,
                    balance = %credit.balance_after,
                    "Deposit credited"
                );
                self.notifier
                    .deposit(deposit.to_payload(DepositStatus::Completed, Some(credit.balance_after)))
                    .await;
                Ok(Settlement::Completed)
            }
            GatewayVerdict::Failed => {
                if self.close(deposit, DepositStatus::Failed).await? {
                    Ok(Settlement::Failed)
                } else {
                    Ok(Settlement::Superseded)
                }
            }
        }
    }

    /// Close a deposit and notify the user if this call made the transition.
    async fn close(&self, deposit: &Deposit, status: DepositStatus) -> Result<bool, ReconcileError> {
        let closed = self.ledger.close_deposit(&deposit.id, status).await?;
        if closed {
            info!(deposit_id = %deposit.id, user_id = deposit.user_id, status = ?status, "Deposit closed");
            self.notifier.deposit(deposit.to_payload(status, None)).await;
        }
        Ok(closed)
    }

    /// Refresh the countdown of every pending deposit that is still live.
    ///
    /// Returns the number of deposits whose message was refreshed on at least
    /// one channel.
    pub async fn refresh_countdowns(&self) -> Result<usize, ReconcileError> {
        self.countdowns.refresh().await
    }
}

impl CountdownRefresher {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(refreshed) => debug!(refreshed, "Countdowns refreshed"),
                        Err(e) => warn!(error = %e, "Countdown refresh failed"),
                    }
                }
            }
        }
    }

    async fn refresh(&self) -> Result<usize, ReconcileError> {
        let mut after: Option<String> = None;
        let mut refreshed = 0;

        loop {
            let page = self
                .ledger
                .pending_deposits(after.as_deref(), self.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id.clone());
            let full_page = page.len() >= self.page_size;

            let now = time::OffsetDateTime::now_utc();
            refreshed += stream::iter(page.into_iter().filter(|d| !d.is_expired_at(now)))
                .map(|deposit| async move {
                    self.notifier
                        .deposit_countdown(deposit.to_payload(DepositStatus::Pending, None))
                        .await
                })
                .buffer_unordered(self.page_size)
                .filter(|report| std::future::ready(report.delivered_count() > 0))
                .count()
                .await;

            if !full_page {
                break;
            }
        }

        Ok(refreshed)
    }
}
