//! Archival janitor
//!
//! Settled deposit requests leave the active queue some time after their
//! decision. The janitor is a single background task fed through a bounded
//! mailbox; it never credits anything and only ever touches requests whose
//! ledger entry is already committed.
//!
//! ```text
//!   approve / reject ──commit──► JanitorHandle::schedule (try_send)
//!                                        │
//!                                        ▼ mpsc
//!                                 ┌──────────────┐
//!                                 │   Janitor    │── due jobs ──► archive_deposit
//!                                 │ delay queue  │── sweep ─────► deposit queue scan
//!                                 └──────────────┘
//! ```
//!
//! A job that fails is retried with a growing delay up to `max_attempts`;
//! anything dropped (full mailbox, exhausted retries, restart) is picked up
//! by the periodic sweep.

use crate::{
    config::{JanitorConfig, MAX_JANITOR_PERIOD},
    metrics::SettlementMetrics,
    records::{NS_DEPOSIT, NS_DEPOSIT_QUEUE},
    types::{DepositRequest, RequestStatus},
    Error, Result,
};
use chrono::Utc;
use ledger_core::{EntryKind, Ledger};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Linear backoff on the archive delay, at least a second, capped
fn retry_delay(config: &JanitorConfig, attempts: u32) -> Duration {
    config
        .archive_delay()
        .max(Duration::from_secs(1))
        .checked_mul(attempts)
        .map_or(MAX_JANITOR_PERIOD, |delay| delay.min(MAX_JANITOR_PERIOD))
}

/// Archive one settled deposit request.
///
/// Returns `false` if there was nothing to do (still pending or already
/// archived). An approved request without its ledger entry is an invariant
/// violation and is left in place.
pub async fn archive_deposit(ledger: &Ledger, request_id: Uuid) -> Result<bool> {
    let key = request_id.to_string();
    let account_id = ledger
        .get_record::<DepositRequest>(NS_DEPOSIT, &key)?
        .ok_or(Error::RequestNotFound(request_id))?
        .account_id;

    let mut scope = ledger.scope(&account_id).await?;
    let mut request: DepositRequest = ledger
        .get_record(NS_DEPOSIT, &key)?
        .ok_or(Error::RequestNotFound(request_id))?;

    if request.archived_at.is_some() || request.status == RequestStatus::Pending {
        return Ok(false);
    }
    if request.status == RequestStatus::Approved
        && ledger.find_entry(EntryKind::Deposit, &key)?.is_none()
    {
        return Err(ledger_core::Error::InvariantViolation(format!(
            "approved deposit {} has no ledger entry",
            request_id
        ))
        .into());
    }

    request.archived_at = Some(Utc::now());
    scope.put_record(NS_DEPOSIT, key.clone(), &request)?;
    scope.delete_record(NS_DEPOSIT_QUEUE, key);
    scope.commit()?;

    tracing::debug!(request = %request_id, status = %request.status, "Deposit request archived");
    Ok(true)
}

/// Message sent to the janitor
#[derive(Debug)]
pub enum JanitorMessage {
    /// Archive a request once its delay has passed
    Schedule {
        /// Deposit request
        request_id: Uuid,
    },

    /// Archive every settled request whose delay has passed, now
    Sweep {
        /// Number of requests archived
        response: oneshot::Sender<Result<usize>>,
    },

    /// Stop the janitor
    Shutdown,
}

#[derive(Debug)]
struct ArchiveJob {
    request_id: Uuid,
    due: Instant,
    attempts: u32,
}

/// Background archival task
#[derive(Debug)]
pub struct Janitor {
    ledger: Arc<Ledger>,
    mailbox: mpsc::Receiver<JanitorMessage>,
    jobs: VecDeque<ArchiveJob>,
    config: JanitorConfig,
    metrics: SettlementMetrics,
}

impl Janitor {
    /// Create janitor
    pub fn new(
        ledger: Arc<Ledger>,
        mailbox: mpsc::Receiver<JanitorMessage>,
        config: JanitorConfig,
        metrics: SettlementMetrics,
    ) -> Self {
        Self {
            ledger,
            mailbox,
            jobs: VecDeque::new(),
            config,
            metrics,
        }
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let mut poll = interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let period = self.config.sweep_interval();
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.mailbox.recv() => match msg {
                    Some(JanitorMessage::Schedule { request_id }) => {
                        self.jobs.push_back(ArchiveJob {
                            request_id,
                            due: Instant::now() + self.config.archive_delay(),
                            attempts: 0,
                        });
                    }
                    Some(JanitorMessage::Sweep { response }) => {
                        let _ = response.send(self.sweep().await);
                    }
                    Some(JanitorMessage::Shutdown) | None => break,
                },

                _ = poll.tick(), if !self.jobs.is_empty() => {
                    self.run_due_jobs().await;
                }

                _ = sweep.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Archive sweep failed");
                    }
                }
            }
        }

        tracing::info!(queued = self.jobs.len(), "Janitor stopped");
    }

    async fn run_due_jobs(&mut self) {
        let now = Instant::now();
        let mut waiting = VecDeque::with_capacity(self.jobs.len());

        while let Some(mut job) = self.jobs.pop_front() {
            if job.due > now {
                waiting.push_back(job);
                continue;
            }
            match archive_deposit(&self.ledger, job.request_id).await {
                Ok(archived) => {
                    if archived {
                        self.metrics.archived_deposits.inc();
                    }
                }
                Err(e) => {
                    job.attempts += 1;
                    if job.attempts >= self.config.max_attempts {
                        tracing::error!(
                            request = %job.request_id,
                            attempts = job.attempts,
                            error = %e,
                            "Archival abandoned, left to sweep"
                        );
                    } else {
                        tracing::warn!(
                            request = %job.request_id,
                            attempts = job.attempts,
                            error = %e,
                            "Archival failed, retrying"
                        );
                        job.due = now + retry_delay(&self.config, job.attempts);
                        waiting.push_back(job);
                    }
                }
            }
        }

        self.jobs = waiting;
    }

    /// Archive every settled request in the deposit queue whose delay has passed
    async fn sweep(&self) -> Result<usize> {
        let delay = chrono::Duration::from_std(self.config.archive_delay())
            .map_err(|e| Error::Config(format!("archive delay: {}", e)))?;
        let cutoff = Utc::now() - delay;

        let mut archived = 0;
        for (key, ()) in self.ledger.scan_records::<()>(NS_DEPOSIT_QUEUE, "")? {
            let Some(request) = self.ledger.get_record::<DepositRequest>(NS_DEPOSIT, &key)? else {
                continue;
            };
            let settled_before_cutoff = request
                .decided_at
                .map(|decided| decided <= cutoff)
                .unwrap_or(false);
            if !settled_before_cutoff {
                continue;
            }
            match archive_deposit(&self.ledger, request.request_id).await {
                Ok(true) => archived += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    request = %request.request_id,
                    error = %e,
                    "Sweep could not archive request"
                ),
            }
        }

        self.metrics.archived_deposits.inc_by(archived as u64);
        if archived > 0 {
            tracing::info!(archived, "Archive sweep completed");
        }
        Ok(archived)
    }
}

/// Handle for sending messages to the janitor
#[derive(Debug, Clone)]
pub struct JanitorHandle {
    sender: mpsc::Sender<JanitorMessage>,
}

impl JanitorHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<JanitorMessage>) -> Self {
        Self { sender }
    }

    /// Queue a request for archival. Never blocks; a job that cannot be
    /// queued is left to the sweep.
    pub fn schedule(&self, request_id: Uuid) {
        if let Err(e) = self.sender.try_send(JanitorMessage::Schedule { request_id }) {
            tracing::warn!(request = %request_id, error = %e, "Archival not queued, left to sweep");
        }
    }

    /// Run a sweep now and wait for it
    pub async fn sweep(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(JanitorMessage::Sweep { response: tx })
            .await
            .map_err(|_| Error::Janitor("Janitor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Janitor("Response channel closed".to_string()))?
    }

    /// Shutdown janitor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(JanitorMessage::Shutdown)
            .await
            .map_err(|_| Error::Janitor("Janitor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the janitor
pub fn spawn_janitor(
    ledger: Arc<Ledger>,
    config: JanitorConfig,
    metrics: SettlementMetrics,
) -> (JanitorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let janitor = Janitor::new(ledger, rx, config, metrics);
    let task = tokio::spawn(janitor.run());
    (JanitorHandle::new(tx), task)
}
