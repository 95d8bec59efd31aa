//! Severity triage
//!
//! Periodically re-derives every active issue's severity from its share of
//! the current maximum vote count. Only the scheduler writes `severity`.
//!
//! Runs are single-flight twice over: an in-process flag stops a slow run
//! from overlapping the next tick on this node, and a store lease stops two
//! nodes from running the same pass.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::model::{Issue, Severity};
use crate::store::{IssueRepository, LeaseRepository, SeverityUpdate};
use crate::types::Result;

/// Lease key for the triage job
pub const TRIAGE_JOB: &str = "severity-triage";

pub const DEFAULT_TRIAGE_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_ACTIVITY_FLOOR: u32 = 3;
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60 * 60);

/// Severity for `upvotes` given the current maximum.
///
/// High at 70% of the maximum (and only when the maximum is non-zero),
/// Medium at 30%, Low otherwise. Compared in integers so the thresholds are
/// exact.
pub fn classify(upvotes: u32, max_votes: u32) -> Severity {
    let votes = u64::from(upvotes) * 10;
    let max = u64::from(max_votes);
    if max > 0 && votes >= max * 7 {
        Severity::High
    } else if votes >= max * 3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Changed severities for one pass over `issues`.
///
/// Returns the maximum vote count and the updates. Below `activity_floor`
/// there is too little signal and nothing is returned.
pub fn plan_updates(issues: &[Issue], activity_floor: u32) -> (u32, Vec<SeverityUpdate>) {
    let max_votes = issues.iter().map(|i| i.upvotes).max().unwrap_or(0);
    if max_votes < activity_floor {
        return (max_votes, Vec::new());
    }

    let updates = issues
        .iter()
        .filter_map(|issue| {
            let severity = classify(issue.upvotes, max_votes);
            (severity != issue.severity).then(|| SeverityUpdate {
                issue_id: issue.id.clone(),
                severity,
            })
        })
        .collect();
    (max_votes, updates)
}

/// Why a pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A previous pass on this node is still running
    InFlight,
    /// Another node holds the job lease
    LeaseHeld,
}

/// Outcome of one triage pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriageReport {
    pub scanned: usize,
    pub max_votes: u32,
    pub updated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl TriageReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub interval: Duration,
    pub activity_floor: u32,
    pub lease_ttl: Duration,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TRIAGE_INTERVAL,
            activity_floor: DEFAULT_ACTIVITY_FLOOR,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

/// Clears the in-flight flag however the pass ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodic severity recomputation
pub struct TriageScheduler {
    node_id: String,
    issues: Arc<dyn IssueRepository>,
    leases: Arc<dyn LeaseRepository>,
    config: TriageConfig,
    in_flight: AtomicBool,
    running: RwLock<bool>,
}

impl TriageScheduler {
    pub fn new(
        node_id: impl Into<String>,
        issues: Arc<dyn IssueRepository>,
        leases: Arc<dyn LeaseRepository>,
        config: TriageConfig,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            issues,
            leases,
            config,
            in_flight: AtomicBool::new(false),
            running: RwLock::new(false),
        }
    }

    /// Run one pass now
    pub async fn run_once(&self) -> Result<TriageReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Severity triage already running on this node, skipping");
            return Ok(TriageReport::skipped(SkipReason::InFlight));
        }
        let _guard = InFlight(&self.in_flight);

        if !self
            .leases
            .try_acquire_lease(TRIAGE_JOB, &self.node_id, self.config.lease_ttl)
            .await?
        {
            info!("Severity triage lease held by another node, skipping");
            return Ok(TriageReport::skipped(SkipReason::LeaseHeld));
        }

        let result = self.pass().await;

        if let Err(e) = self.leases.release_lease(TRIAGE_JOB, &self.node_id).await {
            // The lease expires on its own
            warn!(error = %e, "Failed to release triage lease");
        }
        result
    }

    async fn pass(&self) -> Result<TriageReport> {
        let issues = self.issues.list_active().await?;
        let (max_votes, updates) = plan_updates(&issues, self.config.activity_floor);

        if max_votes < self.config.activity_floor {
            debug!(
                max_votes,
                floor = self.config.activity_floor,
                "Too little activity for triage"
            );
        }

        let updated = if updates.is_empty() {
            0
        } else {
            self.issues.write_severities(&updates).await?
        };

        let report = TriageReport {
            scanned: issues.len(),
            max_votes,
            updated,
            skipped: None,
        };
        info!(
            scanned = report.scanned,
            max_votes = report.max_votes,
            updated = report.updated,
            "Severity triage complete"
        );
        Ok(report)
    }

    /// Start the periodic loop. The first pass runs one interval from now;
    /// ticks missed while a pass is slow are dropped.
    pub async fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Triage scheduler already running");
                return None;
            }
            *running = true;
        }

        info!(
            node_id = %self.node_id,
            interval_secs = self.config.interval.as_secs(),
            floor = self.config.activity_floor,
            "Starting severity triage scheduler"
        );

        let period = self.config.interval;
        let Some(first_tick) = Instant::now().checked_add(period) else {
            error!(
                interval_secs = period.as_secs(),
                "Triage interval is out of range, scheduler not started"
            );
            *self.running.write().await = false;
            return None;
        };

        let scheduler = Arc::clone(&self);
        Some(tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if !*scheduler.running.read().await {
                    info!("Triage scheduler stopped");
                    break;
                }

                if let Err(e) = scheduler.run_once().await {
                    error!(error = %e, "Severity triage failed");
                }
            }
        }))
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}
