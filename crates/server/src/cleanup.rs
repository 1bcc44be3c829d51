//! Periodic reaping of expired device authorizations.
//!
//! A record past its deadline is first marked `expired`; once it is also past
//! the visibility window it is deleted. Each row is handled by its own
//! conditional statement, so the sweeper can run alongside request handlers and
//! a failure on one row does not stop the others.

use crate::config::CleanupConfig;
use crate::entity::device_authorization::DeviceStatus;
use crate::store::{RegistrationStore, now_millis};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub expired: usize,
    pub failed: usize,
}

/// One pass over every record that is expired or past its deadline.
#[tracing::instrument(skip(store))]
pub async fn sweep(store: &RegistrationStore, now_ms: i64, visibility_window_ms: i64) -> SweepReport {
    let mut report = SweepReport::default();
    let candidates = match store.scan_expired_candidates(now_ms).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(
                name: "cleanup.scan",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "scanning for expired device authorizations failed"
            );
            report.failed += 1;
            return report;
        }
    };
    report.scanned = candidates.len();

    let delete_cutoff = now_ms - visibility_window_ms;
    for record in candidates {
        let outcome = if record.max_expiry < delete_cutoff {
            store
                .delete_if_past(&record.device_code, delete_cutoff)
                .await
                .map(|deleted| (deleted, false))
        } else if record.status != DeviceStatus::Expired && record.max_expiry < now_ms {
            store
                .expire_if_past(&record.device_code, now_ms)
                .await
                .map(|expired| (false, expired))
        } else {
            continue;
        };

        match outcome {
            Ok((true, _)) => report.deleted += 1,
            Ok((_, true)) => report.expired += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    name: "cleanup.record",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "failed to reap device authorization"
                );
                report.failed += 1;
            }
        }
    }
    report
}

/// Spawn a background task running [`sweep`] every `cleanup.interval` seconds.
#[tracing::instrument(skip(store))]
pub fn spawn_cleanup_task(store: RegistrationStore, config: CleanupConfig) {
    if !config.enabled || config.interval == 0 {
        return;
    }
    let visibility_window_ms = config.visibility_window as i64 * 1000;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval));
        loop {
            interval.tick().await;
            let report = sweep(&store, now_millis(), visibility_window_ms).await;
            tracing::info!(
                scanned = report.scanned,
                deleted = report.deleted,
                expired = report.expired,
                failed = report.failed,
                "Device authorization cleanup finished"
            );
        }
    });
}
