use super::engine::SettlementEngine;
use super::reminders::send_reminders;
use crate::domain::ports::{CustomerStoreRef, NotifierRef};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Periodically expires abandoned sessions until `shutdown` flips to `true`.
pub fn spawn_expiry_loop(
    engine: Arc<SettlementEngine>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = engine.expire_stale().await;
                    if report.expired > 0 || report.recovered > 0 {
                        info!(expired = report.expired, recovered = report.recovered, "session sweep");
                    }
                }
            }
        }
    })
}

pub struct ReminderSchedule {
    pub every: Duration,
    pub window_days: u64,
}

pub fn spawn_reminder_loop(
    engine: Arc<SettlementEngine>,
    customers: CustomerStoreRef,
    notifier: NotifierRef,
    schedule: ReminderSchedule,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(schedule.every);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let today = Local::now().date_naive();
                    if let Err(e) = send_reminders(
                        customers.as_ref(),
                        engine.contacts(),
                        notifier.as_ref(),
                        today,
                        schedule.window_days,
                    )
                    .await
                    {
                        warn!(error = %e, "reminder run failed");
                    }
                }
            }
        }
    })
}
