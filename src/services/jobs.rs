use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{oneshot, watch};

use super::{RequestHandler, Service, ServiceError};
use crate::models::notifications;
use crate::repositories::customers::CustomerRepository;
use crate::repositories::notifications::NotificationRepository;
use crate::settings;

pub enum JobsRequest {
    RunOverdueScan {
        response: oneshot::Sender<Result<u64, ServiceError>>,
    },
    RunMetricsRecalculation {
        response: oneshot::Sender<Result<MetricsRecalculation, ServiceError>>,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsRecalculation {
    pub frequent_buyer_updates: u64,
    pub good_standing_updates: u64,
}

#[derive(Clone)]
pub struct JobsRequestHandler {
    customers: CustomerRepository,
    notifications: NotificationRepository,
    config: settings::Jobs,
}

impl JobsRequestHandler {
    pub fn new(sql_conn: PgPool, config: settings::Jobs) -> Self {
        JobsRequestHandler {
            customers: CustomerRepository::new(sql_conn.clone()),
            notifications: NotificationRepository::new(sql_conn),
            config,
        }
    }

    /// Registers the two daily triggers. Each loop sleeps until its next
    /// local trigger time and stops cleanly on shutdown so a partial scan is
    /// never recorded as complete.
    pub fn start_schedulers(&self, shutdown: watch::Receiver<bool>) {
        let overdue = self.clone();
        let mut overdue_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let wait = duration_until_hour(
                    Utc::now(),
                    overdue.config.utc_offset_hours,
                    overdue.config.overdue_hour,
                );

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = overdue.run_overdue_scan().await {
                            log::error!("Overdue scan failed: {}", e);
                        }
                    }
                    _ = overdue_shutdown.changed() => {
                        log::info!("Overdue scan scheduler stopped.");
                        break;
                    }
                }
            }
        });

        let metrics = self.clone();
        let mut metrics_shutdown = shutdown;
        tokio::spawn(async move {
            loop {
                let wait = duration_until_hour(
                    Utc::now(),
                    metrics.config.utc_offset_hours,
                    metrics.config.metrics_hour,
                );

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = metrics.run_metrics_recalculation().await {
                            log::error!("Metrics recalculation failed: {}", e);
                        }
                    }
                    _ = metrics_shutdown.changed() => {
                        log::info!("Metrics scheduler stopped.");
                        break;
                    }
                }
            }
        });

        log::info!(
            "Jobs registered: overdue scan at {:02}:00, metrics at {:02}:00 (UTC{:+}).",
            self.config.overdue_hour,
            self.config.metrics_hour,
            self.config.utc_offset_hours
        );
    }

    /// Flags membership customers that missed the current payment window.
    /// Safe to re-run: the flag set is idempotent and already-flagged
    /// customers are not selected again.
    pub async fn run_overdue_scan(&self) -> Result<u64, ServiceError> {
        log::info!("Running overdue payment check.");

        let today = local_date(Utc::now(), self.config.utc_offset_hours);
        let candidates = self
            .customers
            .list_newly_overdue(
                today.day() as i32,
                today.month() as i32,
                today.year(),
                self.config.grace_days as i32,
            )
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;

        if candidates.is_empty() {
            log::info!("No overdue customers found.");
            return Ok(0);
        }

        log::info!("Found {} overdue customer(s).", candidates.len());

        // One failing customer must not abort the rest of the scan.
        let mut flagged = 0u64;
        for candidate in candidates {
            let result = async {
                self.customers.mark_overdue(&candidate.id).await?;
                self.notifications
                    .insert(
                        &candidate.business_id,
                        None,
                        notifications::TYPE_OVERDUE_PAYMENT,
                        &format!(
                            "El cliente {} ({}) no ha pagado su cuota mensual y está vencido.",
                            candidate.full_name, candidate.phone
                        ),
                    )
                    .await?;
                Ok::<(), anyhow::Error>(())
            }
            .await;

            match result {
                Ok(()) => {
                    flagged += 1;
                    log::info!("Marked overdue: customer {} ({})", candidate.id, candidate.phone);
                }
                Err(e) => {
                    log::error!("Failed to process customer {}: {}", candidate.id, e);
                }
            }
        }

        Ok(flagged)
    }

    /// Overwrites the derived flags from current payment history. Running
    /// twice in a row yields identical results.
    pub async fn run_metrics_recalculation(&self) -> Result<MetricsRecalculation, ServiceError> {
        log::info!("Running customer metrics recalculation.");

        let window_start = Utc::now() - Duration::days(self.config.frequent_buyer_window_days);

        let mut first_error = None;

        let frequent_buyer_updates = match self
            .customers
            .recalculate_frequent_buyer(self.config.frequent_buyer_min_purchases, window_start)
            .await
        {
            Ok(count) => {
                log::info!("frequent_buyer updated for {} customers.", count);
                count
            }
            Err(e) => {
                log::error!("recalculate_frequent_buyer error: {}", e);
                first_error = Some(e);
                0
            }
        };

        let good_standing_updates = match self.customers.recalculate_good_standing().await {
            Ok(count) => {
                log::info!("good_standing updated for {} customers.", count);
                count
            }
            Err(e) => {
                log::error!("recalculate_good_standing error: {}", e);
                first_error.get_or_insert(e);
                0
            }
        };

        match first_error {
            Some(e) => Err(ServiceError::Database(e.to_string())),
            None => Ok(MetricsRecalculation {
                frequent_buyer_updates,
                good_standing_updates,
            }),
        }
    }
}

#[async_trait]
impl RequestHandler<JobsRequest> for JobsRequestHandler {
    async fn handle_request(&self, request: JobsRequest) {
        match request {
            JobsRequest::RunOverdueScan { response } => {
                let result = self.run_overdue_scan().await;
                let _ = response.send(result);
            }
            JobsRequest::RunMetricsRecalculation { response } => {
                let result = self.run_metrics_recalculation().await;
                let _ = response.send(result);
            }
        }
    }
}

fn offset(utc_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

fn local_date(now: DateTime<Utc>, utc_offset_hours: i32) -> chrono::NaiveDate {
    now.with_timezone(&offset(utc_offset_hours)).date_naive()
}

/// Time until the next occurrence of `hour:00:00` in the configured offset.
fn duration_until_hour(now: DateTime<Utc>, utc_offset_hours: i32, hour: u32) -> std::time::Duration {
    let local = now.with_timezone(&offset(utc_offset_hours));

    let today_trigger = local
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| local.date_naive().and_hms_opt(0, 0, 0).unwrap());

    let mut trigger = today_trigger;
    if trigger <= local.naive_local() {
        trigger += Duration::days(1);
    }

    (trigger - local.naive_local())
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60))
}

pub struct JobsService;

impl JobsService {
    pub fn new() -> Self {
        JobsService {}
    }
}

#[async_trait]
impl Service<JobsRequest, JobsRequestHandler> for JobsService {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trigger_later_today() {
        // 2026-02-01 10:00 UTC is 04:00 in Costa Rica; midnight local is 20
        // hours away.
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        let wait = duration_until_hour(now, -6, 0);
        assert_eq!(wait.as_secs(), 20 * 3600);
    }

    #[test]
    fn trigger_rolls_to_tomorrow() {
        // 06:00 UTC is exactly local midnight; the next run is a full day out.
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 6, 0, 0).unwrap();
        let wait = duration_until_hour(now, -6, 0);
        assert_eq!(wait.as_secs(), 24 * 3600);
    }

    #[test]
    fn one_am_job_runs_after_midnight_job() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 6, 0, 0).unwrap();
        let overdue = duration_until_hour(now, -6, 0);
        let metrics = duration_until_hour(now, -6, 1);
        assert!(metrics < overdue);
    }

    #[test]
    fn local_date_crosses_the_day_boundary() {
        // 03:00 UTC on Feb 2 is still Feb 1 in Costa Rica.
        let now = Utc.with_ymd_and_hms(2026, 2, 2, 3, 0, 0).unwrap();
        assert_eq!(local_date(now, -6).day(), 1);
        assert_eq!(local_date(now, 0).day(), 2);
    }
}
