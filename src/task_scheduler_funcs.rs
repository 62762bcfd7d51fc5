use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::archive::Archive;
use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::data_backend::fetch_canteen;
use crate::data_types::{CanteenResult, FailedCanteen, RunReport};
use crate::errors::{ArchiveError, FetchError};
use crate::notifications::NotificationMatcher;

pub fn build_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.fetch_timeout())
        .build()
}

/// One full cycle: fetch every active canteen, store what arrived, then notify.
///
/// A canteen that fails to fetch or store is listed in the report and the run goes on.
/// Only an error that leaves the archive unusable ends the cycle early.
pub async fn run_cycle(
    config: &Config,
    client: &reqwest::Client,
    archive: &mut Archive,
    matcher: Option<&NotificationMatcher>,
    today: NaiveDate,
) -> Result<RunReport, ArchiveError> {
    let now = Instant::now();
    let mut report = RunReport::new();
    log::info!("Run {} for {} started", report.run_id, today);

    let mut active = Vec::new();
    for canteen in &config.canteens {
        if archive.canteen_is_active(&canteen.name)? {
            active.push(canteen);
        } else {
            log::info!("{}: inactive, skipped", canteen.name);
            report.skipped_inactive.push(canteen.name.clone());
        }
    }

    // owned per fetch, so the cron job's future stays Send
    let fetches = stream::iter(active.into_iter().cloned())
        .map(|canteen| {
            let client = client.clone();
            async move {
                let fetched = fetch_canteen(&client, &canteen, today).await;
                (canteen.name, fetched)
            }
        })
        .buffer_unordered(config.max_parallel_fetches);
    reconcile_all(archive, fetches, &mut report).await?;

    if let Some(matcher) = matcher {
        match matcher.run(archive, today) {
            Ok(notifications) => report.notifications = Some(notifications),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::error!("Notification pass failed: {}", e),
        }
    }

    log::info!(
        "Run {} done: {} stored, {} failed, {} inactive ({:.2?})",
        report.run_id,
        report.reconciled.len(),
        report.failed.len(),
        report.skipped_inactive.len(),
        now.elapsed()
    );
    Ok(report)
}

/// Stores fetch results one at a time, in the order they complete.
async fn reconcile_all<S>(
    archive: &mut Archive,
    fetches: S,
    report: &mut RunReport,
) -> Result<(), ArchiveError>
where
    S: Stream<Item = (String, Result<CanteenResult, FetchError>)>,
{
    let mut fetches = std::pin::pin!(fetches);

    while let Some((name, fetched)) = fetches.next().await {
        let result = match fetched {
            Ok(result) => result,
            Err(e) => {
                log::warn!("{}: fetch failed: {}", name, e);
                report.failed.push(FailedCanteen {
                    canteen: name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match archive.store_canteen_result(&name, &result) {
            Ok(reconciled) => report.reconciled.push(reconciled),
            Err(e) if e.is_fatal() => {
                log::error!("{}: archive unusable: {}", name, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("{}: storing failed, rolled back: {}", name, e);
                report.failed.push(FailedCanteen {
                    canteen: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Registers `run_cycle` as a cron job. Overlapping firings wait for the archive lock.
/// A fatal archive error is handed to `fatal_tx` so the caller can shut down.
pub async fn start_scheduled_runs(
    sched: &JobScheduler,
    schedule: &str,
    config: Arc<Config>,
    client: reqwest::Client,
    archive: Arc<Mutex<Archive>>,
    matcher: Option<Arc<NotificationMatcher>>,
    fatal_tx: mpsc::Sender<ArchiveError>,
) -> Result<Uuid, JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, mut _l| {
        let config = config.clone();
        let client = client.clone();
        let archive = archive.clone();
        let matcher = matcher.clone();
        let fatal_tx = fatal_tx.clone();

        Box::pin(async move {
            let mut archive = archive.lock().await;
            let today = Local::now().date_naive();

            if let Err(e) =
                run_cycle(&config, &client, &mut archive, matcher.as_deref(), today).await
            {
                log::error!("Scheduled run aborted: {}", e);
                let _ = fatal_tx.send(e).await;
            }
        })
    })?;

    let uuid = sched.add(job).await?;
    log::info!("Scheduled runs registered ({})", schedule);
    Ok(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CanteenConfig, SourceConfig, Thresholds};
    use crate::data_types::{OpeningTimes, ServingDraft};
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;

    fn plan(title: &str) -> CanteenResult {
        CanteenResult::new(
            OpeningTimes::new(),
            vec![ServingDraft {
                day: NaiveDate::from_ymd_opt(2024, 5, 13).unwrap(),
                title: title.to_string(),
                price: Decimal::new(290, 2),
                price_staff: Decimal::new(390, 2),
                vegetarian: false,
                vegan: false,
                allergens: BTreeSet::new(),
            }],
        )
    }

    #[tokio::test]
    async fn failed_fetch_does_not_stop_other_canteens() {
        let mut archive = Archive::open_in_memory(Thresholds::default()).unwrap();
        let mut report = RunReport::new();
        let fetches = stream::iter(vec![
            (
                "Philturm".to_string(),
                Err(FetchError::Status {
                    url: "http://example.org".to_string(),
                    status: 503,
                }),
            ),
            ("Studierendenhaus".to_string(), Ok(plan("Currywurst"))),
        ]);

        reconcile_all(&mut archive, fetches, &mut report).await.unwrap();

        assert!(report.is_partial_failure());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].canteen, "Philturm");
        assert!(report.failed[0].reason.contains("503"));
        assert_eq!(report.reconciled.len(), 1);
        assert_eq!(report.reconciled[0].created, 1);
        assert!(archive.canteen_id("Philturm").unwrap().is_none());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn scheduled_cycle_future_is_send() {
        let config = Config::default();
        let client = build_client(&config).unwrap();
        let mut archive = Archive::open_in_memory(Thresholds::default()).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 13).unwrap();

        let cycle = run_cycle(&config, &client, &mut archive, None, today);
        assert_send(&cycle);
    }

    #[tokio::test]
    async fn inactive_canteens_are_not_fetched() {
        let mut archive = Archive::open_in_memory(Thresholds::default()).unwrap();
        archive
            .store_canteen_result("Philturm", &CanteenResult::default())
            .unwrap();
        archive.set_canteen_active("Philturm", false).unwrap();

        let config = Config {
            canteens: vec![CanteenConfig {
                name: "Philturm".to_string(),
                // never contacted
                source: SourceConfig::Desy {
                    url: "http://127.0.0.1:9/".to_string(),
                    english: false,
                },
            }],
            ..Config::default()
        };
        let client = build_client(&config).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 13).unwrap();

        let report = run_cycle(&config, &client, &mut archive, None, today)
            .await
            .unwrap();
        assert_eq!(report.skipped_inactive, vec!["Philturm".to_string()]);
        assert!(report.failed.is_empty());
        assert!(report.reconciled.is_empty());
        assert!(report.notifications.is_none());
    }
}
