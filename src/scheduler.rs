use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::services::Services;

const MIN_PERIOD: Duration = Duration::from_millis(1);
/// Longest accepted period; larger settings would overflow the timer.
const MAX_PERIOD: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Takes a backup every `period` while the process runs. The first one happens one full period
/// after start; periods missed while the process was not running are not made up.
pub fn start_backup_scheduler(services: Services, period: Duration) -> JoinHandle<()> {
    let period = clamp_period(period);
    log::info!("backup scheduler started period_secs={}", period.as_secs());
    spawn_periodic(period, move || run_scheduled_backup(services.clone()))
}

fn clamp_period(period: Duration) -> Duration {
    let clamped = period.clamp(MIN_PERIOD, MAX_PERIOD);
    if clamped != period {
        log::warn!(
            "backup period {}s out of range, using {}s",
            period.as_secs(),
            clamped.as_secs()
        );
    }
    clamped
}

async fn run_scheduled_backup(services: Services) {
    match tokio::task::spawn_blocking(move || services.create_backup()).await {
        Ok(Ok(path)) => log::info!("scheduled backup written path={}", path.display()),
        Ok(Err(err)) => log::warn!("scheduled backup failed: {err}"),
        Err(err) => log::error!("scheduled backup worker panicked: {err}"),
    }
}

fn spawn_periodic<F, Fut>(period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let now = Instant::now();
        let start = now.checked_add(period).unwrap_or(now);
        let mut interval = interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            job().await;
        }
    })
}
