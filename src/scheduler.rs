use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::db::{LocationRepository, ReadingRepository};
use crate::etl::{self, PipelineOptions};
use crate::fetcher::TomorrowClient;

/// Run the ETL pipeline on a fixed interval, forever.
///
/// Runs are awaited in sequence, so a slow run never overlaps the next
/// one; ticks that fire while a run is still in flight are skipped
/// rather than queued.
#[instrument(skip(client, location_repo, reading_repo, options))]
pub async fn start_pipeline_scheduler(
    client: TomorrowClient,
    location_repo: LocationRepository,
    reading_repo: ReadingRepository,
    options: PipelineOptions,
    interval_minutes: u64,
) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Pipeline scheduler started with {} minute interval",
        interval_minutes
    );

    loop {
        interval.tick().await;
        debug!("Scheduler tick, starting pipeline run");

        let outcome = etl::run_pipeline(&client, &location_repo, &reading_repo, &options).await;

        if outcome.success() {
            info!(
                readings_upserted = outcome.readings_upserted,
                "Scheduled run completed"
            );
        } else {
            warn!(
                locations_failed = outcome.locations_failed,
                errors = ?outcome.errors,
                "Scheduled run completed with failures"
            );
        }
    }
}
