mod common;

use chrono::{DateTime, TimeZone, Utc};
use serial_test::serial;
use weather_pipeline::db::{Granularity, NewReading, ReadingRepository};

fn hourly_reading(location_id: i32, ts: DateTime<Utc>, temperature: f64) -> NewReading {
    let mut reading = NewReading::empty(location_id, ts, Granularity::Hourly);
    reading.temperature = Some(temperature);
    reading.wind_speed = Some(5.0);
    reading.humidity = Some(60.0);
    reading
}

fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

#[tokio::test]
#[serial]
async fn upsert_replaces_values_at_the_same_key() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.00, 10.00, "replace").await;
    let repo = ReadingRepository::new(pool.clone());

    let first = repo
        .upsert_batch(&[hourly_reading(location_id, ts(0), 20.0)])
        .await
        .unwrap();
    assert_eq!(first.upserted, 1);
    assert!(first.skipped.is_empty());

    let second = repo
        .upsert_batch(&[hourly_reading(location_id, ts(0), 21.0)])
        .await
        .unwrap();
    assert_eq!(second.upserted, 1);

    // Exactly one row remains, with the replacement value
    assert_eq!(common::count_readings(&pool, location_id).await, 1);
    let latest = repo.latest_reading(location_id).await.unwrap().unwrap();
    assert_eq!(latest.temperature, Some(21.0));

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn upserting_the_same_batch_twice_is_idempotent() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.01, 10.01, "idempotence").await;
    let repo = ReadingRepository::new(pool.clone());

    let batch: Vec<NewReading> = (0..5)
        .map(|h| hourly_reading(location_id, ts(h), 15.0 + h as f64))
        .collect();

    repo.upsert_batch(&batch).await.unwrap();
    let rows_before = repo
        .time_series(location_id, Granularity::Hourly, ts(0), ts(4))
        .await
        .unwrap();

    repo.upsert_batch(&batch).await.unwrap();
    let rows_after = repo
        .time_series(location_id, Granularity::Hourly, ts(0), ts(4))
        .await
        .unwrap();

    assert_eq!(rows_before.len(), 5);
    assert_eq!(rows_after.len(), 5);
    for (before, after) in rows_before.iter().zip(&rows_after) {
        assert_eq!(before.timestamp, after.timestamp);
        assert_eq!(before.temperature, after.temperature);
        assert_eq!(before.wind_speed, after.wind_speed);
        // Only the ingestion timestamp advances
        assert!(after.fetched_at >= before.fetched_at);
    }

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn unknown_location_skips_that_row_and_lands_the_rest() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.02, 10.02, "partial").await;
    let repo = ReadingRepository::new(pool.clone());

    let missing_location = -42;
    let batch = vec![
        hourly_reading(location_id, ts(0), 18.0),
        hourly_reading(missing_location, ts(0), 19.0),
        hourly_reading(location_id, ts(1), 20.0),
    ];

    let outcome = repo.upsert_batch(&batch).await.unwrap();
    assert_eq!(outcome.upserted, 2);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].location_id, missing_location);
    assert_eq!(outcome.skipped[0].timestamp, ts(0));
    assert_eq!(outcome.skipped[0].data_granularity, Granularity::Hourly);

    assert_eq!(common::count_readings(&pool, location_id).await, 2);
    assert_eq!(common::count_readings(&pool, missing_location).await, 0);

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn duplicate_keys_within_one_batch_collapse_to_the_last_write() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.03, 10.03, "dup-batch").await;
    let repo = ReadingRepository::new(pool.clone());

    let batch = vec![
        hourly_reading(location_id, ts(0), 10.0),
        hourly_reading(location_id, ts(0), 11.0),
    ];

    let outcome = repo.upsert_batch(&batch).await.unwrap();
    assert_eq!(outcome.upserted, 1);
    assert!(outcome.skipped.is_empty());

    let latest = repo.latest_reading(location_id).await.unwrap().unwrap();
    assert_eq!(latest.temperature, Some(11.0));

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn nanosecond_timestamps_do_not_report_false_skips() {
    use chrono::Timelike;

    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.11, 10.11, "nanos").await;
    let repo = ReadingRepository::new(pool.clone());

    // Postgres stores microseconds; a sub-microsecond timestamp must not
    // land in the table while also being reported as skipped.
    let precise = ts(0).with_nanosecond(123_456_789).unwrap();
    let outcome = repo
        .upsert_batch(&[hourly_reading(location_id, precise, 20.0)])
        .await
        .unwrap();
    assert_eq!(outcome.upserted, 1);
    assert!(outcome.skipped.is_empty(), "skipped: {:?}", outcome.skipped);

    let latest = repo.latest_reading(location_id).await.unwrap().unwrap();
    assert_eq!(latest.timestamp, ts(0).with_nanosecond(123_456_000).unwrap());

    // A replay differing only below the microsecond hits the same row
    let replay = ts(0).with_nanosecond(123_456_999).unwrap();
    let outcome = repo
        .upsert_batch(&[hourly_reading(location_id, replay, 21.0)])
        .await
        .unwrap();
    assert_eq!(outcome.upserted, 1);
    assert!(outcome.skipped.is_empty());
    assert_eq!(common::count_readings(&pool, location_id).await, 1);

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn empty_batch_is_a_no_op() {
    let pool = common::test_pool().await;
    let repo = ReadingRepository::new(pool.clone());

    let outcome = repo.upsert_batch(&[]).await.unwrap();
    assert_eq!(outcome.upserted, 0);
    assert!(outcome.skipped.is_empty());
}

#[tokio::test]
#[serial]
async fn time_series_bounds_are_inclusive_and_ascending() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.04, 10.04, "range").await;
    let repo = ReadingRepository::new(pool.clone());

    let batch: Vec<NewReading> = (0..6)
        .map(|h| hourly_reading(location_id, ts(h), h as f64))
        .collect();
    repo.upsert_batch(&batch).await.unwrap();

    let rows = repo
        .time_series(location_id, Granularity::Hourly, ts(1), ts(4))
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.first().unwrap().timestamp, ts(1));
    assert_eq!(rows.last().unwrap().timestamp, ts(4));
    assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    // Point query: start == end matches the exact-timestamp row
    let point = repo
        .time_series(location_id, Granularity::Hourly, ts(2), ts(2))
        .await
        .unwrap();
    assert_eq!(point.len(), 1);
    assert_eq!(point[0].temperature, Some(2.0));

    // A window with no data is empty, not an error
    let empty = repo
        .time_series(location_id, Granularity::Hourly, ts(7), ts(9))
        .await
        .unwrap();
    assert!(empty.is_empty());

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn time_series_filters_by_granularity() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.05, 10.05, "granularity").await;
    let repo = ReadingRepository::new(pool.clone());

    let mut daily = NewReading::empty(location_id, ts(0), Granularity::Daily);
    daily.temperature = Some(12.0);
    let batch = vec![hourly_reading(location_id, ts(0), 20.0), daily];
    repo.upsert_batch(&batch).await.unwrap();

    let hourly_rows = repo
        .time_series(location_id, Granularity::Hourly, ts(0), ts(0))
        .await
        .unwrap();
    assert_eq!(hourly_rows.len(), 1);
    assert_eq!(hourly_rows[0].data_granularity, Granularity::Hourly);

    let minutely_rows = repo
        .time_series(location_id, Granularity::Minutely, ts(0), ts(0))
        .await
        .unwrap();
    assert!(minutely_rows.is_empty());

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn latest_reading_spans_granularities_and_prefers_the_finest_on_ties() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.06, 10.06, "latest").await;
    let repo = ReadingRepository::new(pool.clone());

    let batch = vec![
        hourly_reading(location_id, ts(3), 20.0),
        NewReading::empty(location_id, ts(5), Granularity::Daily),
    ];
    repo.upsert_batch(&batch).await.unwrap();

    // The daily row has the later timestamp and wins
    let latest = repo.latest_reading(location_id).await.unwrap().unwrap();
    assert_eq!(latest.timestamp, ts(5));
    assert_eq!(latest.data_granularity, Granularity::Daily);

    // An hourly row at the same maximum timestamp takes precedence
    repo.upsert_batch(&[hourly_reading(location_id, ts(5), 22.0)])
        .await
        .unwrap();
    let latest = repo.latest_reading(location_id).await.unwrap().unwrap();
    assert_eq!(latest.timestamp, ts(5));
    assert_eq!(latest.data_granularity, Granularity::Hourly);

    // Minutely is finer still
    repo.upsert_batch(&[NewReading::empty(location_id, ts(5), Granularity::Minutely)])
        .await
        .unwrap();
    let latest = repo.latest_reading(location_id).await.unwrap().unwrap();
    assert_eq!(latest.data_granularity, Granularity::Minutely);

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn latest_reading_for_an_empty_location_is_none() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.07, 10.07, "empty").await;
    let repo = ReadingRepository::new(pool.clone());

    assert!(repo.latest_reading(location_id).await.unwrap().is_none());

    common::remove_test_location(&pool, location_id).await;
}

#[tokio::test]
#[serial]
async fn latest_by_location_reports_active_locations_only() {
    let pool = common::test_pool().await;
    let active_id = common::insert_test_location(&pool, 10.08, 10.08, "summary-active").await;
    let inactive_id = common::insert_test_location(&pool, 10.09, 10.09, "summary-inactive").await;
    let repo = ReadingRepository::new(pool.clone());

    let batch = vec![
        hourly_reading(active_id, ts(0), 20.0),
        hourly_reading(active_id, ts(1), 21.0),
        hourly_reading(inactive_id, ts(1), 30.0),
    ];
    repo.upsert_batch(&batch).await.unwrap();

    sqlx::query("UPDATE locations SET is_active = FALSE WHERE id = $1")
        .bind(inactive_id)
        .execute(&pool)
        .await
        .unwrap();

    let summaries = repo.latest_by_location(Granularity::Hourly).await.unwrap();
    let active = summaries
        .iter()
        .find(|s| s.location_id == active_id)
        .expect("active location should be summarized");
    assert_eq!(active.timestamp, ts(1));
    assert_eq!(active.temperature, Some(21.0));
    assert!(!summaries.iter().any(|s| s.location_id == inactive_id));

    common::remove_test_location(&pool, active_id).await;
    common::remove_test_location(&pool, inactive_id).await;
}

#[tokio::test]
#[serial]
async fn data_availability_reports_the_covered_range() {
    let pool = common::test_pool().await;
    let location_id = common::insert_test_location(&pool, 10.10, 10.10, "availability").await;
    let repo = ReadingRepository::new(pool.clone());

    assert!(repo
        .data_availability(location_id, Granularity::Hourly)
        .await
        .unwrap()
        .is_none());

    let batch: Vec<NewReading> = (2..5)
        .map(|h| hourly_reading(location_id, ts(h), h as f64))
        .collect();
    repo.upsert_batch(&batch).await.unwrap();

    let (earliest, latest) = repo
        .data_availability(location_id, Granularity::Hourly)
        .await
        .unwrap()
        .expect("range should exist");
    assert_eq!(earliest, ts(2));
    assert_eq!(latest, ts(4));

    common::remove_test_location(&pool, location_id).await;
}
