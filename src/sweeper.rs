use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::Engine;

/// How often the compactor checks the WAL growth.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background retention sweep: archives old cancelled/deleted rows.
pub async fn run_sweeper(engine: Arc<Engine>, archive_after_days: u32, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        sweep_once(&engine, archive_after_days).await;
    }
}

/// One sweep. Failures are logged; the next tick tries again.
pub async fn sweep_once(engine: &Engine, archive_after_days: u32) -> usize {
    match engine.archive_stale(archive_after_days).await {
        Ok(0) => 0,
        Ok(n) => {
            info!("retention sweep archived {n} appointments");
            n
        }
        Err(e) if e.is_retryable() => {
            debug!("retention sweep skipped: {e}");
            0
        }
        Err(e) => {
            error!("retention sweep failed: {e}");
            0
        }
    }
}

/// Background WAL compaction once `threshold` appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, NaiveTime};

    use crate::calendar::ManualClock;
    use crate::engine::EngineSettings;
    use crate::model::*;

    fn test_wal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("slotwise_test_sweeper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn engine_at(name: &str, clock: &Arc<ManualClock>) -> Engine {
        Engine::new(test_wal_path(name), EngineSettings::default(), clock.clone()).unwrap()
    }

    async fn book(engine: &Engine, date: NaiveDate, hour: u32) -> AppointmentId {
        engine
            .insert(NewAppointment {
                client_name: "Anna".into(),
                client_ref: Some("1".into()),
                phone: None,
                date,
                time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                service: "Haircut".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sweep_archives_only_old_retired_rows() {
        let clock = Arc::new(ManualClock::new(june(1).and_hms_opt(8, 0, 0).unwrap()));
        let engine = engine_at("sweep.wal", &clock);

        let old_deleted = book(&engine, june(1), 10).await;
        let old_active = book(&engine, june(1), 11).await;
        let recent_deleted = book(&engine, june(20), 10).await;
        engine.set_status(old_deleted, Status::Deleted).await.unwrap();
        engine.set_status(recent_deleted, Status::Deleted).await.unwrap();

        clock.set(june(25).and_hms_opt(8, 0, 0).unwrap());
        assert_eq!(sweep_once(&engine, 7).await, 1);
        assert_eq!(sweep_once(&engine, 7).await, 0);

        assert_eq!(engine.find_by_id(old_deleted).await.unwrap().status, Status::Archived);
        assert_eq!(engine.find_by_id(old_active).await.unwrap().status, Status::Active);
        assert_eq!(engine.find_by_id(recent_deleted).await.unwrap().status, Status::Deleted);
    }

    #[tokio::test]
    async fn compaction_waits_for_threshold() {
        let clock = Arc::new(ManualClock::new(june(1).and_hms_opt(8, 0, 0).unwrap()));
        let engine = engine_at("compact_threshold.wal", &clock);

        for hour in 9..12 {
            book(&engine, june(2), hour).await;
        }
        assert!(!compact_if_needed(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        assert!(compact_if_needed(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(engine.list_for_date(june(2)).await.unwrap().len(), 3);
    }
}
