use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, SweepAction};
use crate::observability;

/// Background task that applies time-based transitions: unclaimed slots
/// whose start has passed become EXPIRED, confirmed bookings whose slot has
/// ended become COMPLETED.
pub async fn run_sweeper(engine: Arc<Engine>, sweep_interval: Duration) {
    let mut interval = tokio::time::interval(sweep_interval);
    loop {
        interval.tick().await;
        let at = chrono::Utc::now();
        for action in engine.collect_due_transitions(at) {
            let result = match action {
                SweepAction::ExpireSlot {
                    interviewer_id,
                    slot_id,
                } => engine.expire_slot(interviewer_id, slot_id, at).await,
                SweepAction::CompleteBooking {
                    interviewer_id,
                    booking_id,
                } => engine.complete_booking(interviewer_id, booking_id, at).await,
            };
            match result {
                Ok(true) => {
                    let kind = match action {
                        SweepAction::ExpireSlot { .. } => "expire_slot",
                        SweepAction::CompleteBooking { .. } => "complete_booking",
                    };
                    metrics::counter!(observability::SWEEP_TRANSITIONS_TOTAL, "kind" => kind)
                        .increment(1);
                }
                // The transition was overtaken between scan and apply (e.g.
                // the slot got booked) — the next sweep sees current state.
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("sweep skip {action:?}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotd_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn weekday_entry() -> WeeklyAvailability {
        WeeklyAvailability {
            day_of_week: DayOfWeek::Monday,
            start_time: "09:00".parse().unwrap(),
            end_time: "11:00".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn sweep_expires_unclaimed_past_slots() {
        let path = test_wal_path("sweep_expire.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let interviewer = engine
            .create_interviewer(
                "Sam Field".into(),
                "sam@example.com".into(),
                10,
                60,
                vec![weekday_entry()],
            )
            .await
            .unwrap();

        // Generate into a week that is already over.
        let past = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        let slots = engine
            .generate_slots_at(interviewer.id, 1, past)
            .await
            .unwrap();
        assert_eq!(slots.len(), 2);

        let later = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        let actions = engine.collect_due_transitions(later);
        assert_eq!(actions.len(), 2);

        for action in &actions {
            let SweepAction::ExpireSlot {
                interviewer_id,
                slot_id,
            } = *action
            else {
                panic!("expected ExpireSlot, got {action:?}");
            };
            assert!(engine.expire_slot(interviewer_id, slot_id, later).await.unwrap());
        }

        // Applying again is a no-op, and the next scan finds nothing.
        let SweepAction::ExpireSlot {
            interviewer_id,
            slot_id,
        } = actions[0]
        else {
            unreachable!()
        };
        assert!(!engine.expire_slot(interviewer_id, slot_id, later).await.unwrap());
        assert!(engine.collect_due_transitions(later).is_empty());
    }

    #[tokio::test]
    async fn sweep_completes_confirmed_bookings_after_slot_end() {
        let path = test_wal_path("sweep_complete.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let interviewer = engine
            .create_interviewer(
                "Ada Moss".into(),
                "ada@example.com".into(),
                10,
                60,
                vec![weekday_entry()],
            )
            .await
            .unwrap();
        let candidate = engine
            .create_candidate("Lee Chu".into(), "lee@example.com".into(), None)
            .await
            .unwrap();

        // Monday 2024-06-03 early morning: the 09:00 slot is still ahead.
        let before = Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
        let slots = engine
            .generate_slots_at(interviewer.id, 1, before)
            .await
            .unwrap();
        // Slots are Monday 2024-06-03 09:00 and 10:00; book the first one
        // while it is still in the future.
        let booking = engine
            .book_slot_at(slots[0].id, candidate.id, None, before)
            .await
            .unwrap();
        engine.confirm_booking(booking.id).await.unwrap();

        let after_end = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let actions = engine.collect_due_transitions(after_end);
        // The second, unbooked slot expires; the confirmed booking completes.
        assert!(actions.contains(&SweepAction::CompleteBooking {
            interviewer_id: interviewer.id,
            booking_id: booking.id,
        }));
        assert!(
            engine
                .complete_booking(interviewer.id, booking.id, after_end)
                .await
                .unwrap()
        );

        let view = engine.get_booking(&booking.id).await.unwrap();
        assert_eq!(view.status, BookingStatus::Completed);
        // Completion is terminal — a second apply is a no-op.
        assert!(
            !engine
                .complete_booking(interviewer.id, booking.id, after_end)
                .await
                .unwrap()
        );
    }
}
