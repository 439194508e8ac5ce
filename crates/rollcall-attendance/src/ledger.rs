//! Attendance state machine.
//!
//! States are `absent` (implicit, no record), `present`, and `late`.
//! The automatic path derives status and lateness from the check-in
//! time; the manual path is authoritative and bypasses derivation. No
//! state is terminal — either path may update a record indefinitely.

use chrono::{DateTime, Utc};

use crate::model::{AttendanceRecord, AttendanceStatus, Session};
use crate::store::{AttendanceStore, StoreError};

/// Derive (status, late_minutes) from a check-in time.
///
/// On time iff `check_in <= start`. Lateness is whole minutes, rounded
/// up: a student 30 seconds late is one minute late, never present.
pub fn derive_status(
    check_in: DateTime<Utc>,
    start: DateTime<Utc>,
) -> (AttendanceStatus, i64) {
    if check_in <= start {
        return (AttendanceStatus::Present, 0);
    }
    let late_secs = (check_in - start).num_seconds();
    let late_minutes = (late_secs + 59) / 60;
    (AttendanceStatus::Late, late_minutes)
}

/// Drives attendance transitions against a store.
pub struct AttendanceLedger<S> {
    store: S,
}

impl<S: AttendanceStore> AttendanceLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Automatic transition on a successful authorized verification.
    ///
    /// Idempotent upsert: repeating the same check-in yields the same
    /// record; a later check-in replaces status and lateness
    /// (last-check-in-wins), never a second row.
    pub async fn record_check_in(
        &self,
        student_id: i64,
        session: &Session,
        check_in_time: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let (status, late_minutes) = derive_status(check_in_time, session.start_time);
        tracing::debug!(
            student_id,
            session_id = session.id,
            status = status.as_str(),
            late_minutes,
            "recording check-in"
        );
        self.store
            .upsert_check_in(student_id, session.id, status, check_in_time, late_minutes)
            .await
    }

    /// Manual override. The status/lateness pair is taken as-is — human
    /// override authority, not derived from any timestamp. Role
    /// restriction (admin/teacher) is the caller's responsibility.
    pub async fn set_status(
        &self,
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        late_minutes: i64,
    ) -> Result<AttendanceRecord, StoreError> {
        tracing::info!(
            student_id,
            session_id,
            status = status.as_str(),
            late_minutes,
            "manual attendance override"
        );
        self.store
            .upsert_manual_status(student_id, session_id, status, late_minutes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EmbeddingCipher, SqliteStore};
    use crate::Role;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_on_time_exactly_at_start() {
        let (status, late) = derive_status(start(), start());
        assert_eq!(status, AttendanceStatus::Present);
        assert_eq!(late, 0);
    }

    #[test]
    fn test_early_check_in_is_present() {
        let (status, late) = derive_status(start() - Duration::minutes(20), start());
        assert_eq!(status, AttendanceStatus::Present);
        assert_eq!(late, 0);
    }

    #[test]
    fn test_lateness_rounds_up() {
        // 09:05:30 against 09:00:00 → 6 minutes late.
        let (status, late) = derive_status(start() + Duration::seconds(330), start());
        assert_eq!(status, AttendanceStatus::Late);
        assert_eq!(late, 6);
    }

    #[test]
    fn test_thirty_seconds_late_is_one_minute() {
        let (status, late) = derive_status(start() + Duration::seconds(30), start());
        assert_eq!(status, AttendanceStatus::Late);
        assert_eq!(late, 1);
    }

    #[test]
    fn test_exact_minute_does_not_overround() {
        let (_, late) = derive_status(start() + Duration::minutes(5), start());
        assert_eq!(late, 5);
    }

    async fn ledger_fixture() -> (AttendanceLedger<SqliteStore>, SqliteStore, Session) {
        let store = SqliteStore::open_in_memory(EmbeddingCipher::from_key_material(b"k"))
            .await
            .unwrap();
        store
            .insert_identity(1, "alice", "Alice", Role::Student)
            .await
            .unwrap();
        store
            .insert_session(500, 42, start(), start() + Duration::hours(1))
            .await
            .unwrap();
        let session = Session {
            id: 500,
            class_id: 42,
            start_time: start(),
            end_time: start() + Duration::hours(1),
        };
        (AttendanceLedger::new(store.clone()), store, session)
    }

    #[tokio::test]
    async fn test_check_in_is_idempotent() {
        let (ledger, store, session) = ledger_fixture().await;
        let t = start() + Duration::seconds(330);

        let first = ledger.record_check_in(1, &session, t).await.unwrap();
        let second = ledger.record_check_in(1, &session, t).await.unwrap();
        assert_eq!(first, second);

        let stored = store.attendance(1, 500).await.unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn test_later_check_in_wins() {
        let (ledger, store, session) = ledger_fixture().await;

        ledger
            .record_check_in(1, &session, start() - Duration::minutes(1))
            .await
            .unwrap();
        ledger
            .record_check_in(1, &session, start() + Duration::seconds(330))
            .await
            .unwrap();

        let record = store.attendance(1, 500).await.unwrap().unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.late_minutes, 6);
    }

    #[tokio::test]
    async fn test_override_bypasses_derivation() {
        let (ledger, _, session) = ledger_fixture().await;

        // A check-in at the start would derive present/0; the override
        // says late/45 and is authoritative.
        ledger
            .record_check_in(1, &session, start())
            .await
            .unwrap();
        let record = ledger
            .set_status(1, 500, AttendanceStatus::Late, 45)
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.late_minutes, 45);
        // Existing check-in time survives the override.
        assert_eq!(record.check_in_time, Some(start()));
    }

    #[tokio::test]
    async fn test_override_creates_record_without_check_in_time() {
        let (ledger, _, _) = ledger_fixture().await;
        let record = ledger
            .set_status(1, 500, AttendanceStatus::Present, 0)
            .await
            .unwrap();
        assert_eq!(record.check_in_time, None);
        assert_eq!(record.status, AttendanceStatus::Present);
    }
}
