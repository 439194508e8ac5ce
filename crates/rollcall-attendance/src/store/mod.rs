//! Storage capabilities consumed by the verification pipeline.
//!
//! Three seams: the attendance store (durable records keyed by
//! (student, session) with atomic upsert), the identity directory
//! (principal id → role and enrollment/teaching sets), and the face
//! gallery (encrypted stored embeddings per model). [`SqliteStore`]
//! implements all three over one database.

mod crypto;
mod sqlite;

pub use crypto::EmbeddingCipher;
pub use sqlite::SqliteStore;

use crate::model::{AttendanceRecord, AttendanceStatus, IdentityProfile, Session};
use chrono::{DateTime, Utc};
use rollcall_core::{Embedding, EnrolledFace};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("embedding cipher error: {0}")]
    Crypto(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Durable attendance records, unique per (student, session).
pub trait AttendanceStore: Send + Sync {
    fn session(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Session>, StoreError>> + Send;

    fn attendance(
        &self,
        student_id: i64,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<AttendanceRecord>, StoreError>> + Send;

    /// Atomic create-or-update for a successful check-in. Re-invocation
    /// replaces status, check-in time, and lateness (last-writer-wins),
    /// never appends a second row.
    fn upsert_check_in(
        &self,
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        check_in_time: DateTime<Utc>,
        late_minutes: i64,
    ) -> impl std::future::Future<Output = Result<AttendanceRecord, StoreError>> + Send;

    /// Manual override: sets status and lateness directly. Creates the
    /// record with a NULL check-in time when absent; preserves the
    /// existing check-in time when present.
    fn upsert_manual_status(
        &self,
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        late_minutes: i64,
    ) -> impl std::future::Future<Output = Result<AttendanceRecord, StoreError>> + Send;
}

/// Principal resolution: id → role, enrollments, teaching assignments.
pub trait IdentityDirectory: Send + Sync {
    fn resolve(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<Option<IdentityProfile>, StoreError>> + Send;
}

/// Stored face embeddings, encrypted at rest.
pub trait FaceGallery: Send + Sync {
    /// All enrolled embeddings for a model, decrypted, ordered by
    /// ascending identity id (the matcher's documented tie-break order).
    fn gallery(
        &self,
        model: &str,
    ) -> impl std::future::Future<Output = Result<Vec<EnrolledFace>, StoreError>> + Send;

    fn add_embedding(
        &self,
        identity_id: i64,
        model: &str,
        embedding: &Embedding,
        confidence: f32,
        device_id: &str,
    ) -> impl std::future::Future<Output = Result<Uuid, StoreError>> + Send;

    fn embedding_count(
        &self,
        identity_id: i64,
    ) -> impl std::future::Future<Output = Result<u32, StoreError>> + Send;
}
