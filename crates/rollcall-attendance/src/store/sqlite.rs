//! SQLite-backed store.
//!
//! One database serves all three capabilities: attendance records,
//! identity directory, and the encrypted face gallery. Writes go through
//! `INSERT .. ON CONFLICT DO UPDATE` on the (student_id, session_id)
//! uniqueness constraint, so concurrent check-ins for the same pair
//! serialize to a single row.

use chrono::{DateTime, Utc};
use rollcall_core::{Embedding, EnrolledFace};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::{AttendanceStore, EmbeddingCipher, FaceGallery, IdentityDirectory, StoreError};
use crate::model::{AttendanceRecord, AttendanceStatus, IdentityProfile, Role, Session};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE identities (
    id          INTEGER PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    full_name   TEXT NOT NULL,
    role        TEXT NOT NULL CHECK (role IN ('student', 'teacher', 'admin'))
);

CREATE TABLE enrollments (
    identity_id INTEGER NOT NULL REFERENCES identities(id),
    class_id    INTEGER NOT NULL,
    PRIMARY KEY (identity_id, class_id)
);

CREATE TABLE teaching (
    identity_id INTEGER NOT NULL REFERENCES identities(id),
    class_id    INTEGER NOT NULL,
    PRIMARY KEY (identity_id, class_id)
);

CREATE TABLE class_sessions (
    id          INTEGER PRIMARY KEY,
    class_id    INTEGER NOT NULL,
    start_time  TEXT NOT NULL,
    end_time    TEXT NOT NULL
);

CREATE TABLE attendance (
    student_id    INTEGER NOT NULL REFERENCES identities(id),
    session_id    INTEGER NOT NULL REFERENCES class_sessions(id),
    status        TEXT NOT NULL CHECK (status IN ('present', 'late')),
    check_in_time TEXT,
    late_minutes  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (student_id, session_id)
);

CREATE TABLE face_embeddings (
    id            TEXT PRIMARY KEY,
    identity_id   INTEGER NOT NULL REFERENCES identities(id),
    model         TEXT NOT NULL,
    vector        BLOB NOT NULL,
    model_version TEXT,
    confidence    REAL NOT NULL,
    device_id     TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX idx_face_embeddings_model ON face_embeddings(model, identity_id);
";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
    cipher: Arc<EmbeddingCipher>,
}

impl SqliteStore {
    pub async fn open(path: &Path, cipher: EmbeddingCipher) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Corrupt(format!("create data dir: {e}")))?;
        }
        let conn = Connection::open(path).await?;
        let store = Self {
            conn,
            cipher: Arc::new(cipher),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, used by tests and diagnostics.
    pub async fn open_in_memory(cipher: EmbeddingCipher) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self {
            conn,
            cipher: Arc::new(cipher),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply pending migrations, gated on the `user_version` pragma.
    async fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                let mut version: i32 =
                    conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

                if version >= CURRENT_SCHEMA_VERSION {
                    return Ok(());
                }

                let tx = conn.transaction()?;
                while version < CURRENT_SCHEMA_VERSION {
                    let next = version + 1;
                    match next {
                        1 => tx.execute_batch(SCHEMA_V1)?,
                        _ => unreachable!("unknown schema version {next}"),
                    }
                    version = next;
                }
                tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // --- administrative write paths (enrollment management is outside
    // the verification pipeline, but the store must be populatable) ---

    pub async fn insert_identity(
        &self,
        id: i64,
        username: &str,
        full_name: &str,
        role: Role,
    ) -> Result<(), StoreError> {
        let username = username.to_string();
        let full_name = full_name.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities (id, username, full_name, role) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, username, full_name, role.as_str()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn enroll(&self, identity_id: i64, class_id: i64) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO enrollments (identity_id, class_id) VALUES (?1, ?2)",
                    rusqlite::params![identity_id, class_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn assign_teacher(&self, identity_id: i64, class_id: i64) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO teaching (identity_id, class_id) VALUES (?1, ?2)",
                    rusqlite::params![identity_id, class_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn insert_session(
        &self,
        id: i64,
        class_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO class_sessions (id, class_id, start_time, end_time) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, class_id, start_time.to_rfc3339(), end_time.to_rfc3339()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn parse_status(s: &str) -> Result<AttendanceStatus, StoreError> {
    AttendanceStatus::parse(s).ok_or_else(|| StoreError::Corrupt(format!("bad status {s:?}")))
}

/// Raw attendance row before timestamp/status parsing.
type AttendanceRow = (i64, i64, String, Option<String>, i64);

fn into_record(row: AttendanceRow) -> Result<AttendanceRecord, StoreError> {
    let (student_id, session_id, status, check_in_time, late_minutes) = row;
    Ok(AttendanceRecord {
        student_id,
        session_id,
        status: parse_status(&status)?,
        check_in_time: check_in_time.as_deref().map(parse_ts).transpose()?,
        late_minutes,
    })
}

impl AttendanceStore for SqliteStore {
    async fn session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let row: Option<(i64, i64, String, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, class_id, start_time, end_time FROM class_sessions WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.next().transpose().map_err(Into::into)
            })
            .await?;

        row.map(|(id, class_id, start, end)| {
            Ok(Session {
                id,
                class_id,
                start_time: parse_ts(&start)?,
                end_time: parse_ts(&end)?,
            })
        })
        .transpose()
    }

    async fn attendance(
        &self,
        student_id: i64,
        session_id: i64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let row: Option<AttendanceRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT student_id, session_id, status, check_in_time, late_minutes
                     FROM attendance WHERE student_id = ?1 AND session_id = ?2",
                )?;
                let mut rows = stmt.query_map([student_id, session_id], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })?;
                rows.next().transpose().map_err(Into::into)
            })
            .await?;

        row.map(into_record).transpose()
    }

    async fn upsert_check_in(
        &self,
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        check_in_time: DateTime<Utc>,
        late_minutes: i64,
    ) -> Result<AttendanceRecord, StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (student_id, session_id, status, check_in_time, late_minutes)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(student_id, session_id) DO UPDATE SET
                         status = excluded.status,
                         check_in_time = excluded.check_in_time,
                         late_minutes = excluded.late_minutes",
                    rusqlite::params![
                        student_id,
                        session_id,
                        status.as_str(),
                        check_in_time.to_rfc3339(),
                        late_minutes
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(AttendanceRecord {
            student_id,
            session_id,
            status,
            check_in_time: Some(check_in_time),
            late_minutes,
        })
    }

    async fn upsert_manual_status(
        &self,
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        late_minutes: i64,
    ) -> Result<AttendanceRecord, StoreError> {
        // check_in_time is absent from the SET list: preserved on update,
        // NULL on fresh create.
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (student_id, session_id, status, check_in_time, late_minutes)
                     VALUES (?1, ?2, ?3, NULL, ?4)
                     ON CONFLICT(student_id, session_id) DO UPDATE SET
                         status = excluded.status,
                         late_minutes = excluded.late_minutes",
                    rusqlite::params![student_id, session_id, status.as_str(), late_minutes],
                )?;
                Ok(())
            })
            .await?;

        self.attendance(student_id, session_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt("upserted attendance row vanished".into()))
    }
}

impl IdentityDirectory for SqliteStore {
    async fn resolve(&self, id: i64) -> Result<Option<IdentityProfile>, StoreError> {
        let row: Option<(String, String, String, Vec<i64>, Vec<i64>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT username, full_name, role FROM identities WHERE id = ?1")?;
                let mut rows = stmt.query_map([id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                let Some(identity) = rows.next().transpose()? else {
                    return Ok(None);
                };
                let (username, full_name, role): (String, String, String) = identity;

                let mut stmt =
                    conn.prepare("SELECT class_id FROM enrollments WHERE identity_id = ?1")?;
                let enrolled = stmt
                    .query_map([id], |row| row.get(0))?
                    .collect::<Result<Vec<i64>, _>>()?;

                let mut stmt =
                    conn.prepare("SELECT class_id FROM teaching WHERE identity_id = ?1")?;
                let teaching = stmt
                    .query_map([id], |row| row.get(0))?
                    .collect::<Result<Vec<i64>, _>>()?;

                Ok(Some((username, full_name, role, enrolled, teaching)))
            })
            .await?;

        row.map(|(username, full_name, role, enrolled, teaching)| {
            let role = Role::parse(&role)
                .ok_or_else(|| StoreError::Corrupt(format!("bad role {role:?}")))?;
            Ok(IdentityProfile {
                id,
                username,
                full_name,
                role,
                enrolled_classes: enrolled.into_iter().collect::<BTreeSet<_>>(),
                teaching_classes: teaching.into_iter().collect::<BTreeSet<_>>(),
            })
        })
        .transpose()
    }
}

impl FaceGallery for SqliteStore {
    async fn gallery(&self, model: &str) -> Result<Vec<EnrolledFace>, StoreError> {
        let model = model.to_string();
        let rows: Vec<(i64, Vec<u8>, Option<String>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT identity_id, vector, model_version FROM face_embeddings
                     WHERE model = ?1 ORDER BY identity_id ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map([model], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut gallery = Vec::with_capacity(rows.len());
        for (identity_id, blob, model_version) in rows {
            let embedding = self.cipher.decrypt(&blob, model_version)?;
            gallery.push(EnrolledFace {
                identity_id,
                embedding,
            });
        }
        Ok(gallery)
    }

    async fn add_embedding(
        &self,
        identity_id: i64,
        model: &str,
        embedding: &Embedding,
        confidence: f32,
        device_id: &str,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let blob = self.cipher.encrypt(embedding)?;
        let model = model.to_string();
        let model_version = embedding.model_version.clone();
        let device_id = device_id.to_string();
        let created_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO face_embeddings
                         (id, identity_id, model, vector, model_version, confidence, device_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        id.to_string(),
                        identity_id,
                        model,
                        blob,
                        model_version,
                        confidence,
                        device_id,
                        created_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(id)
    }

    async fn embedding_count(&self, identity_id: i64) -> Result<u32, StoreError> {
        let count: u32 = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM face_embeddings WHERE identity_id = ?1",
                    [identity_id],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn store() -> SqliteStore {
        let cipher = EmbeddingCipher::from_key_material(b"test key");
        SqliteStore::open_in_memory(cipher).await.unwrap()
    }

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding {
            values,
            model_version: Some("v1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_check_in_upsert_keeps_single_row() {
        let s = store().await;
        s.insert_identity(1, "alice", "Alice", Role::Student)
            .await
            .unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        s.insert_session(500, 42, start, start + chrono::Duration::hours(1))
            .await
            .unwrap();

        let t1 = start + chrono::Duration::minutes(1);
        let t2 = start + chrono::Duration::minutes(10);
        s.upsert_check_in(1, 500, AttendanceStatus::Late, t1, 1)
            .await
            .unwrap();
        s.upsert_check_in(1, 500, AttendanceStatus::Late, t2, 10)
            .await
            .unwrap();

        let record = s.attendance(1, 500).await.unwrap().unwrap();
        assert_eq!(record.check_in_time, Some(t2));
        assert_eq!(record.late_minutes, 10);
    }

    #[tokio::test]
    async fn test_manual_upsert_preserves_check_in_time() {
        let s = store().await;
        s.insert_identity(1, "alice", "Alice", Role::Student)
            .await
            .unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        s.insert_session(500, 42, start, start + chrono::Duration::hours(1))
            .await
            .unwrap();

        s.upsert_check_in(1, 500, AttendanceStatus::Present, start, 0)
            .await
            .unwrap();
        let record = s
            .upsert_manual_status(1, 500, AttendanceStatus::Late, 15)
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.late_minutes, 15);
        assert_eq!(record.check_in_time, Some(start));
    }

    #[tokio::test]
    async fn test_manual_upsert_fresh_has_null_check_in() {
        let s = store().await;
        s.insert_identity(1, "alice", "Alice", Role::Student)
            .await
            .unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        s.insert_session(500, 42, start, start + chrono::Duration::hours(1))
            .await
            .unwrap();

        let record = s
            .upsert_manual_status(1, 500, AttendanceStatus::Present, 0)
            .await
            .unwrap();
        assert_eq!(record.check_in_time, None);
    }

    #[tokio::test]
    async fn test_directory_resolves_role_and_classes() {
        let s = store().await;
        s.insert_identity(7, "tina", "Tina Teacher", Role::Teacher)
            .await
            .unwrap();
        s.assign_teacher(7, 42).await.unwrap();
        s.enroll(7, 9).await.unwrap();

        let profile = s.resolve(7).await.unwrap().unwrap();
        assert_eq!(profile.role, Role::Teacher);
        assert!(profile.teaches(42));
        assert!(profile.is_enrolled_in(9));
        assert!(s.resolve(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gallery_ordered_and_decrypted() {
        let s = store().await;
        for id in [3i64, 1, 2] {
            s.insert_identity(id, &format!("u{id}"), &format!("U {id}"), Role::Student)
                .await
                .unwrap();
            s.add_embedding(id, "insightface", &emb(vec![id as f32, 0.0]), 0.9, "kiosk")
                .await
                .unwrap();
        }
        // A different model's embedding must not leak into the gallery.
        s.add_embedding(1, "deepface", &emb(vec![9.0, 9.0]), 0.9, "kiosk")
            .await
            .unwrap();

        let gallery = s.gallery("insightface").await.unwrap();
        let ids: Vec<i64> = gallery.iter().map(|f| f.identity_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(gallery[0].embedding.values, vec![1.0, 0.0]);

        assert_eq!(s.embedding_count(1).await.unwrap(), 2);
    }
}
