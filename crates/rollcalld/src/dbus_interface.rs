//! D-Bus interface for the Rollcall attendance daemon.
//!
//! Bus name: org.rollcall.Rollcall1
//! Object path: /org/rollcall/Rollcall1
//!
//! Results are JSON strings. User-facing verification failures ride
//! inside the outcome payload so a presentation layer can render them;
//! infrastructure failures are logged here and surfaced as opaque
//! D-Bus errors.

use rollcall_attendance::{AttendanceStatus, SqliteStore};
use rollcall_core::VerifyError;
use std::sync::Arc;
use zbus::interface;

use crate::orchestrator::{CheckInOutcome, CheckInRequest, Orchestrator};

pub struct RollcallService {
    orchestrator: Arc<Orchestrator<SqliteStore>>,
}

impl RollcallService {
    pub fn new(orchestrator: Arc<Orchestrator<SqliteStore>>) -> Self {
        Self { orchestrator }
    }

    fn outcome_json(result: Result<CheckInOutcome, VerifyError>) -> zbus::fdo::Result<String> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) if err.is_user_facing() => CheckInOutcome::from_failure(&err),
            Err(err) => {
                tracing::error!(error = %err, kind = err.kind(), "infrastructure failure");
                return Err(zbus::fdo::Error::Failed("internal error".into()));
            }
        };
        serde_json::to_string(&outcome)
            .map_err(|e| zbus::fdo::Error::Failed(format!("encode outcome: {e}")))
    }
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Verify a face image and record attendance for the given session.
    /// An empty `model` picks the configured default.
    async fn check_in(
        &self,
        session_id: i64,
        principal_id: i64,
        image: Vec<u8>,
        model: &str,
        try_fallback: bool,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(session_id, principal_id, try_fallback, "check_in requested");

        let models = self.orchestrator.registry().model_names();
        if !model.is_empty() && !models.iter().any(|m| m == model) {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "Invalid model selection. Choose one of: {}",
                models.join(", ")
            )));
        }

        let result = self
            .orchestrator
            .check_in(CheckInRequest {
                session_id,
                principal_id,
                image,
                model: (!model.is_empty()).then(|| model.to_string()),
                try_fallback,
            })
            .await;
        Self::outcome_json(result)
    }

    /// Manually set attendance status for a student (admin/teacher only).
    async fn set_status(
        &self,
        session_id: i64,
        student_id: i64,
        principal_id: i64,
        status: &str,
        late_minutes: i64,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(session_id, student_id, principal_id, status, "set_status requested");

        let status = AttendanceStatus::parse(status).ok_or_else(|| {
            zbus::fdo::Error::InvalidArgs("status must be 'present' or 'late'".into())
        })?;

        let result = self
            .orchestrator
            .set_status(principal_id, student_id, session_id, status, late_minutes)
            .await;
        Self::outcome_json(result)
    }

    /// Enroll face embeddings for an identity from one or more images
    /// (self or admin only).
    async fn enroll(
        &self,
        identity_id: i64,
        principal_id: i64,
        images: Vec<Vec<u8>>,
        device_id: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(
            identity_id,
            principal_id,
            count = images.len(),
            "enroll requested"
        );

        match self
            .orchestrator
            .enroll(principal_id, identity_id, images, device_id)
            .await
        {
            Ok(outcome) => serde_json::to_string(&outcome)
                .map_err(|e| zbus::fdo::Error::Failed(format!("encode outcome: {e}"))),
            Err(err) if err.is_user_facing() => Err(zbus::fdo::Error::Failed(err.to_string())),
            Err(err) => {
                tracing::error!(error = %err, kind = err.kind(), "infrastructure failure");
                Err(zbus::fdo::Error::Failed("internal error".into()))
            }
        }
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "models": self.orchestrator.registry().model_names(),
        })
        .to_string())
    }
}
