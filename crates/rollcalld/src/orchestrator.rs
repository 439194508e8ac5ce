//! Verification orchestrator.
//!
//! Owns the per-request sequence: decode the probe, resolve session and
//! acting principal, load the gallery, drive the engine (which owns all
//! model/fallback control flow below it), authorize, commit the
//! attendance transition, and assemble the caller-facing outcome. Data
//! flows strictly downward; no component below reaches back up.

use chrono::{DateTime, Utc};
use rollcall_attendance::{
    authorize, AttendanceLedger, AttendanceStatus, AttendanceStore, AuthzDecision, FaceGallery,
    IdentityDirectory, IdentityProfile, Role, StoreError,
};
use rollcall_core::{ProbeImage, VerifyError};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::{EngineHandle, MatchOptions};
use crate::registry::ModelRegistry;

/// Pipeline knobs fixed at daemon startup.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub similarity_threshold: f32,
    pub antispoof: bool,
    pub spoof_check_on_fallback: bool,
}

pub struct CheckInRequest {
    pub session_id: i64,
    pub principal_id: i64,
    pub image: Vec<u8>,
    /// Model to try first; None picks the registry default.
    pub model: Option<String>,
    pub try_fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

impl From<&IdentityProfile> for IdentitySummary {
    fn from(p: &IdentityProfile) -> Self {
        Self {
            id: p.id,
            username: p.username.clone(),
            full_name: p.full_name.clone(),
            role: p.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub class_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureInfo {
    pub kind: String,
    pub message: String,
}

/// Caller-facing check-in outcome — everything a presentation layer
/// needs without re-deriving business logic.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub verified: bool,
    pub identity: Option<IdentitySummary>,
    /// Present only when someone else (teacher/admin) did the check-in.
    pub acting_principal: Option<IdentitySummary>,
    pub similarity: Option<f32>,
    pub model: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub late_minutes: Option<i64>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub session: Option<SessionSummary>,
    pub failure: Option<FailureInfo>,
}

impl CheckInOutcome {
    /// Outcome for a user-facing failure. Infrastructure failures never
    /// take this path; they surface as opaque transport errors.
    pub fn from_failure(err: &VerifyError) -> Self {
        Self {
            verified: false,
            identity: None,
            acting_principal: None,
            similarity: match err {
                VerifyError::NoMatch { best_similarity } => Some(*best_similarity),
                _ => None,
            },
            model: None,
            status: None,
            late_minutes: None,
            check_in_time: None,
            session: None,
            failure: Some(FailureInfo {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollItemOutcome {
    pub index: usize,
    pub stored: bool,
    pub embedding_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub identity_id: i64,
    pub model: String,
    pub stored: usize,
    pub items: Vec<EnrollItemOutcome>,
}

pub struct Orchestrator<S> {
    store: S,
    ledger: AttendanceLedger<S>,
    engine: EngineHandle,
    registry: Arc<ModelRegistry>,
    settings: PipelineSettings,
}

fn storage(err: StoreError) -> VerifyError {
    VerifyError::Storage(err.to_string())
}

/// Decode raw uploaded bytes into a grayscale probe.
fn decode_probe(bytes: &[u8]) -> Result<ProbeImage, VerifyError> {
    let decoded = image::load_from_memory(bytes).map_err(|err| {
        tracing::debug!(error = %err, "probe image failed to decode");
        VerifyError::NoFaceDetected
    })?;
    let luma = decoded.to_luma8();
    Ok(ProbeImage {
        width: luma.width(),
        height: luma.height(),
        pixels: luma.into_raw(),
    })
}

impl<S> Orchestrator<S>
where
    S: AttendanceStore + IdentityDirectory + FaceGallery + Clone + Send + Sync + 'static,
{
    pub fn new(
        store: S,
        engine: EngineHandle,
        registry: Arc<ModelRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ledger: AttendanceLedger::new(store.clone()),
            store,
            engine,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn resolve_model(&self, requested: Option<&str>) -> Result<String, VerifyError> {
        match requested {
            Some(name) => {
                if self.registry.factory(name).is_some() {
                    Ok(name.to_string())
                } else {
                    Err(VerifyError::ProviderUnavailable(format!(
                        "model {name:?} not registered"
                    )))
                }
            }
            None => self
                .registry
                .default_model()
                .map(str::to_string)
                .ok_or_else(|| {
                    VerifyError::ProviderUnavailable("no embedding models registered".into())
                }),
        }
    }

    async fn require_principal(&self, id: i64) -> Result<IdentityProfile, VerifyError> {
        self.store
            .resolve(id)
            .await
            .map_err(storage)?
            .ok_or_else(|| VerifyError::Forbidden("Unknown acting principal.".into()))
    }

    /// Full verification pipeline for one check-in request.
    pub async fn check_in(&self, req: CheckInRequest) -> Result<CheckInOutcome, VerifyError> {
        let session = self
            .store
            .session(req.session_id)
            .await
            .map_err(storage)?
            .ok_or(VerifyError::SessionNotFound)?;

        let acting = self.require_principal(req.principal_id).await?;
        let model = self.resolve_model(req.model.as_deref())?;
        let probe = decode_probe(&req.image)?;

        let gallery = self.store.gallery(&model).await.map_err(storage)?;
        tracing::debug!(
            session_id = session.id,
            model = %model,
            gallery_size = gallery.len(),
            "starting verification"
        );

        let face_match = self
            .engine
            .verify(
                probe,
                gallery,
                MatchOptions {
                    model,
                    threshold: self.settings.similarity_threshold,
                    try_fallback: req.try_fallback,
                    spoof_enabled: self.settings.antispoof,
                    spoof_on_fallback: self.settings.spoof_check_on_fallback,
                },
            )
            .await?;

        let candidate = face_match.candidate;
        if !candidate.matched {
            return Err(VerifyError::NoMatch {
                best_similarity: candidate.similarity,
            });
        }
        let matched_id = candidate.identity_id.ok_or(VerifyError::IdentityNotFound)?;

        let matched = self
            .store
            .resolve(matched_id)
            .await
            .map_err(storage)?
            .ok_or(VerifyError::IdentityNotFound)?;

        match authorize(&acting, &matched, &session) {
            AuthzDecision::Deny { reason } => {
                tracing::info!(
                    principal = acting.id,
                    session_id = session.id,
                    "check-in denied"
                );
                return Err(VerifyError::Forbidden(reason.message().to_string()));
            }
            AuthzDecision::Permit {
                enrollment_mismatch: true,
            } => {
                tracing::info!(
                    principal = acting.id,
                    student = matched.id,
                    class_id = session.class_id,
                    "admin checking in non-enrolled student"
                );
            }
            AuthzDecision::Permit { .. } => {}
        }

        let now = Utc::now();
        let record = self
            .ledger
            .record_check_in(matched.id, &session, now)
            .await
            .map_err(storage)?;

        tracing::info!(
            student = matched.id,
            session_id = session.id,
            status = record.status.as_str(),
            similarity = candidate.similarity,
            model = %candidate.model,
            "attendance recorded"
        );

        Ok(CheckInOutcome {
            verified: true,
            acting_principal: (acting.id != matched.id).then(|| IdentitySummary::from(&acting)),
            identity: Some(IdentitySummary::from(&matched)),
            similarity: Some(candidate.similarity),
            model: Some(candidate.model),
            status: Some(record.status),
            late_minutes: Some(record.late_minutes),
            check_in_time: record.check_in_time,
            session: Some(SessionSummary {
                id: session.id,
                class_id: session.class_id,
                start_time: session.start_time,
                end_time: session.end_time,
            }),
            failure: None,
        })
    }

    /// Manual attendance override: admin/teacher only, and authoritative.
    pub async fn set_status(
        &self,
        principal_id: i64,
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        late_minutes: i64,
    ) -> Result<CheckInOutcome, VerifyError> {
        let acting = self.require_principal(principal_id).await?;
        match acting.role {
            Role::Admin | Role::Teacher => {}
            Role::Student => {
                return Err(VerifyError::Forbidden("Not authorized.".into()));
            }
        }

        let session = self
            .store
            .session(session_id)
            .await
            .map_err(storage)?
            .ok_or(VerifyError::SessionNotFound)?;

        let student = self
            .store
            .resolve(student_id)
            .await
            .map_err(storage)?
            .ok_or(VerifyError::IdentityNotFound)?;

        let record = self
            .ledger
            .set_status(student.id, session.id, status, late_minutes)
            .await
            .map_err(storage)?;

        Ok(CheckInOutcome {
            verified: false,
            identity: Some(IdentitySummary::from(&student)),
            acting_principal: Some(IdentitySummary::from(&acting)),
            similarity: None,
            model: None,
            status: Some(record.status),
            late_minutes: Some(record.late_minutes),
            check_in_time: record.check_in_time,
            session: Some(SessionSummary {
                id: session.id,
                class_id: session.class_id,
                start_time: session.start_time,
                end_time: session.end_time,
            }),
            failure: None,
        })
    }

    /// Enroll face embeddings for an identity from one or more images.
    /// Restricted to the identity itself or an admin. Each image is an
    /// independent unit: failures are reported per item.
    pub async fn enroll(
        &self,
        principal_id: i64,
        identity_id: i64,
        images: Vec<Vec<u8>>,
        device_id: &str,
    ) -> Result<EnrollOutcome, VerifyError> {
        let acting = self.require_principal(principal_id).await?;
        if acting.id != identity_id && acting.role != Role::Admin {
            return Err(VerifyError::Forbidden(
                "You are not authorized to enroll faces for this identity.".into(),
            ));
        }

        let target = self
            .store
            .resolve(identity_id)
            .await
            .map_err(storage)?
            .ok_or(VerifyError::IdentityNotFound)?;

        let model = self.resolve_model(None)?;

        // Decode up front; undecodable images become per-item failures
        // without consuming a batch slot.
        let mut decoded: Vec<(usize, ProbeImage)> = Vec::new();
        let mut items: Vec<Option<EnrollItemOutcome>> = (0..images.len()).map(|_| None).collect();
        for (index, bytes) in images.iter().enumerate() {
            match decode_probe(bytes) {
                Ok(probe) => decoded.push((index, probe)),
                Err(err) => {
                    items[index] = Some(EnrollItemOutcome {
                        index,
                        stored: false,
                        embedding_id: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let probes: Vec<ProbeImage> = decoded.iter().map(|(_, p)| p.clone()).collect();
        let extracted = self.engine.extract_batch(probes, model.clone()).await?;

        let mut stored = 0usize;
        for ((index, _), result) in decoded.into_iter().zip(extracted) {
            let item = match result {
                Ok(face) => match self
                    .store
                    .add_embedding(
                        target.id,
                        &model,
                        &face.embedding,
                        face.detect_confidence,
                        device_id,
                    )
                    .await
                {
                    Ok(id) => {
                        stored += 1;
                        EnrollItemOutcome {
                            index,
                            stored: true,
                            embedding_id: Some(id.to_string()),
                            error: None,
                        }
                    }
                    Err(err) => EnrollItemOutcome {
                        index,
                        stored: false,
                        embedding_id: None,
                        error: Some(storage(err).to_string()),
                    },
                },
                Err(err) => EnrollItemOutcome {
                    index,
                    stored: false,
                    embedding_id: None,
                    error: Some(err.to_string()),
                },
            };
            let slot = item.index;
            items[slot] = Some(item);
        }

        tracing::info!(
            identity = target.id,
            stored,
            total = images.len(),
            model = %model,
            "enrollment batch complete"
        );

        Ok(EnrollOutcome {
            identity_id: target.id,
            model,
            stored,
            items: items.into_iter().flatten().collect(),
        })
    }
}
