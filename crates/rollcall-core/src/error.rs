//! Verification error taxonomy.
//!
//! One closed set of failure kinds for the whole pipeline, exhaustively
//! matched everywhere — no string-keyed error dictionaries. Messages are
//! written for the person in front of the camera and must never reveal
//! whether a *different* identity would have matched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("no face detected in the image; try a clearer photo showing the full face")]
    NoFaceDetected,

    #[error("incomplete face detected: {0}")]
    IncompleteFace(String),

    #[error("spoofing detected; use a real face for authentication")]
    SpoofDetected,

    #[error("face verification failed; no matching identity (best similarity: {best_similarity:.2})")]
    NoMatch { best_similarity: f32 },

    /// Matched identity id is absent from the directory — a data
    /// inconsistency between the gallery and the identity tables.
    #[error("matched identity not found in the directory")]
    IdentityNotFound,

    #[error("class session not found")]
    SessionNotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("face provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl VerifyError {
    /// Stable snake_case tag for the wire-facing outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::NoFaceDetected => "no_face_detected",
            VerifyError::IncompleteFace(_) => "incomplete_face",
            VerifyError::SpoofDetected => "spoof_detected",
            VerifyError::NoMatch { .. } => "no_match",
            VerifyError::IdentityNotFound => "identity_not_found",
            VerifyError::SessionNotFound => "session_not_found",
            VerifyError::Forbidden(_) => "forbidden",
            VerifyError::ProviderUnavailable(_) => "provider_unavailable",
            VerifyError::Storage(_) => "storage_failure",
        }
    }

    /// Recoverable-by-the-caller kinds get their message in the outcome;
    /// infrastructure kinds are surfaced opaquely and alerted on.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            VerifyError::ProviderUnavailable(_) | VerifyError::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_kinds_are_not_user_facing() {
        assert!(!VerifyError::ProviderUnavailable("down".into()).is_user_facing());
        assert!(!VerifyError::Storage("disk".into()).is_user_facing());
        assert!(VerifyError::NoFaceDetected.is_user_facing());
        assert!(VerifyError::SpoofDetected.is_user_facing());
        assert!(VerifyError::NoMatch { best_similarity: 0.3 }.is_user_facing());
    }

    #[test]
    fn test_no_match_message_carries_best_similarity() {
        let msg = VerifyError::NoMatch { best_similarity: 0.37 }.to_string();
        assert!(msg.contains("0.37"), "diagnostic similarity missing: {msg}");
    }
}
