//! Anti-spoof gate.
//!
//! The only fatal signal is an explicit "this is not a live face" from
//! the provider. Everything else — check disabled, provider error,
//! provider timeout, no face in the spoof pass — lets the request
//! continue: spoof-model unavailability must never silently block
//! legitimate attendance.

use crate::provider::{FaceEmbeddingProvider, SpoofSignal};
use crate::types::{ProbeImage, SpoofVerdict};

pub struct SpoofGuard;

impl SpoofGuard {
    /// Evaluate the probe against the provider's liveness classifier.
    ///
    /// With `enabled == false` this is a no-op returning an unchecked
    /// verdict. Provider failures degrade (logged at warn) instead of
    /// propagating.
    pub fn evaluate(
        provider: &mut dyn FaceEmbeddingProvider,
        probe: &ProbeImage,
        enabled: bool,
    ) -> SpoofVerdict {
        if !enabled {
            return SpoofVerdict::unchecked();
        }

        match provider.check_spoof(probe) {
            Ok(SpoofSignal::Spoof { score }) => {
                tracing::warn!(model = provider.model_name(), score, "spoof detected");
                SpoofVerdict {
                    is_spoof: true,
                    checked: true,
                    degraded: false,
                    score: Some(score),
                }
            }
            Ok(SpoofSignal::Live { score }) => SpoofVerdict {
                is_spoof: false,
                checked: true,
                degraded: false,
                score: Some(score),
            },
            Ok(SpoofSignal::NoFace) => {
                tracing::warn!(
                    model = provider.model_name(),
                    "no face in anti-spoof pass; proceeding unchecked"
                );
                SpoofVerdict::degraded()
            }
            Err(err) => {
                tracing::warn!(
                    model = provider.model_name(),
                    error = %err,
                    "anti-spoof check failed; proceeding unchecked"
                );
                SpoofVerdict::degraded()
            }
        }
    }
}
