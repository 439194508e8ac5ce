//! rollcall-core — biometric primitives for attendance verification.
//!
//! Probe images enter through the [`FaceEmbeddingProvider`] boundary
//! (detection, completeness, anti-spoof, embedding extraction all live
//! behind it), get gated by [`SpoofGuard`], and are matched against an
//! enrolled gallery with [`matcher::best_candidate`]. Everything here is
//! a pure function of its inputs; model selection and fallback control
//! flow belong to the daemon's orchestrator.

pub mod error;
pub mod matcher;
pub mod provider;
pub mod spoof;
pub mod types;

pub use error::VerifyError;
pub use provider::{FaceEmbeddingProvider, ProviderError, ProviderFactory, SpoofSignal};
pub use spoof::SpoofGuard;
pub use types::{
    Completeness, Embedding, EnrolledFace, FaceRegion, MatchCandidate, ProbeImage, SpoofVerdict,
};
