//! The `FaceEmbeddingProvider` capability boundary.
//!
//! Detection, alignment, completeness checking, anti-spoofing, and
//! embedding extraction are all external, potentially slow, potentially
//! failing calls. This crate only defines the contract; the daemon
//! supplies concrete providers (and tests supply scripted ones).

use crate::types::{Completeness, Embedding, FaceRegion, ProbeImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider protocol error: {0}")]
    Protocol(String),
    #[error("provider i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw anti-spoof signal from the provider, before [`crate::SpoofGuard`]
/// turns it into a verdict.
#[derive(Debug, Clone, Copy)]
pub enum SpoofSignal {
    /// Provider confirmed a live face.
    Live { score: f32 },
    /// Provider confirmed a presentation attack (photo/replay).
    Spoof { score: f32 },
    /// Provider's spoof pass found no face at all.
    NoFace,
}

/// A face detection + embedding model pair, treated as one capability.
///
/// Methods take `&mut self`: concrete providers hold sessions or child
/// processes that are not shareable mid-inference.
pub trait FaceEmbeddingProvider: Send {
    /// Name this provider is registered under (e.g. "insightface").
    fn model_name(&self) -> &str;

    /// Detect the dominant face in the probe. `Ok(None)` means the
    /// provider ran fine and found no face.
    fn detect_and_align(
        &mut self,
        probe: &ProbeImage,
    ) -> Result<Option<FaceRegion>, ProviderError>;

    /// Check whether the detected face is fully inside the frame and
    /// carries the landmarks needed downstream.
    fn check_completeness(
        &mut self,
        probe: &ProbeImage,
        region: &FaceRegion,
    ) -> Result<Completeness, ProviderError>;

    /// Run the provider's liveness classifier over the probe.
    fn check_spoof(&mut self, probe: &ProbeImage) -> Result<SpoofSignal, ProviderError>;

    /// Extract the embedding for a detected face region.
    fn embed(
        &mut self,
        probe: &ProbeImage,
        region: &FaceRegion,
    ) -> Result<Embedding, ProviderError>;
}

/// Constructs provider instances on demand.
///
/// The registry owns one factory per model name; the engine thread
/// creates its long-lived instances at startup, and the batch path
/// creates one instance per worker. No global singletons.
pub trait ProviderFactory: Send + Sync {
    fn model_name(&self) -> &str;
    fn create(&self) -> Result<Box<dyn FaceEmbeddingProvider>, ProviderError>;
}
