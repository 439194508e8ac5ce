//! Scripted providers for engine and orchestrator tests.

use rollcall_core::{
    Completeness, Embedding, FaceEmbeddingProvider, FaceRegion, ProbeImage, ProviderError,
    ProviderFactory, SpoofSignal,
};
use std::sync::Arc;

use crate::registry::ModelRegistry;

/// Provider whose every stage is scripted.
#[derive(Clone)]
pub struct Scripted {
    pub model: String,
    pub face: Option<FaceRegion>,
    pub complete: bool,
    pub incomplete_reason: Option<String>,
    /// None scripts a failing spoof classifier.
    pub spoof: Option<SpoofSignal>,
    pub embedding: Vec<f32>,
}

impl Scripted {
    pub fn live(model: &str, embedding: Vec<f32>) -> Self {
        Self {
            model: model.to_string(),
            face: Some(region()),
            complete: true,
            incomplete_reason: None,
            spoof: Some(SpoofSignal::Live { score: 0.9 }),
            embedding,
        }
    }
}

pub fn region() -> FaceRegion {
    FaceRegion {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
        confidence: 0.95,
        landmarks: None,
    }
}

pub fn probe() -> ProbeImage {
    ProbeImage {
        pixels: vec![0u8; 4],
        width: 2,
        height: 2,
    }
}

impl FaceEmbeddingProvider for Scripted {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn detect_and_align(
        &mut self,
        probe: &ProbeImage,
    ) -> Result<Option<FaceRegion>, ProviderError> {
        // A zero-width probe stands in for an undetectable image.
        if probe.width == 0 {
            return Ok(None);
        }
        Ok(self.face.clone())
    }

    fn check_completeness(
        &mut self,
        _probe: &ProbeImage,
        _region: &FaceRegion,
    ) -> Result<Completeness, ProviderError> {
        Ok(Completeness {
            complete: self.complete,
            reason: self.incomplete_reason.clone(),
        })
    }

    fn check_spoof(&mut self, _probe: &ProbeImage) -> Result<SpoofSignal, ProviderError> {
        self.spoof
            .ok_or_else(|| ProviderError::Unavailable("spoof model down".into()))
    }

    fn embed(
        &mut self,
        _probe: &ProbeImage,
        _region: &FaceRegion,
    ) -> Result<Embedding, ProviderError> {
        Ok(Embedding {
            values: self.embedding.clone(),
            model_version: Some(self.model.clone()),
        })
    }
}

pub struct ScriptedFactory(pub Scripted);

impl ProviderFactory for ScriptedFactory {
    fn model_name(&self) -> &str {
        &self.0.model
    }

    fn create(&self) -> Result<Box<dyn FaceEmbeddingProvider>, ProviderError> {
        Ok(Box::new(self.0.clone()))
    }
}

pub fn registry_of(providers: Vec<Scripted>) -> Arc<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    for p in providers {
        registry.register(Arc::new(ScriptedFactory(p)));
    }
    Arc::new(registry)
}
