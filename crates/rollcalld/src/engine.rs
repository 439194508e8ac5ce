//! Biometric engine thread.
//!
//! Provider calls are CPU/accelerator-bound and must not run on the
//! request-handling tasks, so the engine owns its providers on a
//! dedicated OS thread fed by an mpsc channel; callers await a oneshot
//! reply. One verify request is one strictly sequential pipeline:
//! detect -> completeness -> spoof gate -> embed -> match, with the
//! fallback model tried only after the primary's miss is known.

use rollcall_core::{
    matcher, Completeness, Embedding, EnrolledFace, FaceEmbeddingProvider, MatchCandidate,
    ProbeImage, ProviderError, SpoofGuard, SpoofVerdict, VerifyError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use crate::registry::ModelRegistry;

/// Per-request knobs, resolved by the orchestrator from config + caller.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Model to try first; must be registered.
    pub model: String,
    pub threshold: f32,
    pub try_fallback: bool,
    pub spoof_enabled: bool,
    /// Whether the fallback retry re-runs the spoof gate.
    pub spoof_on_fallback: bool,
}

/// Result of a verify pipeline: the best candidate (matched or not) and
/// the spoof verdict that let it through.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub candidate: MatchCandidate,
    pub spoof: SpoofVerdict,
}

/// One successfully extracted face from the batch path.
#[derive(Debug)]
pub struct ExtractedFace {
    pub embedding: Embedding,
    pub detect_confidence: f32,
}

enum EngineRequest {
    Verify {
        probe: ProbeImage,
        gallery: Vec<EnrolledFace>,
        opts: MatchOptions,
        reply: oneshot::Sender<Result<FaceMatch, VerifyError>>,
    },
    ExtractBatch {
        probes: Vec<ProbeImage>,
        model: String,
        reply: oneshot::Sender<Result<Vec<Result<ExtractedFace, VerifyError>>, VerifyError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the full verification pipeline for one probe.
    pub async fn verify(
        &self,
        probe: ProbeImage,
        gallery: Vec<EnrolledFace>,
        opts: MatchOptions,
    ) -> Result<FaceMatch, VerifyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                probe,
                gallery,
                opts,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VerifyError::ProviderUnavailable("engine thread exited".into()))?;
        reply_rx
            .await
            .map_err(|_| VerifyError::ProviderUnavailable("engine thread exited".into()))?
    }

    /// Extract embeddings for independent probes on a bounded worker
    /// pool. Each probe's result stands alone; one failure never aborts
    /// its siblings.
    pub async fn extract_batch(
        &self,
        probes: Vec<ProbeImage>,
        model: String,
    ) -> Result<Vec<Result<ExtractedFace, VerifyError>>, VerifyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ExtractBatch {
                probes,
                model,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VerifyError::ProviderUnavailable("engine thread exited".into()))?;
        reply_rx
            .await
            .map_err(|_| VerifyError::ProviderUnavailable("engine thread exited".into()))?
    }
}

fn unavailable(err: ProviderError) -> VerifyError {
    VerifyError::ProviderUnavailable(err.to_string())
}

/// Spawn the engine on a dedicated OS thread.
///
/// Creates one long-lived provider instance per registered model
/// (fail-fast: a model that cannot start prevents startup), then enters
/// the request loop.
pub fn spawn_engine(
    registry: Arc<ModelRegistry>,
    batch_workers: usize,
) -> Result<EngineHandle, VerifyError> {
    let mut providers: Vec<Box<dyn FaceEmbeddingProvider>> = Vec::new();
    for factory in registry.iter() {
        let provider = factory.create().map_err(unavailable)?;
        tracing::info!(model = provider.model_name(), "provider ready");
        providers.push(provider);
    }
    if providers.is_empty() {
        return Err(VerifyError::ProviderUnavailable(
            "no embedding models registered".into(),
        ));
    }

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify {
                        probe,
                        gallery,
                        opts,
                        reply,
                    } => {
                        let result = run_verify(&mut providers, &probe, &gallery, &opts);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ExtractBatch {
                        probes,
                        model,
                        reply,
                    } => {
                        let result = run_extract_batch(&registry, &model, probes, batch_workers);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| VerifyError::ProviderUnavailable(format!("spawn engine thread: {e}")))?;

    Ok(EngineHandle { tx })
}

fn provider_index(providers: &[Box<dyn FaceEmbeddingProvider>], model: &str) -> Option<usize> {
    providers.iter().position(|p| p.model_name() == model)
}

/// Detect, completeness-check, spoof-gate, embed, and match one probe
/// with one provider.
fn run_pipeline(
    provider: &mut dyn FaceEmbeddingProvider,
    probe: &ProbeImage,
    gallery: &[EnrolledFace],
    threshold: f32,
    spoof_enabled: bool,
) -> Result<FaceMatch, VerifyError> {
    let region = provider
        .detect_and_align(probe)
        .map_err(unavailable)?
        .ok_or(VerifyError::NoFaceDetected)?;

    let Completeness { complete, reason } = provider
        .check_completeness(probe, &region)
        .map_err(unavailable)?;
    if !complete {
        return Err(VerifyError::IncompleteFace(
            reason.unwrap_or_else(|| "face partially outside the frame".into()),
        ));
    }

    // Degraded verdicts pass; only a confirmed spoof is fatal.
    let spoof = SpoofGuard::evaluate(provider, probe, spoof_enabled);
    if spoof.is_spoof {
        return Err(VerifyError::SpoofDetected);
    }

    let embedding = provider.embed(probe, &region).map_err(unavailable)?;
    let candidate = matcher::best_candidate(&embedding, gallery, threshold, provider.model_name());

    tracing::debug!(
        model = provider.model_name(),
        matched = candidate.matched,
        similarity = candidate.similarity,
        "pipeline complete"
    );

    Ok(FaceMatch { candidate, spoof })
}

/// Primary pipeline, then at most one sequential fallback retry.
///
/// A fallback match replaces the primary result wholesale (identity,
/// model, similarity). When both miss, the primary's best similarity is
/// what gets reported. Fallback-side infrastructure trouble degrades to
/// the primary's result; a fallback-side confirmed spoof stays fatal.
fn run_verify(
    providers: &mut [Box<dyn FaceEmbeddingProvider>],
    probe: &ProbeImage,
    gallery: &[EnrolledFace],
    opts: &MatchOptions,
) -> Result<FaceMatch, VerifyError> {
    let primary_idx = provider_index(providers, &opts.model).ok_or_else(|| {
        VerifyError::ProviderUnavailable(format!("model {:?} not registered", opts.model))
    })?;

    let primary = run_pipeline(
        &mut *providers[primary_idx],
        probe,
        gallery,
        opts.threshold,
        opts.spoof_enabled,
    )?;

    if primary.candidate.matched || !opts.try_fallback {
        return Ok(primary);
    }

    let Some(fallback_idx) = providers
        .iter()
        .position(|p| p.model_name() != opts.model)
    else {
        return Ok(primary);
    };

    let fallback_model = providers[fallback_idx].model_name().to_string();
    tracing::info!(
        primary = %opts.model,
        fallback = %fallback_model,
        "no match with primary model, trying fallback"
    );

    match run_pipeline(
        &mut *providers[fallback_idx],
        probe,
        gallery,
        opts.threshold,
        opts.spoof_enabled && opts.spoof_on_fallback,
    ) {
        Ok(fallback) if fallback.candidate.matched => {
            tracing::info!(
                model = %fallback_model,
                similarity = fallback.candidate.similarity,
                "match found with fallback model"
            );
            Ok(fallback)
        }
        // Both models missed: the primary's best similarity is the one
        // reported back for diagnostics.
        Ok(_) => Ok(primary),
        Err(VerifyError::SpoofDetected) => Err(VerifyError::SpoofDetected),
        Err(err) => {
            tracing::warn!(model = %fallback_model, error = %err, "fallback attempt failed");
            Ok(primary)
        }
    }
}

/// Detect + completeness + embed for one probe, no spoof gate and no
/// matching. Enrollment input is operator-supervised.
fn extract_one(
    provider: &mut dyn FaceEmbeddingProvider,
    probe: &ProbeImage,
) -> Result<ExtractedFace, VerifyError> {
    let region = provider
        .detect_and_align(probe)
        .map_err(unavailable)?
        .ok_or(VerifyError::NoFaceDetected)?;

    let completeness = provider
        .check_completeness(probe, &region)
        .map_err(unavailable)?;
    if !completeness.complete {
        return Err(VerifyError::IncompleteFace(
            completeness
                .reason
                .unwrap_or_else(|| "face partially outside the frame".into()),
        ));
    }

    let embedding = provider.embed(probe, &region).map_err(unavailable)?;
    Ok(ExtractedFace {
        embedding,
        detect_confidence: region.confidence,
    })
}

/// Bounded worker pool over independent probes. Workers claim indices
/// from a shared counter; each creates its own provider instance from
/// the factory so extraction parallelizes across helper processes.
fn run_extract_batch(
    registry: &ModelRegistry,
    model: &str,
    probes: Vec<ProbeImage>,
    batch_workers: usize,
) -> Result<Vec<Result<ExtractedFace, VerifyError>>, VerifyError> {
    let factory = registry.factory(model).ok_or_else(|| {
        VerifyError::ProviderUnavailable(format!("model {model:?} not registered"))
    })?;

    if probes.is_empty() {
        return Ok(Vec::new());
    }

    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = batch_workers.max(1).min(cores).min(probes.len());

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<Result<ExtractedFace, VerifyError>>>> =
        Mutex::new((0..probes.len()).map(|_| None).collect());
    let create_failure: Mutex<Option<String>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                let mut provider = match factory.create() {
                    Ok(p) => p,
                    Err(err) => {
                        // This worker can't start. Claim nothing: the
                        // remaining items belong to the healthy workers.
                        let mut failure = create_failure
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        failure.get_or_insert(err.to_string());
                        return;
                    }
                };

                loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= probes.len() {
                        return;
                    }
                    let result = extract_one(&mut *provider, &probes[i]);
                    let mut slot =
                        results.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    slot[i] = Some(result);
                }
            });
        }
    });

    // Slots left empty mean no worker ever claimed them, which only
    // happens when every worker failed to start.
    let failure = create_failure
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let collected = results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| {
                Err(VerifyError::ProviderUnavailable(
                    failure
                        .clone()
                        .unwrap_or_else(|| "no extraction worker available".into()),
                ))
            })
        })
        .collect();
    Ok(collected)
}
