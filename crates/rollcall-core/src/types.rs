use serde::{Deserialize, Serialize};

/// Grayscale probe image, row-major, one byte per pixel.
#[derive(Debug, Clone)]
pub struct ProbeImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Result of the face-completeness check: a detected face may still be
/// cropped at the frame edge or missing key landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completeness {
    pub complete: bool,
    pub reason: Option<String>,
}

/// Face embedding vector (typically 512-dimensional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Uses constant-time computation: always processes all dimensions.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// One gallery entry: an enrolled identity's stored embedding, already
/// decrypted. Galleries are ordered by ascending identity id so that
/// matching is deterministic under score ties.
#[derive(Debug, Clone)]
pub struct EnrolledFace {
    pub identity_id: i64,
    pub embedding: Embedding,
}

/// Ephemeral result of comparing a probe embedding against the gallery.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    /// Identity of the best-scoring gallery entry (if any entry exists).
    pub identity_id: Option<i64>,
    /// Best similarity, clamped to [0, 1].
    pub similarity: f32,
    /// True iff `similarity >= threshold` at match time.
    pub matched: bool,
    /// Name of the model whose embedding produced this candidate.
    pub model: String,
}

impl MatchCandidate {
    pub fn no_match(model: &str) -> Self {
        Self {
            identity_id: None,
            similarity: 0.0,
            matched: false,
            model: model.to_string(),
        }
    }
}

/// Outcome of the anti-spoof stage. Carried through to the match result
/// so callers can tell a clean pass from a degraded one.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpoofVerdict {
    /// True only on an explicit "not a live face" signal from the provider.
    pub is_spoof: bool,
    /// True iff the provider actually evaluated the probe.
    pub checked: bool,
    /// True when the check was requested but the provider could not
    /// deliver (error, timeout, no face in the spoof pass).
    pub degraded: bool,
    /// Provider's liveness score, when it reported one.
    pub score: Option<f32>,
}

impl SpoofVerdict {
    /// Verdict for a request with anti-spoofing disabled.
    pub fn unchecked() -> Self {
        Self {
            is_spoof: false,
            checked: false,
            degraded: false,
            score: None,
        }
    }

    /// Verdict when the provider failed mid-check: never blocks the request.
    pub fn degraded() -> Self {
        Self {
            is_spoof: false,
            checked: false,
            degraded: true,
            score: None,
        }
    }
}
