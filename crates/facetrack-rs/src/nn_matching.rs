use crate::*;
use ndarray::*;

/// Distances closer than this are treated as ties.
const TIE_TOLERANCE: f32 = 1e-6;

/// Compute the cosine distance `1 - cosine similarity` between two vectors.
///
/// # Returns
///
/// A distance in [0.0, 2.0], or `1.0` if either vector has zero length.
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let denominator = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denominator <= 0.0 || !denominator.is_finite() {
        return 1.0;
    }
    (1.0 - a.dot(&b) / denominator).clamp(0.0, 2.0)
}

/// The outcome of matching one embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The gallery name if the nearest entry is within the threshold, otherwise `Unknown`.
    pub identity: Identity,
    /// The nearest gallery name regardless of threshold.
    pub nearest: Option<String>,
    /// Cosine distance to `nearest`, `f32::INFINITY` for an empty gallery.
    pub distance: f32,
}

/// Nearest-neighbor identity lookup against a gallery of reference embeddings.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    /// Matches at or beyond this cosine distance resolve to `Unknown`.
    cosine_threshold: f32,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdentityResolver {
    /// Returns a new IdentityResolver
    ///
    /// # Parameters
    ///
    /// * `cosine_threshold`: The matching threshold. Samples at or beyond this distance are considered unknown. Default `0.63`.
    pub fn new(cosine_threshold: Option<f32>) -> IdentityResolver {
        IdentityResolver {
            cosine_threshold: cosine_threshold.unwrap_or(0.63),
        }
    }

    /// Return the matching threshold
    pub fn cosine_threshold(&self) -> f32 {
        self.cosine_threshold
    }

    /// Resolve an embedding to the nearest gallery identity.
    ///
    /// # Parameters
    ///
    /// * `gallery`: The known identities.
    /// * `embedding`: A feature vector with the gallery's dimensionality. It does not need to be normalized.
    pub fn resolve(
        &self,
        gallery: &Gallery,
        embedding: ArrayView1<f32>,
    ) -> Result<Resolution, EngineError> {
        if gallery.is_empty() {
            return Ok(Resolution {
                identity: Identity::Unknown,
                nearest: None,
                distance: f32::INFINITY,
            });
        }

        if embedding.len() != gallery.dimension() {
            return Err(EngineError::EmbeddingDimension {
                expected: gallery.dimension(),
                found: embedding.len(),
            });
        }

        let Some(embedding) = normalize(embedding) else {
            return Ok(Resolution {
                identity: Identity::Unknown,
                nearest: None,
                distance: f32::INFINITY,
            });
        };

        // references are unit norm so the dot product is the cosine similarity
        let distances = (1.0 - gallery.references().dot(&embedding)).mapv(|v| v.clamp(0.0, 2.0));

        let (index, distance) = distances.iter().enumerate().fold(
            (0, f32::INFINITY),
            |(best_index, best_distance), (index, &distance)| {
                if distance < best_distance - TIE_TOLERANCE {
                    (index, distance)
                } else {
                    (best_index, best_distance)
                }
            },
        );

        let nearest = gallery.names()[index].clone();
        let identity = if distance < self.cosine_threshold {
            Identity::Known(nearest.clone())
        } else {
            Identity::Unknown
        };

        Ok(Resolution {
            identity,
            nearest: Some(nearest),
            distance,
        })
    }
}
