use crate::*;
use ndarray::*;
use std::{collections::HashSet, fmt};

/// The known identities for a session: one normalized reference embedding per name.
///
/// Entries keep the order they were supplied in, which is also the order used to break ties between equidistant names.
#[derive(Clone)]
pub struct Gallery {
    /// Identity names, one per row of `references`.
    names: Vec<String>,
    /// An NxM matrix of N unit-norm reference embeddings of dimensionality M.
    references: Array2<f32>,
}

impl fmt::Debug for Gallery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gallery")
            .field("names", &self.names)
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl Default for Gallery {
    fn default() -> Self {
        Gallery {
            names: vec![],
            references: Array2::zeros((0, 0)),
        }
    }
}

impl Gallery {
    /// Returns a new Gallery
    ///
    /// # Parameters
    ///
    /// * `entries`: `(name, reference embedding)` pairs. Every embedding must share one dimensionality and have a non-zero norm.
    pub fn new(entries: Vec<(String, Vec<f32>)>) -> Result<Gallery, ConfigError> {
        let Some(dimension) = entries.first().map(|(_, embedding)| embedding.len()) else {
            return Ok(Gallery::default());
        };

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(entries.len());
        let mut references = Array2::<f32>::zeros((0, dimension));

        for (name, embedding) in entries {
            if embedding.len() != dimension {
                return Err(ConfigError::GalleryDimension {
                    name,
                    expected: dimension,
                    found: embedding.len(),
                });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(name));
            }
            let Some(reference) = normalize(ArrayView1::from(&embedding)) else {
                return Err(ConfigError::DegenerateReference(name));
            };

            references
                .push_row(reference.view())
                .map_err(|_| ConfigError::GalleryDimension {
                    name: name.clone(),
                    expected: dimension,
                    found: reference.len(),
                })?;
            names.push(name);
        }

        Ok(Gallery { names, references })
    }

    /// Returns the number of known identities
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if there are no known identities
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the identity names in gallery order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the embedding dimensionality, `0` for an empty gallery
    pub fn dimension(&self) -> usize {
        self.references.ncols()
    }

    /// Returns the normalized reference embeddings, one row per name
    pub fn references(&self) -> &Array2<f32> {
        &self.references
    }
}
