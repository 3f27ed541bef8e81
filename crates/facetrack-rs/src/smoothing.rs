use crate::*;

/// Temporal smoothing of per-track identity candidates.
///
/// A candidate is only promoted to a track's confirmed identity after it has been observed `window` times in a row, so a
/// single noisy resolution cannot flip the displayed name.
#[derive(Debug, Clone)]
pub struct RecognitionSmoother {
    window: usize,
}

impl Default for RecognitionSmoother {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RecognitionSmoother {
    /// Returns a new RecognitionSmoother
    ///
    /// # Parameters
    ///
    /// * `window`: Consecutive identical observations required for promotion. Default `3`.
    pub fn new(window: Option<usize>) -> RecognitionSmoother {
        RecognitionSmoother {
            window: window.unwrap_or(3),
        }
    }

    /// Return the smoothing window
    pub fn window(&self) -> usize {
        self.window
    }

    /// Feed one resolved candidate into `track`.
    ///
    /// # Returns
    ///
    /// The newly confirmed name if this observation promoted a known identity. Promotions to `Unknown` change the
    /// displayed name but never produce an attendance event.
    pub fn observe(&self, track: &mut Track, candidate: Identity) -> Option<String> {
        let consecutive = track.observe_candidate(candidate);

        if consecutive < self.window || track.confirmed_name() == Some(track.candidate_name()) {
            return None;
        }

        track.confirm_candidate();
        track.candidate_name().name().map(str::to_string)
    }
}
