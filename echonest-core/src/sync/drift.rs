//! Drift correction
//!
//! Dead-band corrector: the local player is only re-seeked once it has
//! wandered further than the threshold from the server position. Normal
//! playback jitter stays inside the band, since every seek is audible.

/// Default tolerated drift before re-seeking, in seconds
pub const DEFAULT_DRIFT_THRESHOLD_SECS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCorrector {
    threshold_secs: f64,
}

impl DriftCorrector {
    pub fn new(threshold_secs: f64) -> Self {
        Self { threshold_secs }
    }

    pub fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }

    /// Absolute distance between local and server position, in seconds
    pub fn drift(local_secs: f64, server_secs: f64) -> f64 {
        (local_secs - server_secs).abs()
    }

    /// Position to seek to, or `None` while inside the dead band
    pub fn correction(&self, local_secs: f64, server_secs: f64) -> Option<f64> {
        (Self::drift(local_secs, server_secs) > self.threshold_secs).then_some(server_secs)
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD_SECS)
    }
}
