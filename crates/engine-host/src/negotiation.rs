//! Requested-versus-negotiated configuration reconciliation.
//!
//! After a start the driver may grant different parameters than requested.
//! Detecting that difference feeds a single informational notification; the
//! persisted request is never mutated.

use engine_protocol::NegotiatedConfig;

use crate::config::AudioConfig;

/// Difference between what was requested and what the engine is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationMismatch {
    /// Requested sample rate, when one was requested and differs.
    pub requested_sample_rate: Option<u32>,
    /// Requested buffer size, when one was requested and differs.
    pub requested_buffer_size: Option<u32>,
    /// Parameters the engine actually negotiated.
    pub actual: NegotiatedConfig,
}

/// Compare a requested configuration against the negotiated result.
///
/// Returns `Some` when at least one requested field differs from what was
/// granted. Fields the user never requested are skipped; with nothing to
/// compare against, no mismatch is reported.
pub fn reconcile(requested: &AudioConfig, actual: &NegotiatedConfig) -> Option<NegotiationMismatch> {
    let sample_rate_diff = requested
        .sample_rate
        .filter(|&want| want != actual.sample_rate);
    let buffer_size_diff = requested
        .buffer_size
        .filter(|&want| want != actual.buffer_size);

    if sample_rate_diff.is_none() && buffer_size_diff.is_none() {
        return None;
    }

    Some(NegotiationMismatch {
        requested_sample_rate: sample_rate_diff,
        requested_buffer_size: buffer_size_diff,
        actual: *actual,
    })
}
