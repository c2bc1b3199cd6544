use crate::cancel::CancelPhase;

/// Error taxonomy for the PDL relay core.
///
/// `MalformedEventCode` is the only client-input error; everything else is
/// an operational failure. `SpawnFailure` and `Timeout` are kept distinct
/// from `TransmissionFailed` so callers can tell "tool never ran" and
/// "tool ran too long" apart from "tool ran and did not confirm the send".
#[derive(Debug, thiserror::Error)]
pub enum PdlError {
    #[error("invalid product client configuration: {0}")]
    InvalidConfig(String),
    #[error("malformed event code \"{raw}\": {reason}")]
    MalformedEventCode { raw: String, reason: String },
    #[error("unable to build quakeml cancellation document ({path}): {reason}")]
    TemplateUnavailable { path: String, reason: String },
    #[error("failed to run product client '{executable}': {source}")]
    SpawnFailure {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("product client did not exit within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("product client ran but did not report send completion: {stdout_tail}")]
    TransmissionFailed { stdout_tail: String },
    #[error("cancellation failed during {phase}: {source}")]
    CancelFailed {
        phase: CancelPhase,
        #[source]
        source: Box<PdlError>,
    },
}

impl PdlError {
    /// True for errors caused by the caller's input rather than this
    /// service or the product client.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PdlError::MalformedEventCode { .. })
    }
}
