// ============================================================================
// ERROR TAXONOMY — failure classes of the rendering core
// ============================================================================
//
// Propagation policy: failures in cosmetic stages (grain, one stamp's asset,
// one blur region) are logged and isolated — they never abort the rest of the
// frame.  The pipeline always produces some visible output.

use std::fmt;

/// Crate-wide error type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Canvas or image surface is not ready yet.  Callers should retry after
    /// initialization completes.
    MissingSurface,
    /// A source image or stamp asset failed to decode.  Rendering proceeds
    /// with a placeholder (or no-op) for that element.
    DecodeFailure(String),
    /// Export encoding failed (bad dimensions, encoder error).
    EncodeFailure(String),
    /// GPU feature detection / device creation failed.  The session falls
    /// back to the CPU path permanently.
    GpuUnavailable,
    /// A specific GPU render pass failed at runtime.  The current frame
    /// falls back to the CPU path; non-fatal.
    GpuPassFailure(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingSurface => write!(f, "canvas or image surface not ready"),
            Error::DecodeFailure(what) => write!(f, "failed to decode {}", what),
            Error::EncodeFailure(what) => write!(f, "failed to encode {}", what),
            Error::GpuUnavailable => write!(f, "no usable GPU adapter"),
            Error::GpuPassFailure(pass) => write!(f, "GPU pass '{}' failed", pass),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
