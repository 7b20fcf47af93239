use thiserror::Error;

use crate::ephemeris::EphemerisSource;
use crate::CelestialBody;

/// Error taxonomy for blueprint calculation.
///
/// Geocoding and ephemeris-backend degradations are recovered locally and
/// never reach the caller; they surface as provenance flags instead. The
/// variants below are the ones a caller can actually observe, and each one
/// means the whole request failed: a partial chart is never returned.
#[derive(Error, Debug)]
pub enum BlueprintError {
    #[error("invalid input: {message}")]
    InputValidation { message: String },

    #[error("birth year {year} outside the supported range 1900..=2100")]
    OutOfRange { year: i32 },

    #[error("ephemeris backend {tier} unavailable: {reason}")]
    EphemerisUnavailable {
        tier: EphemerisSource,
        reason: String,
    },

    #[error("no usable position for {body}")]
    MissingBody { body: CelestialBody },

    #[error("internal invariant violated: {message}")]
    InternalInvariant { message: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ephemeris module decode failed: {0}")]
    Decode(#[from] bincode::Error),
}

impl BlueprintError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        BlueprintError::InputValidation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        BlueprintError::InternalInvariant {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BlueprintError>;
