/// Effect processing errors
use thiserror::Error;

/// Result type alias using `EffectError`
pub type Result<T> = std::result::Result<T, EffectError>;

#[derive(Error, Debug)]
pub enum EffectError {
    /// A parameter is outside the range the effect can work with
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Biquad coefficient derivation rejected the filter parameters
    #[error("Filter design error: {0}")]
    FilterDesign(String),

    /// A mixer's secondary source failed (never surfaced past the mixer)
    #[error("Secondary source error: {0}")]
    SecondarySource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<biquad::Errors> for EffectError {
    fn from(err: biquad::Errors) -> Self {
        EffectError::FilterDesign(format!("{:?}", err))
    }
}
