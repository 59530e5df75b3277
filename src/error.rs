use thiserror::Error;

/// Everything that can go wrong between the driver and the core.
///
/// Budget exhaustion is deliberately absent: the saturation driver reports
/// it through [`StopReason`](crate::StopReason) and keeps its result usable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("expected one of `--binary_in` or `--ir_in`")]
    InputMissing,

    #[error("deserialization failed at byte {offset}: {reason}")]
    Deserialize { offset: usize, reason: String },

    #[error("rule parse failed: {0}")]
    RuleParse(String),

    #[error("pattern construct `{0}` is not implemented")]
    UnimplementedPatternNode(&'static str),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("instruction encoding is longer than 15 bytes ({0})")]
    EncodingTooLong(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
