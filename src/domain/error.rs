//! Domain error types.

/// Top-level error type for fxsweep.
#[derive(Debug, thiserror::Error)]
pub enum FxsweepError {
    #[error("unrecognized timestamp: {value:?}")]
    TimestampParse { value: String },

    #[error("record parse error in {file} at line {line}: {reason}")]
    RecordParse {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("archive error in {path}: {reason}")]
    Archive { path: String, reason: String },

    #[error("data integrity violation: {reason}")]
    DataIntegrity { reason: String },

    #[error("no records for {prefix} in {period}")]
    EmptyDataset { prefix: String, period: String },

    #[error("optimization infeasible: {reason}")]
    OptimizationInfeasible { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FxsweepError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        FxsweepError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// A per-file failure collected while loading; the run carries on without the file.
#[derive(Debug, thiserror::Error)]
#[error("{file}: {error}")]
pub struct FileError {
    pub file: String,
    pub error: FxsweepError,
}

impl From<&FxsweepError> for std::process::ExitCode {
    fn from(err: &FxsweepError) -> Self {
        let code: u8 = match err {
            FxsweepError::Io(_) | FxsweepError::Csv(_) => 1,
            FxsweepError::ConfigParse { .. }
            | FxsweepError::ConfigMissing { .. }
            | FxsweepError::ConfigInvalid { .. } => 2,
            FxsweepError::TimestampParse { .. }
            | FxsweepError::RecordParse { .. }
            | FxsweepError::Archive { .. } => 3,
            FxsweepError::DataIntegrity { .. } => 4,
            FxsweepError::EmptyDataset { .. } => 5,
            FxsweepError::OptimizationInfeasible { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
