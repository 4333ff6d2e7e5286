use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollateError {
    #[error("couldn't find an aggregator named '{name}'")]
    UnknownAggregator { name: String },
    #[error("invalid arguments for aggregator '{spec}'")]
    InvalidAggregatorArgs { spec: String },
    #[error("parameter to '{flag}' argument was not a valid integer")]
    InvalidSizeInt { flag: String },
    #[error("the size must be greater than 0")]
    SizeTooSmall,
    #[error("when cubing, you must have at least 2 ** num_key_fields clumps")]
    CubeCapacityTooSmall,
    #[error("must specify --key or --aggregator")]
    NothingToCollate,
    #[error("couldn't open file '{name}' for reading")]
    InputFileNotFound { name: String },
    #[error("malformed JSON record near byte {offset}")]
    MalformedRecord { offset: usize },
    #[error("truncated JSON record at end of input")]
    TruncatedRecord,
    #[error("{e}")]
    ClapError {
        #[from]
        e: clap::Error,
    },
    #[error(transparent)]
    StdIoError(#[from] std::io::Error),
}

impl CollateError {
    /// Configuration errors get the usage banner appended on stderr;
    /// runtime errors do not.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CollateError::UnknownAggregator { .. }
                | CollateError::InvalidAggregatorArgs { .. }
                | CollateError::InvalidSizeInt { .. }
                | CollateError::SizeTooSmall
                | CollateError::CubeCapacityTooSmall
                | CollateError::NothingToCollate
                | CollateError::InputFileNotFound { .. }
                | CollateError::ClapError { .. }
        )
    }
}
