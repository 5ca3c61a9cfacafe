use thiserror::Error;

use super::config::ConfigError;
use super::index::IndexError;
use super::kernels::KernelError;
use crate::core::energy::scoring::ScoringError;
use crate::core::image::stack::ImageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Energy scoring failed: {source}")]
    Scoring {
        #[from]
        source: ScoringError,
    },

    #[error("Kernel failed: {source}")]
    Kernel {
        #[from]
        source: KernelError,
    },

    #[error("Interaction index error: {source}")]
    Index {
        #[from]
        source: IndexError,
    },

    #[error("Invalid image: {source}")]
    Image {
        #[from]
        source: ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to export results: {0}")]
    Export(#[from] csv::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
