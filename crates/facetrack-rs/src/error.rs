use thiserror::Error;

/// Errors raised while validating the engine configuration. These are fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be at least 1, got {value}")]
    ZeroCount { name: &'static str, value: usize },

    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("gallery is empty but recognition requires at least one known identity")]
    EmptyGallery,

    #[error("gallery entry {name:?} has dimension {found}, expected {expected}")]
    GalleryDimension {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("gallery entry {0:?} has a zero-length reference embedding")]
    DegenerateReference(String),

    #[error("gallery entry {0:?} is defined more than once")]
    DuplicateName(String),
}

/// Errors raised by the engine while processing frames.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("frame {index} has no pixels")]
    EmptyFrame { index: u64 },

    #[error("embedding has dimension {found}, gallery expects {expected}")]
    EmbeddingDimension { expected: usize, found: usize },
}
