//! Error taxonomy shared by engines, blocks, and the parameter stream.
//!
//! Callers branch on the variant: `InvalidArgument` is a programming or data error,
//! `UnsupportedOperation` is an environment limitation, and `Configuration` means the
//! process has no usable engine at all.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NnError>;

#[derive(Debug, Error)]
pub enum NnError {
    /// No engine could be discovered; nothing engine-bound can run.
    #[error("engine configuration error: {0}")]
    Configuration(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// I/O failure while reading or writing a model artifact or parameter stream.
    /// `path` names the file or the block path (`00:Linear/weight`) being processed.
    #[error("i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A resource manager (or a tensor it owned) was used after `close`.
    #[error("resource manager closed: {0}")]
    Closed(String),
}

impl NnError {
    pub fn configuration(message: impl Into<String>) -> Self {
        NnError::Configuration(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        NnError::InvalidArgument(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        NnError::UnsupportedOperation(message.into())
    }

    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        NnError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        NnError::Closed(message.into())
    }

    /// Prefixes the block path of an I/O error with `segment`; other variants pass through.
    pub fn within(self, segment: &str) -> Self {
        match self {
            NnError::Io { path, source } if path.is_empty() => NnError::Io {
                path: segment.to_string(),
                source,
            },
            NnError::Io { path, source } => NnError::Io {
                path: format!("{segment}/{path}"),
                source,
            },
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, NnError::Configuration(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, NnError::InvalidArgument(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, NnError::UnsupportedOperation(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, NnError::Io { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, NnError::Closed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_builds_block_path_outside_in() {
        let err = NnError::io("weight", io::Error::from(io::ErrorKind::UnexpectedEof))
            .within("00:Linear")
            .within("01:SequentialBlock");
        match err {
            NnError::Io { path, .. } => assert_eq!(path, "01:SequentialBlock/00:Linear/weight"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn within_leaves_other_variants_alone() {
        let err = NnError::invalid_argument("bad").within("00:Linear");
        assert_eq!(err.to_string(), "invalid argument: bad");
    }
}
