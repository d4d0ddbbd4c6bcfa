use crate::models::Stream;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Common result type for core operations.
pub type Result<T> = std::result::Result<T, FifoError>;

/// 错误按方向记录，wait / close 可能多次返回同一个错误，所以必须可 Clone。
#[derive(Debug, Clone, Error)]
pub enum FifoError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to open {stream} fifo {path}: {source}")]
    Open {
        stream: Stream,
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("{0} fifo open cancelled")]
    Cancelled(Stream),
    #[error("{stream} copy failed: {source}")]
    Copy {
        stream: Stream,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to close {stream} fifo: {source}")]
    Close {
        stream: Stream,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("{0} task failed: {1}")]
    Task(Stream, String),
    #[error("no tokio runtime: {0}")]
    NoRuntime(String),
    #[error("{}", join_messages(.0))]
    Multiple(Vec<FifoError>),
}

impl FifoError {
    pub(crate) fn create(path: impl Into<PathBuf>, err: io::Error) -> Self {
        Self::Create {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub(crate) fn open(stream: Stream, path: impl Into<PathBuf>, err: io::Error) -> Self {
        Self::Open {
            stream,
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub(crate) fn copy(stream: Stream, err: io::Error) -> Self {
        Self::Copy {
            stream,
            source: Arc::new(err),
        }
    }

    pub(crate) fn close(stream: Stream, err: io::Error) -> Self {
        Self::Close {
            stream,
            source: Arc::new(err),
        }
    }

    pub(crate) fn remove(path: impl Into<PathBuf>, err: io::Error) -> Self {
        Self::Remove {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// 打开阶段被 cancel 打断（包括聚合错误中全部都是取消的情况）。
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::Multiple(errors) => errors.iter().all(FifoError::is_cancelled),
            _ => false,
        }
    }

    /// 单个错误原样返回，多个错误合并为 Multiple。
    pub(crate) fn aggregate(errors: Vec<FifoError>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::combine(errors))
        }
    }

    /// `errors` 不能为空。
    pub(crate) fn combine(mut errors: Vec<FifoError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }
}

fn join_messages(errors: &[FifoError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_keeps_single_error() {
        let err = FifoError::aggregate(vec![FifoError::Cancelled(Stream::Stdout)]).unwrap_err();
        assert!(matches!(err, FifoError::Cancelled(Stream::Stdout)));
        assert!(FifoError::aggregate(vec![]).is_ok());
    }

    #[test]
    fn multiple_joins_messages() {
        let err = FifoError::aggregate(vec![
            FifoError::Cancelled(Stream::Stdin),
            FifoError::copy(Stream::Stderr, io::Error::from(io::ErrorKind::BrokenPipe)),
        ])
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("stdin fifo open cancelled; stderr copy failed"));
        assert!(!err.is_cancelled());
    }
}
