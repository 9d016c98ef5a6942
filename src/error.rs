use std::fmt::{Debug, Display};

use nix::errno::Errno;

pub type Result<T> = std::result::Result<T, Error>;

/// A failure tied to one named shared-memory object.
pub struct Error {
    name: String,
    kind: ErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("error creating/opening shared memory: {0}")]
    Create(Errno),
    #[error("error resizing shared memory to {len} bytes: {source}")]
    Resize { len: usize, source: Errno },
    #[error("error mapping shared memory: {0}")]
    Map(Errno),
    #[error("object holds {actual} bytes, {expected} needed")]
    TooSmall { expected: usize, actual: usize },
    #[error("mapped region of {len} bytes cannot hold records of {record_size} bytes")]
    Layout { len: usize, record_size: usize },
    #[error("error releasing shared memory: {0}")]
    Release(Errno),
    #[error("error installing stop handler: {0}")]
    Signal(Errno),
}

impl Error {
    pub fn new(name: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The OS error behind this failure, if there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self.kind {
            ErrorKind::Create(e)
            | ErrorKind::Resize { source: e, .. }
            | ErrorKind::Map(e)
            | ErrorKind::Release(e)
            | ErrorKind::Signal(e) => Some(e),
            ErrorKind::TooSmall { .. } | ErrorKind::Layout { .. } => None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.name, self.kind)
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
